pub mod api;
pub mod bootstrap;
pub mod cli;
pub mod logging;
pub mod runtime;
pub mod server;
pub mod state;

#[cfg(test)]
pub(crate) mod test_support;
