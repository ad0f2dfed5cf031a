//! Session management for the WasteWise gateway.
//!
//! A [`SessionStore`] maps opaque session identifiers to [`Session`]s, each
//! owning one backend conversation handle behind a per-session async lock.
//! Sessions are created on first contact and, unless idle eviction is
//! enabled (see [`lifecycle`]), live as long as the process.

pub mod id;
pub mod lifecycle;
pub mod store;

pub use id::{IdGenerationError, IdGenerator, RandomIds};
pub use lifecycle::spawn_idle_sweeper;
pub use store::{Resolved, Session, SessionStore, TurnGuard};
