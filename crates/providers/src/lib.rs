pub mod auth;
pub mod metadata;
pub mod traits;
pub mod vertex;
pub(crate) mod util;

// Re-exports for convenience.
pub use auth::TokenSource;
pub use metadata::MetadataClient;
pub use traits::{ChatBackend, ChatSession};
pub use vertex::VertexBackend;
