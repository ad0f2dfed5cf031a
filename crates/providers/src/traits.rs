use ww_domain::content::{Content, GenerateResponse};
use ww_domain::error::Result;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Backend traits
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A conversation handle: accumulates the turn history of one chat and
/// sends new user messages in that context.
///
/// Implementations must leave the history untouched when `send_message`
/// fails or when its future is dropped before completion, so a cancelled
/// turn never half-applies.
#[async_trait::async_trait]
pub trait ChatSession: Send {
    /// Send a user message with the accumulated history and return the
    /// backend's structured response.
    async fn send_message(&mut self, text: &str) -> Result<GenerateResponse>;

    /// Turns accepted so far, oldest first.
    fn history(&self) -> &[Content];
}

/// A conversational model backend.
pub trait ChatBackend: Send + Sync {
    /// Create a fresh conversation handle with an empty history.
    fn start_chat(&self) -> Box<dyn ChatSession>;

    /// A short identifier for logs (e.g. `"vertex"`).
    fn backend_id(&self) -> &str;

    /// The model conversations are sent to.
    fn model(&self) -> &str;
}
