//! Core runtime: the turn handler that ties sessions and the backend
//! together, and the reduction of backend replies to display text.
//!
//! Entry point: [`TurnHandler::handle`] takes an [`AskRequest`] and returns a
//! [`TurnReply`] or a [`TurnError`].

pub mod flatten;
pub mod turn;

pub use flatten::{flatten, EMPTY_REPLY};
pub use turn::{AskRequest, ConversationStore, TurnError, TurnHandler, TurnReply};
