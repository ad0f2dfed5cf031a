use std::sync::Arc;

use ww_domain::config::Config;
use ww_providers::ChatBackend;

use crate::runtime::{ConversationStore, TurnHandler};

/// Shared application state passed to all API handlers.
#[derive(Clone)]
pub struct AppState {
    // ── Core services ─────────────────────────────────────────────────
    pub config: Arc<Config>,
    pub backend: Arc<dyn ChatBackend>,

    // ── Session management ────────────────────────────────────────────
    pub sessions: Arc<ConversationStore>,

    // ── Runtime ───────────────────────────────────────────────────────
    pub turns: TurnHandler,
}

impl AppState {
    pub fn new(config: Arc<Config>, backend: Arc<dyn ChatBackend>) -> Self {
        Self::with_sessions(config, backend, Arc::new(ConversationStore::new()))
    }

    /// Build around an existing session store (e.g. one with a custom
    /// identifier generator).
    pub fn with_sessions(
        config: Arc<Config>,
        backend: Arc<dyn ChatBackend>,
        sessions: Arc<ConversationStore>,
    ) -> Self {
        let turns = TurnHandler::new(backend.clone(), sessions.clone());
        Self {
            config,
            backend,
            sessions,
            turns,
        }
    }
}
