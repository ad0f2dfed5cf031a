use serde::Serialize;

/// Structured trace events emitted across all WasteWise crates.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    SessionResolved {
        session_id: String,
        is_new: bool,
        live_sessions: usize,
    },
    SessionsEvicted {
        evicted: usize,
        remaining: usize,
    },
    BackendCall {
        backend: String,
        model: String,
        duration_ms: u64,
        candidates: usize,
        prompt_tokens: Option<u32>,
        completion_tokens: Option<u32>,
    },
    TurnCompleted {
        session_id: String,
        history_turns: usize,
        reply_chars: usize,
        empty: bool,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "ww_event");
    }
}
