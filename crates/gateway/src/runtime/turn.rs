//! One conversational turn: validate, resolve the session, call the backend
//! under the session's lock, flatten the reply.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use ww_domain::trace::TraceEvent;
use ww_providers::{ChatBackend, ChatSession};
use ww_sessions::{IdGenerationError, SessionStore};

use super::flatten;

/// Sessions whose conversation handle is a backend chat.
pub type ConversationStore = SessionStore<Box<dyn ChatSession>>;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request / reply
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Deserialize)]
pub struct AskRequest {
    /// Session to continue.  Absent, empty or unknown starts a new one.
    #[serde(default, rename = "sessionId")]
    pub session_id: Option<String>,
    #[serde(default)]
    pub message: String,
}

impl AskRequest {
    pub fn new(session_id: Option<String>, message: impl Into<String>) -> Self {
        Self {
            session_id,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TurnReply {
    pub session_id: String,
    pub reply: String,
    /// True when this turn created the session.
    pub is_new: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    #[error("{0}")]
    Validation(String),

    #[error("could not generate a session ID: {0}")]
    IdentifierGeneration(#[from] IdGenerationError),

    #[error("backend request failed: {0}")]
    Backend(#[from] ww_domain::error::Error),

    #[error("request cancelled")]
    Cancelled,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Turn handler
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Routes messages to the right conversation.  Cheap to clone.
#[derive(Clone)]
pub struct TurnHandler {
    backend: Arc<dyn ChatBackend>,
    sessions: Arc<ConversationStore>,
}

impl TurnHandler {
    pub fn new(backend: Arc<dyn ChatBackend>, sessions: Arc<ConversationStore>) -> Self {
        Self { backend, sessions }
    }

    pub fn sessions(&self) -> &Arc<ConversationStore> {
        &self.sessions
    }

    pub fn backend(&self) -> &Arc<dyn ChatBackend> {
        &self.backend
    }

    /// Run one turn.
    ///
    /// Turns on the same session queue behind each other; turns on
    /// different sessions run concurrently.  When `cancel` fires, the wait
    /// for the session lock or the in-flight backend call is abandoned and
    /// the conversation history is left as it was.
    pub async fn handle(
        &self,
        request: AskRequest,
        cancel: CancellationToken,
    ) -> Result<TurnReply, TurnError> {
        if request.message.is_empty() {
            return Err(TurnError::Validation("message must not be empty".into()));
        }

        let resolved = self
            .sessions
            .resolve_or_create(request.session_id.as_deref(), || self.backend.start_chat())
            .inspect_err(|e| tracing::error!(error = %e, "session id generation failed"))?;
        let session = resolved.session;
        let is_new = resolved.is_new;

        let span = tracing::info_span!(
            "turn",
            session_id = %session.id(),
            is_new,
            backend = %self.backend.backend_id(),
            model = %self.backend.model(),
        );

        async move {
            let mut chat = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!("turn cancelled while waiting for the session");
                    return Err(TurnError::Cancelled);
                }
                chat = session.lock() => chat,
            };

            let response = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!("turn cancelled during backend call");
                    return Err(TurnError::Cancelled);
                }
                result = chat.send_message(&request.message) => result.map_err(|e| {
                    tracing::warn!(error = %e, "backend call failed");
                    TurnError::Backend(e)
                })?,
            };
            let history_turns = chat.history().len();
            drop(chat);

            let (reply, empty) = flatten::reply_text(&response);
            if empty {
                tracing::debug!(
                    candidates = response.candidates.len(),
                    "backend returned no content"
                );
            }

            TraceEvent::TurnCompleted {
                session_id: session.id().to_string(),
                history_turns,
                reply_chars: reply.chars().count(),
                empty,
            }
            .emit();

            Ok(TurnReply {
                session_id: session.id().to_string(),
                reply,
                is_new,
            })
        }
        .instrument(span)
        .await
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use futures_util::future::join_all;
    use ww_domain::content::Part;

    use crate::runtime::flatten::EMPTY_REPLY;
    use crate::test_support::{text_response, BrokenIds, Script, ScriptedBackend};

    fn handler(backend: &Arc<ScriptedBackend>) -> TurnHandler {
        TurnHandler::new(backend.clone(), Arc::new(ConversationStore::new()))
    }

    async fn ask(
        h: &TurnHandler,
        session: Option<&str>,
        msg: &str,
    ) -> Result<TurnReply, TurnError> {
        h.handle(
            AskRequest::new(session.map(str::to_string), msg),
            CancellationToken::new(),
        )
        .await
    }

    #[tokio::test]
    async fn empty_message_is_rejected_before_touching_sessions() {
        let backend = ScriptedBackend::new(vec![]);
        let h = handler(&backend);

        for session in [None, Some(""), Some("whatever")] {
            let err = ask(&h, session, "").await.unwrap_err();
            assert!(matches!(err, TurnError::Validation(_)));
        }
        assert!(h.sessions().is_empty());
        assert_eq!(backend.chats_started(), 0);
    }

    #[tokio::test]
    async fn id_generation_failure_fails_the_turn_without_a_chat() {
        let backend = ScriptedBackend::new(vec![Script::Reply(text_response(&["unused"]))]);
        let sessions = Arc::new(ConversationStore::with_id_generator(BrokenIds));
        let h = TurnHandler::new(backend.clone(), sessions);

        let err = ask(&h, None, "Where do batteries go?").await.unwrap_err();

        assert!(matches!(err, TurnError::IdentifierGeneration(_)), "{err}");
        assert!(h.sessions().is_empty());
        assert_eq!(backend.chats_started(), 0);
    }

    #[tokio::test]
    async fn first_turn_creates_a_session() {
        let backend = ScriptedBackend::new(vec![Script::Reply(text_response(&["Blue bin"]))]);
        let h = handler(&backend);

        let reply = ask(&h, None, "Where does paper go?").await.unwrap();
        assert!(reply.is_new);
        assert_eq!(reply.reply, "Blue bin");
        assert!(h.sessions().contains(&reply.session_id));
        assert_eq!(backend.chats_started(), 1);
    }

    #[tokio::test]
    async fn same_session_id_reuses_the_conversation() {
        let backend = ScriptedBackend::new(vec![
            Script::Reply(text_response(&["one"])),
            Script::Reply(text_response(&["two"])),
        ]);
        let h = handler(&backend);

        let first = ask(&h, None, "hello").await.unwrap();
        let second = ask(&h, Some(&first.session_id), "again").await.unwrap();

        assert_eq!(first.session_id, second.session_id);
        assert!(!second.is_new);
        assert_eq!(backend.chats_started(), 1);

        let session = h.sessions().get(&first.session_id).unwrap();
        assert_eq!(session.lock().await.history().len(), 4);
    }

    #[tokio::test]
    async fn multi_part_reply_is_flattened() {
        let backend = ScriptedBackend::new(vec![Script::Reply(text_response(&["a", "b"]))]);
        let reply = ask(&handler(&backend), None, "hi").await.unwrap();
        assert_eq!(reply.reply, "a. b");
    }

    #[tokio::test]
    async fn zero_candidates_yield_the_sentinel() {
        let backend = ScriptedBackend::new(vec![Script::Reply(Default::default())]);
        let h = handler(&backend);
        let reply = ask(&h, None, "hi").await.unwrap();
        assert_eq!(reply.reply, EMPTY_REPLY);

        let session = h.sessions().get(&reply.session_id).unwrap();
        assert!(session.lock().await.history().is_empty());
    }

    #[tokio::test]
    async fn backend_failure_is_reported_and_history_kept() {
        let backend = ScriptedBackend::new(vec![
            Script::Reply(text_response(&["ok"])),
            Script::Fail("quota exceeded".into()),
        ]);
        let h = handler(&backend);

        let first = ask(&h, None, "hi").await.unwrap();
        let err = ask(&h, Some(&first.session_id), "again").await.unwrap_err();
        assert!(matches!(err, TurnError::Backend(_)));
        assert!(err.to_string().contains("quota exceeded"));

        let session = h.sessions().get(&first.session_id).unwrap();
        assert_eq!(session.lock().await.history().len(), 2);
    }

    #[tokio::test]
    async fn cancellation_aborts_the_backend_call() {
        let backend = ScriptedBackend::new(vec![Script::Hang]);
        let h = handler(&backend);
        let cancel = CancellationToken::new();

        let task = {
            let h = h.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { h.handle(AskRequest::new(None, "hi"), cancel).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();

        let err = tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("turn should stop promptly")
            .unwrap()
            .unwrap_err();
        assert!(matches!(err, TurnError::Cancelled));

        // The session survives with an untouched history and an unlocked handle.
        let ids = h.sessions().ids();
        assert_eq!(ids.len(), 1);
        let session = h.sessions().get(&ids[0]).unwrap();
        assert!(!session.is_busy());
        assert!(session.lock().await.history().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn concurrent_turns_on_one_session_are_serialized() {
        let mut script = vec![Script::Reply(text_response(&["seed"]))];
        for n in 0..20 {
            script.push(Script::Delayed(
                Duration::from_millis(2),
                text_response(&[&format!("r{n}")]),
            ));
        }
        let backend = ScriptedBackend::new(script);
        let h = handler(&backend);
        let id = ask(&h, None, "seed").await.unwrap().session_id;

        let turns = (0..20).map(|n| {
            let h = h.clone();
            let id = id.clone();
            tokio::spawn(async move { ask(&h, Some(&id), &format!("m{n}")).await })
        });
        for r in join_all(turns).await {
            assert_eq!(r.unwrap().unwrap().session_id, id);
        }

        assert_eq!(h.sessions().len(), 1);
        assert_eq!(backend.max_in_flight(), 1);

        // Strict user/model alternation means no turn interleaved.
        let session = h.sessions().get(&id).unwrap();
        let chat = session.lock().await;
        assert_eq!(chat.history().len(), 42);
        for pair in chat.history().chunks(2) {
            assert_eq!(pair[0].role, ww_domain::content::Role::User);
            assert_eq!(pair[1].role, ww_domain::content::Role::Model);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn concurrent_new_sessions_get_distinct_ids() {
        let script = (0..64).map(|_| Script::Reply(text_response(&["hi"]))).collect();
        let backend = ScriptedBackend::new(script);
        let h = handler(&backend);

        let turns = (0..64).map(|_| {
            let h = h.clone();
            tokio::spawn(async move { ask(&h, None, "hello").await })
        });
        let mut ids: Vec<String> = join_all(turns)
            .await
            .into_iter()
            .map(|r| r.unwrap().unwrap().session_id)
            .collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 64);
        assert_eq!(h.sessions().len(), 64);
    }

    #[tokio::test]
    async fn non_text_parts_are_not_shown() {
        let mut response = text_response(&["visible"]);
        if let Some(content) = response.candidates[0].content.as_mut() {
            content.parts.insert(
                0,
                Part::Other {
                    kind: "functionCall".into(),
                    value: serde_json::json!({"name": "lookup"}),
                },
            );
        }
        let backend = ScriptedBackend::new(vec![Script::Reply(response)]);
        let reply = ask(&handler(&backend), None, "hi").await.unwrap();
        assert_eq!(reply.reply, "visible");
    }

    #[test]
    fn request_accepts_wire_field_names() {
        let req: AskRequest =
            serde_json::from_str(r#"{"sessionId":"abc","message":"hi"}"#).unwrap();
        assert_eq!(req.session_id.as_deref(), Some("abc"));
        assert_eq!(req.message, "hi");

        let req: AskRequest = serde_json::from_str(r#"{"sessionId":null,"message":"x"}"#).unwrap();
        assert!(req.session_id.is_none());
    }
}
