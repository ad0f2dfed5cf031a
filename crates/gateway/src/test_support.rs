//! Scripted in-memory backend for handler and API tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use ww_domain::content::{Candidate, Content, GenerateResponse, Part};
use ww_domain::error::{Error, Result};
use ww_providers::{ChatBackend, ChatSession};
use ww_sessions::{IdGenerationError, IdGenerator};

/// What the backend does for the next `send_message`, in call order.
pub enum Script {
    Reply(GenerateResponse),
    Delayed(Duration, GenerateResponse),
    Fail(String),
    /// Never completes.
    Hang,
}

pub fn text_response(texts: &[&str]) -> GenerateResponse {
    GenerateResponse {
        candidates: vec![Candidate {
            content: Some(Content::model(texts.iter().map(|t| Part::text(*t)).collect())),
            finish_reason: Some("stop".into()),
        }],
        usage: None,
        model: "scripted".into(),
    }
}

/// An identifier source whose randomness is always exhausted.
pub struct BrokenIds;

impl IdGenerator for BrokenIds {
    fn generate(&self) -> std::result::Result<String, IdGenerationError> {
        Err(IdGenerationError::Randomness("entropy source unavailable".into()))
    }
}

pub struct ScriptedBackend {
    state: Arc<ScriptState>,
}

struct ScriptState {
    script: Mutex<VecDeque<Script>>,
    started: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedBackend {
    pub fn new(script: Vec<Script>) -> Arc<Self> {
        Arc::new(Self {
            state: Arc::new(ScriptState {
                script: Mutex::new(script.into()),
                started: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            }),
        })
    }

    pub fn chats_started(&self) -> usize {
        self.state.started.load(Ordering::SeqCst)
    }

    /// Highest number of `send_message` calls observed running at once.
    pub fn max_in_flight(&self) -> usize {
        self.state.max_in_flight.load(Ordering::SeqCst)
    }
}

impl ChatBackend for ScriptedBackend {
    fn start_chat(&self) -> Box<dyn ChatSession> {
        self.state.started.fetch_add(1, Ordering::SeqCst);
        Box::new(ScriptedChat {
            state: self.state.clone(),
            history: Vec::new(),
        })
    }

    fn backend_id(&self) -> &str {
        "scripted"
    }

    fn model(&self) -> &str {
        "scripted"
    }
}

struct ScriptedChat {
    state: Arc<ScriptState>,
    history: Vec<Content>,
}

struct InFlight<'a>(&'a ScriptState);

impl<'a> InFlight<'a> {
    fn enter(state: &'a ScriptState) -> Self {
        let now = state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        state.max_in_flight.fetch_max(now, Ordering::SeqCst);
        Self(state)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl ChatSession for ScriptedChat {
    async fn send_message(&mut self, text: &str) -> Result<GenerateResponse> {
        let _in_flight = InFlight::enter(&self.state);
        let step = self.state.script.lock().pop_front();
        let response = match step {
            Some(Script::Reply(r)) => r,
            Some(Script::Delayed(delay, r)) => {
                tokio::time::sleep(delay).await;
                r
            }
            Some(Script::Fail(message)) => {
                return Err(Error::Backend {
                    backend: "scripted".into(),
                    message,
                })
            }
            Some(Script::Hang) => std::future::pending().await,
            None => return Err(Error::Other("script exhausted".into())),
        };

        if let Some(content) = response.first_candidate().and_then(|c| c.content.clone()) {
            self.history.push(Content::user(text));
            self.history.push(content);
        }
        Ok(response)
    }

    fn history(&self) -> &[Content] {
        &self.history
    }
}
