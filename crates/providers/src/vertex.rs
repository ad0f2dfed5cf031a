//! Vertex AI Gemini backend.
//!
//! Implements multi-turn chat on top of the stateless `generateContent` API:
//! every [`VertexChatSession`] keeps its own history and resends it with each
//! new user message.  Auth is an OAuth bearer token from [`TokenSource`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;

use ww_domain::config::BackendConfig;
use ww_domain::content::{Candidate, Content, GenerateResponse, Part, Role, Usage};
use ww_domain::error::{Error, Result};
use ww_domain::trace::TraceEvent;

use crate::auth::TokenSource;
use crate::metadata::MetadataClient;
use crate::traits::{ChatBackend, ChatSession};
use crate::util::{from_reqwest, truncate_body};

const BACKEND_ID: &str = "vertex";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Backend
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Resolved, immutable settings of one backend instance.
#[derive(Debug, Clone)]
pub struct VertexSettings {
    pub project_id: String,
    pub region: String,
    pub model: String,
    /// Scheme + host, no trailing slash.
    pub base_url: String,
    pub system_instruction: Option<String>,
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
    pub timeout: Duration,
}

impl VertexSettings {
    fn generate_url(&self) -> String {
        format!(
            "{}/v1/projects/{}/locations/{}/publishers/google/models/{}:generateContent",
            self.base_url, self.project_id, self.region, self.model
        )
    }
}

struct Shared {
    settings: VertexSettings,
    url: String,
    tokens: TokenSource,
    client: reqwest::Client,
}

/// A [`ChatBackend`] for Gemini models hosted on Vertex AI.
#[derive(Clone)]
pub struct VertexBackend {
    shared: Arc<Shared>,
}

impl VertexBackend {
    pub fn new(settings: VertexSettings, tokens: TokenSource) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(from_reqwest)?;
        let url = settings.generate_url();
        Ok(Self {
            shared: Arc::new(Shared {
                settings,
                url,
                tokens,
                client,
            }),
        })
    }

    /// Resolve project, region and credentials, then build the backend.
    ///
    /// Explicit config values win; anything missing is read from the
    /// metadata server (once per process).
    pub async fn connect(cfg: &BackendConfig, metadata: Arc<MetadataClient>) -> Result<Self> {
        let project_id = match &cfg.project_id {
            Some(p) => p.clone(),
            None => metadata.project_id().await.map_err(|e| {
                Error::Config(format!("could not retrieve current project ID: {e}"))
            })?,
        };
        let region = match &cfg.region {
            Some(r) => r.clone(),
            None => metadata
                .region()
                .await
                .map_err(|e| Error::Config(format!("could not retrieve current region: {e}")))?,
        };
        let base_url = cfg
            .base_url
            .clone()
            .unwrap_or_else(|| format!("https://{region}-aiplatform.googleapis.com"))
            .trim_end_matches('/')
            .to_string();

        let tokens = TokenSource::from_config(&cfg.auth, metadata);

        let settings = VertexSettings {
            project_id,
            region,
            model: cfg.model.clone(),
            base_url,
            system_instruction: cfg.system_instruction(),
            temperature: cfg.temperature,
            max_output_tokens: cfg.max_output_tokens,
            timeout: Duration::from_millis(cfg.timeout_ms),
        };

        tracing::debug!(
            project = %settings.project_id,
            region = %settings.region,
            model = %settings.model,
            "initialized vertex ai backend"
        );

        Self::new(settings, tokens)
    }

    pub fn settings(&self) -> &VertexSettings {
        &self.shared.settings
    }
}

impl ChatBackend for VertexBackend {
    fn start_chat(&self) -> Box<dyn ChatSession> {
        Box::new(VertexChatSession {
            shared: self.shared.clone(),
            history: Vec::new(),
        })
    }

    fn backend_id(&self) -> &str {
        BACKEND_ID
    }

    fn model(&self) -> &str {
        &self.shared.settings.model
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Conversation handle
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One conversation against a [`VertexBackend`].
pub struct VertexChatSession {
    shared: Arc<Shared>,
    history: Vec<Content>,
}

#[async_trait::async_trait]
impl ChatSession for VertexChatSession {
    async fn send_message(&mut self, text: &str) -> Result<GenerateResponse> {
        let user_turn = Content::user(text);
        let body = build_body(&self.shared.settings, &self.history, &user_turn);
        let token = self.shared.tokens.access_token().await?;

        tracing::debug!(
            backend = BACKEND_ID,
            model = %self.shared.settings.model,
            history = self.history.len(),
            "generateContent request"
        );

        let started = Instant::now();
        let resp = self
            .shared
            .client
            .post(&self.shared.url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(from_reqwest)?;

        let status = resp.status();
        let resp_text = resp.text().await.map_err(from_reqwest)?;

        if !status.is_success() {
            return Err(Error::Backend {
                backend: BACKEND_ID.into(),
                message: format!("HTTP {} - {}", status.as_u16(), truncate_body(&resp_text, 500)),
            });
        }

        let resp_json: Value = serde_json::from_str(&resp_text)?;
        let response = parse_generate_response(&resp_json, &self.shared.settings.model);

        TraceEvent::BackendCall {
            backend: BACKEND_ID.into(),
            model: response.model.clone(),
            duration_ms: started.elapsed().as_millis() as u64,
            candidates: response.candidates.len(),
            prompt_tokens: response.usage.map(|u| u.prompt_tokens),
            completion_tokens: response.usage.map(|u| u.completion_tokens),
        }
        .emit();

        // Commit the exchange only once a model turn exists, so the history
        // keeps strict user/model alternation.
        if let Some(content) = response.first_candidate().and_then(|c| c.content.as_ref()) {
            self.history.push(user_turn);
            self.history.push(Content::model(content.parts.clone()));
        }

        Ok(response)
    }

    fn history(&self) -> &[Content] {
        &self.history
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request serialization
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn build_body(settings: &VertexSettings, history: &[Content], user_turn: &Content) -> Value {
    let contents: Vec<Value> = history
        .iter()
        .chain(std::iter::once(user_turn))
        .map(content_to_wire)
        .collect();

    let mut body = serde_json::json!({
        "contents": contents,
    });

    if let Some(si) = &settings.system_instruction {
        body["systemInstruction"] = serde_json::json!({
            "parts": [{"text": si}]
        });
    }

    let mut gen_config = serde_json::json!({});
    if let Some(temp) = settings.temperature {
        gen_config["temperature"] = serde_json::json!(temp);
    }
    if let Some(max) = settings.max_output_tokens {
        gen_config["maxOutputTokens"] = serde_json::json!(max);
    }
    if gen_config.as_object().is_some_and(|o| !o.is_empty()) {
        body["generationConfig"] = gen_config;
    }

    body
}

fn content_to_wire(content: &Content) -> Value {
    let parts: Vec<Value> = content.parts.iter().map(part_to_wire).collect();
    serde_json::json!({
        "role": content.role.as_str(),
        "parts": parts,
    })
}

fn part_to_wire(part: &Part) -> Value {
    match part {
        Part::Text { text } => serde_json::json!({"text": text}),
        Part::Other { kind, value } if kind == "thought" => {
            serde_json::json!({"text": value, "thought": true})
        }
        Part::Other { kind, value } => {
            let mut obj = serde_json::Map::new();
            obj.insert(kind.clone(), value.clone());
            Value::Object(obj)
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Response deserialization
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Parse a `generateContent` response.  A missing `candidates` array is a
/// valid, empty result rather than an error.
pub fn parse_generate_response(body: &Value, model: &str) -> GenerateResponse {
    let candidates = body
        .get("candidates")
        .and_then(|c| c.as_array())
        .map(|arr| arr.iter().map(parse_candidate).collect())
        .unwrap_or_default();

    let usage = body.get("usageMetadata").and_then(parse_usage);

    let model = body
        .get("modelVersion")
        .and_then(|v| v.as_str())
        .unwrap_or(model)
        .to_string();

    GenerateResponse {
        candidates,
        usage,
        model,
    }
}

fn parse_candidate(v: &Value) -> Candidate {
    let content = v
        .get("content")
        .and_then(|c| c.get("parts"))
        .and_then(|p| p.as_array())
        .map(|parts| Content {
            role: Role::Model,
            parts: parts.iter().filter_map(parse_part).collect(),
        });

    let finish_reason = v
        .get("finishReason")
        .and_then(|f| f.as_str())
        .map(|s| match s {
            "STOP" => "stop".to_string(),
            "MAX_TOKENS" => "length".to_string(),
            other => other.to_lowercase(),
        });

    Candidate {
        content,
        finish_reason,
    }
}

fn parse_part(v: &Value) -> Option<Part> {
    let obj = v.as_object()?;

    let is_thought = obj.get("thought").and_then(|t| t.as_bool()).unwrap_or(false);
    if let Some(text) = obj.get("text").and_then(|t| t.as_str()) {
        if !is_thought {
            return Some(Part::text(text));
        }
        return Some(Part::Other {
            kind: "thought".into(),
            value: Value::String(text.to_string()),
        });
    }

    // First payload field names the part kind (functionCall, inlineData, ...).
    obj.iter()
        .find(|(k, _)| k.as_str() != "thought" && k.as_str() != "thoughtSignature")
        .map(|(k, v)| Part::Other {
            kind: k.clone(),
            value: v.clone(),
        })
}

fn parse_usage(v: &Value) -> Option<Usage> {
    let prompt = v.get("promptTokenCount")?.as_u64()? as u32;
    let completion = v
        .get("candidatesTokenCount")
        .and_then(|c| c.as_u64())
        .unwrap_or(0) as u32;
    let total = v
        .get("totalTokenCount")
        .and_then(|t| t.as_u64())
        .unwrap_or((prompt + completion) as u64) as u32;
    Some(Usage {
        prompt_tokens: prompt,
        completion_tokens: completion,
        total_tokens: total,
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn settings() -> VertexSettings {
        VertexSettings {
            project_id: "demo".into(),
            region: "us-central1".into(),
            model: "gemini-1.5-flash-001".into(),
            base_url: "https://us-central1-aiplatform.googleapis.com".into(),
            system_instruction: Some("Be helpful.".into()),
            temperature: None,
            max_output_tokens: Some(256),
            timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn generate_url_layout() {
        assert_eq!(
            settings().generate_url(),
            "https://us-central1-aiplatform.googleapis.com/v1/projects/demo/locations/us-central1/publishers/google/models/gemini-1.5-flash-001:generateContent"
        );
    }

    #[test]
    fn body_replays_history_then_user_turn() {
        let history = vec![
            Content::user("Where do batteries go?"),
            Content::model(vec![Part::text("Hazardous waste drop-off.")]),
        ];
        let body = build_body(&settings(), &history, &Content::user("And pizza boxes?"));

        let contents = body["contents"].as_array().unwrap();
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[0]["role"], "user");
        assert_eq!(contents[1]["role"], "model");
        assert_eq!(contents[2]["parts"][0]["text"], "And pizza boxes?");
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "Be helpful.");
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 256);
        assert!(body["generationConfig"].get("temperature").is_none());
    }

    #[test]
    fn body_omits_empty_generation_config() {
        let mut s = settings();
        s.max_output_tokens = None;
        s.system_instruction = None;
        let body = build_body(&s, &[], &Content::user("hi"));
        assert!(body.get("generationConfig").is_none());
        assert!(body.get("systemInstruction").is_none());
    }

    #[test]
    fn other_parts_round_trip_to_wire() {
        let part = Part::Other {
            kind: "functionCall".into(),
            value: json!({"name": "lookup", "args": {}}),
        };
        assert_eq!(part_to_wire(&part), json!({"functionCall": {"name": "lookup", "args": {}}}));
    }

    #[test]
    fn parses_text_and_non_text_parts_in_order() {
        let body = json!({
            "candidates": [{
                "content": {"role": "model", "parts": [
                    {"text": "Recycle it"},
                    {"functionCall": {"name": "lookup", "args": {}}},
                    {"text": "Rinse first"}
                ]},
                "finishReason": "STOP"
            }],
            "usageMetadata": {
                "promptTokenCount": 10,
                "candidatesTokenCount": 4,
                "totalTokenCount": 14
            }
        });
        let resp = parse_generate_response(&body, "m");
        assert_eq!(resp.candidates.len(), 1);
        let c = &resp.candidates[0];
        assert_eq!(c.finish_reason.as_deref(), Some("stop"));
        let parts = &c.content.as_ref().unwrap().parts;
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].as_text(), Some("Recycle it"));
        assert!(matches!(&parts[1], Part::Other { kind, .. } if kind == "functionCall"));
        assert_eq!(parts[2].as_text(), Some("Rinse first"));
        assert_eq!(resp.usage.unwrap().total_tokens, 14);
        assert_eq!(resp.model, "m");
    }

    #[test]
    fn missing_candidates_is_empty_not_error() {
        let body = json!({"promptFeedback": {"blockReason": "SAFETY"}});
        let resp = parse_generate_response(&body, "m");
        assert!(resp.candidates.is_empty());
    }

    #[test]
    fn candidate_without_content_has_none() {
        let body = json!({"candidates": [{"finishReason": "SAFETY"}]});
        let resp = parse_generate_response(&body, "m");
        assert!(resp.candidates[0].content.is_none());
        assert_eq!(resp.candidates[0].finish_reason.as_deref(), Some("safety"));
    }

    #[test]
    fn thought_text_is_not_user_visible_text() {
        let part = parse_part(&json!({"text": "thinking...", "thought": true})).unwrap();
        assert!(part.as_text().is_none());
        assert_eq!(
            part_to_wire(&part),
            json!({"text": "thinking...", "thought": true})
        );
    }

    #[test]
    fn model_version_overrides_requested_model() {
        let body = json!({"candidates": [], "modelVersion": "gemini-1.5-flash-001"});
        let resp = parse_generate_response(&body, "alias");
        assert_eq!(resp.model, "gemini-1.5-flash-001");
    }
}
