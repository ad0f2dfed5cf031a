//! Provider-agnostic conversation content.
//!
//! A [`GenerateResponse`] carries zero or more [`Candidate`]s; each candidate
//! optionally carries a [`Content`] made of ordered [`Part`]s. Text parts are
//! what the gateway shows to users; every other kind is kept opaque so it can
//! be replayed to the backend as part of the conversation history.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Model => "model",
        }
    }
}

/// One segment of a turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Part {
    Text { text: String },
    /// A non-textual segment (function call, inline data, ...). `kind` is the
    /// wire field name; `value` is its payload, kept verbatim.
    Other { kind: String, value: serde_json::Value },
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Part::Text { text: text.into() }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Part::Text { text } => Some(text.as_str()),
            Part::Other { .. } => None,
        }
    }
}

/// A single turn in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content {
    pub role: Role,
    pub parts: Vec<Part>,
}

impl Content {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            parts: vec![Part::text(text)],
        }
    }

    pub fn model(parts: Vec<Part>) -> Self {
        Self {
            role: Role::Model,
            parts,
        }
    }
}

/// One backend-proposed response to a turn.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// `None` when the backend produced no content at all (e.g. the
    /// candidate was blocked before any output).
    pub content: Option<Content>,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// The structured result of a single "send message" call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub candidates: Vec<Candidate>,
    pub usage: Option<Usage>,
    /// The model that produced the response.
    pub model: String,
}

impl GenerateResponse {
    pub fn first_candidate(&self) -> Option<&Candidate> {
        self.candidates.first()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn part_as_text_skips_other_kinds() {
        let text = Part::text("hello");
        let call = Part::Other {
            kind: "functionCall".into(),
            value: serde_json::json!({"name": "lookup"}),
        };
        assert_eq!(text.as_text(), Some("hello"));
        assert_eq!(call.as_text(), None);
    }

    #[test]
    fn role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Model).unwrap(), "\"model\"");
        assert_eq!(Role::User.as_str(), "user");
    }

    #[test]
    fn first_candidate_of_empty_response_is_none() {
        assert!(GenerateResponse::default().first_candidate().is_none());
    }
}
