use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Conversation backend (Vertex AI Gemini)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Default Gemini model.  Overridable with `GEMINI_MODEL_NAME`.
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash-001";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "d_model")]
    pub model: String,
    /// Joined with single spaces into the model's system instruction.
    #[serde(default = "d_system_instructions")]
    pub system_instructions: Vec<String>,
    /// Google Cloud project.  When `None`, read from the metadata server.
    #[serde(default)]
    pub project_id: Option<String>,
    /// Google Cloud region.  When `None`, read from the metadata server.
    #[serde(default)]
    pub region: Option<String>,
    /// Endpoint override (tests, private endpoints).  Defaults to
    /// `https://{region}-aiplatform.googleapis.com`.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Transport timeout of a single `generateContent` call.
    #[serde(default = "d_120000")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_output_tokens: Option<u32>,
    #[serde(default)]
    pub auth: BackendAuthConfig,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            model: d_model(),
            system_instructions: d_system_instructions(),
            project_id: None,
            region: None,
            base_url: None,
            timeout_ms: 120_000,
            temperature: None,
            max_output_tokens: None,
            auth: BackendAuthConfig::default(),
        }
    }
}

impl BackendConfig {
    pub fn system_instruction(&self) -> Option<String> {
        if self.system_instructions.is_empty() {
            None
        } else {
            Some(self.system_instructions.join(" "))
        }
    }
}

/// Where bearer tokens for the backend come from.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackendAuthConfig {
    /// Env var holding a static OAuth access token.  When unset (or the var is
    /// empty), tokens are fetched from the metadata server.
    #[serde(default)]
    pub token_env: Option<String>,
}

// ── serde default helpers ───────────────────────────────────────────

fn d_model() -> String {
    DEFAULT_MODEL.into()
}
fn d_120000() -> u64 {
    120_000
}
fn d_system_instructions() -> Vec<String> {
    [
        "You are a friendly and helpful assistant for waste sorting.",
        "When asked in English you help to sort waste according to categories accepted in the United States of America.",
        "Ensure your answers are concise, unless the user requests a more complete approach.",
        "When presented with inquiries seeking information, provide answers that reflect a deep understanding of the field, guaranteeing their correctness.",
        "For any non-English queries, respond if you know waste sorting rules for the country of the language or explain that you do not have the waste sorting information otherwise in the same language as the prompt.",
        "For prompts involving reasoning, provide a clear explanation of each step in the reasoning process before presenting the final answer.",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_model_and_instructions() {
        let cfg = BackendConfig::default();
        assert_eq!(cfg.model, "gemini-1.5-flash-001");
        assert_eq!(cfg.system_instructions.len(), 6);
        let joined = cfg.system_instruction().unwrap();
        assert!(joined.starts_with("You are a friendly and helpful assistant for waste sorting."));
    }

    #[test]
    fn empty_instructions_disable_system_instruction() {
        let cfg: BackendConfig = toml::from_str("system_instructions = []").unwrap();
        assert!(cfg.system_instruction().is_none());
    }

    #[test]
    fn parses_explicit_location_and_auth() {
        let toml_str = r#"
            model = "gemini-1.5-pro-002"
            project_id = "demo"
            region = "europe-west1"
            temperature = 0.2

            [auth]
            token_env = "VERTEX_TOKEN"
        "#;
        let cfg: BackendConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.model, "gemini-1.5-pro-002");
        assert_eq!(cfg.project_id.as_deref(), Some("demo"));
        assert_eq!(cfg.region.as_deref(), Some("europe-west1"));
        assert_eq!(cfg.temperature, Some(0.2));
        assert_eq!(cfg.auth.token_env.as_deref(), Some("VERTEX_TOKEN"));
        assert_eq!(cfg.timeout_ms, 120_000);
    }
}
