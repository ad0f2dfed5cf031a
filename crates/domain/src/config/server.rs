use std::path::PathBuf;

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Server
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "d_8080")]
    pub port: u16,
    #[serde(default = "d_host")]
    pub host: String,
    #[serde(default)]
    pub cors: CorsConfig,
    /// Directory served for every path other than `/ask`. Unknown paths fall
    /// back to `index.html` inside it.
    #[serde(default = "d_static_dir")]
    pub static_dir: PathBuf,
    /// Deadline for one `/ask` turn. When it passes, the in-flight backend
    /// call is cancelled and the client receives `408 {"error": ...}`.
    /// `None` = no deadline.
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
    /// Maximum number of requests processed at once (backpressure).
    #[serde(default = "d_256")]
    pub max_concurrent_requests: usize,
    /// How long in-flight requests may drain after a shutdown signal.
    #[serde(default = "d_5")]
    pub shutdown_grace_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            host: d_host(),
            cors: CorsConfig::default(),
            static_dir: d_static_dir(),
            request_timeout_secs: None,
            max_concurrent_requests: 256,
            shutdown_grace_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    /// Origins allowed for CORS. `["*"]` allows every origin; entries ending
    /// in `:*` match any port on that host.
    #[serde(default = "d_cors_origins")]
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: d_cors_origins(),
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_8080() -> u16 {
    8080
}
fn d_host() -> String {
    "0.0.0.0".into()
}
fn d_static_dir() -> PathBuf {
    PathBuf::from("web/static")
}
fn d_256() -> usize {
    256
}
fn d_5() -> u64 {
    5
}
fn d_cors_origins() -> Vec<String> {
    vec!["*".into()]
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
