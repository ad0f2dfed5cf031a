use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Logging
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter level when `RUST_LOG` is unset
    /// (`debug`, `info`, `warn`, `error`).
    #[serde(default = "d_info")]
    pub level: String,
    /// Debug mode: forces `debug` level and logs every HTTP request.
    #[serde(default)]
    pub debug: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: d_info(),
            debug: false,
        }
    }
}

impl LoggingConfig {
    /// The filter directive used when `RUST_LOG` is not set.
    pub fn default_directive(&self) -> String {
        let level = if self.debug { "debug" } else { self.level.as_str() };
        format!("{level},hyper=info,h2=info,tower=info")
    }
}

fn d_info() -> String {
    "info".into()
}

pub(crate) const LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
