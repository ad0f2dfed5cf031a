mod backend;
mod logging;
mod observability;
mod server;
mod sessions;

pub use backend::*;
pub use logging::*;
pub use observability::*;
pub use server::*;
pub use sessions::*;

use serde::{Deserialize, Serialize};
use std::fmt;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub sessions: SessionsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Environment overrides
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

impl Config {
    /// Apply the deployment environment on top of the file config.
    ///
    /// | Variable               | Field                    |
    /// |------------------------|--------------------------|
    /// | `PORT`                 | `server.port`            |
    /// | `GEMINI_MODEL_NAME`    | `backend.model`          |
    /// | `GOOGLE_CLOUD_PROJECT` | `backend.project_id`     |
    /// | `GOOGLE_CLOUD_REGION`  | `backend.region`         |
    /// | `LOG_LEVEL`            | `logging.level`          |
    /// | `DO_DEBUG`             | `logging.debug` (if set) |
    ///
    /// Empty values are ignored.  An unparsable `PORT` is reported as an error
    /// rather than silently falling back.
    pub fn apply_env<F>(&mut self, lookup: F) -> crate::error::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.is_empty());

        if let Some(port) = get("PORT") {
            self.server.port = port.parse().map_err(|_| {
                crate::error::Error::Config(format!("PORT is not a valid port: {port:?}"))
            })?;
        }
        if let Some(model) = get("GEMINI_MODEL_NAME") {
            self.backend.model = model;
        }
        if let Some(project) = get("GOOGLE_CLOUD_PROJECT") {
            self.backend.project_id = Some(project);
        }
        if let Some(region) = get("GOOGLE_CLOUD_REGION") {
            self.backend.region = Some(region);
        }
        if let Some(level) = get("LOG_LEVEL") {
            self.logging.level = level.to_lowercase();
        }
        if get("DO_DEBUG").is_some() {
            self.logging.debug = true;
        }
        Ok(())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl ConfigError {
    fn error(field: &str, message: impl Into<String>) -> Self {
        Self {
            severity: ConfigSeverity::Error,
            field: field.into(),
            message: message.into(),
        }
    }

    fn warning(field: &str, message: impl Into<String>) -> Self {
        Self {
            severity: ConfigSeverity::Warning,
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the configuration and return a list of issues.
    ///
    /// Returns an empty vec when everything looks good.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.server.port == 0 {
            errors.push(ConfigError::error("server.port", "port must be greater than 0"));
        }
        if self.server.host.is_empty() {
            errors.push(ConfigError::error("server.host", "host must not be empty"));
        }
        if self.server.max_concurrent_requests == 0 {
            errors.push(ConfigError::error(
                "server.max_concurrent_requests",
                "must be greater than 0",
            ));
        }
        if self.server.request_timeout_secs == Some(0) {
            errors.push(ConfigError::error(
                "server.request_timeout_secs",
                "must be greater than 0 (omit the field to disable the deadline)",
            ));
        }
        if !self.server.static_dir.exists() {
            errors.push(ConfigError::warning(
                "server.static_dir",
                format!(
                    "{} does not exist; the web client will not be served",
                    self.server.static_dir.display()
                ),
            ));
        }

        if self.backend.model.trim().is_empty() {
            errors.push(ConfigError::error("backend.model", "model must not be empty"));
        }
        if let Some(t) = self.backend.temperature {
            if !(0.0..=2.0).contains(&t) {
                errors.push(ConfigError::error(
                    "backend.temperature",
                    format!("{t} is outside 0.0..=2.0"),
                ));
            }
        }
        if self.backend.timeout_ms == 0 {
            errors.push(ConfigError::error("backend.timeout_ms", "must be greater than 0"));
        }

        if self.sessions.idle_ttl_secs == Some(0) {
            errors.push(ConfigError::error(
                "sessions.idle_ttl_secs",
                "must be greater than 0 (omit the field to disable eviction)",
            ));
        }
        if self.sessions.idle_ttl_secs.is_some() && self.sessions.sweep_interval_secs == 0 {
            errors.push(ConfigError::error(
                "sessions.sweep_interval_secs",
                "must be greater than 0 when eviction is enabled",
            ));
        }

        if !logging::LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ConfigError::warning(
                "logging.level",
                format!(
                    "unknown level {:?}, expected one of {:?}",
                    self.logging.level,
                    logging::LEVELS
                ),
            ));
        }

        if !(0.0..=1.0).contains(&self.observability.sample_rate) {
            errors.push(ConfigError::error(
                "observability.sample_rate",
                "must be within 0.0..=1.0",
            ));
        }

        errors
    }

    /// True when `validate()` reported at least one error-severity issue.
    pub fn has_errors(issues: &[ConfigError]) -> bool {
        issues.iter().any(|e| e.severity == ConfigSeverity::Error)
    }
}
