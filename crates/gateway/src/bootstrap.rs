//! AppState construction and background-task spawning.
//!
//! `serve`, `ask` and `chat` share these so the CLI commands run the same
//! runtime as the HTTP server, minus the listener.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio_util::sync::CancellationToken;

use ww_domain::config::{Config, ConfigSeverity};
use ww_providers::{MetadataClient, VertexBackend};

use crate::state::AppState;

/// Validate config, connect the backend and return a fully-wired
/// [`AppState`].
pub async fn build_app_state(config: Arc<Config>) -> anyhow::Result<AppState> {
    // ── Config validation ────────────────────────────────────────────
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if Config::has_errors(&issues) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues
                .iter()
                .filter(|i| i.severity == ConfigSeverity::Error)
                .count()
        );
    }

    // ── Backend ──────────────────────────────────────────────────────
    let metadata = Arc::new(MetadataClient::from_env());
    let backend = VertexBackend::connect(&config.backend, metadata)
        .await
        .context("initializing Vertex AI backend")?;
    tracing::info!(
        project = %backend.settings().project_id,
        region = %backend.settings().region,
        model = %backend.settings().model,
        "backend ready"
    );

    Ok(AppState::new(config, Arc::new(backend)))
}

/// Spawn the long-running background tasks.  Currently only the idle
/// session sweeper, and only when `sessions.idle_ttl_secs` is set.
///
/// Tasks stop when `shutdown` is cancelled.
pub fn spawn_background_tasks(state: &AppState, shutdown: &CancellationToken) {
    let sessions = &state.config.sessions;
    match sessions.idle_ttl_secs {
        Some(ttl) => {
            ww_sessions::spawn_idle_sweeper(
                state.sessions.clone(),
                Duration::from_secs(ttl),
                Duration::from_secs(sessions.sweep_interval_secs),
                shutdown.clone(),
            );
            tracing::info!(
                idle_ttl_secs = ttl,
                sweep_interval_secs = sessions.sweep_interval_secs,
                "idle session eviction enabled"
            );
        }
        None => tracing::debug!("idle session eviction disabled"),
    }
}
