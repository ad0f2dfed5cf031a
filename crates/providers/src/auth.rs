//! Bearer tokens for the Vertex AI backend.
//!
//! [`TokenSource`] either hands out a fixed token (resolved once from an env
//! var) or mints service-account tokens from the metadata server and caches
//! them until shortly before they expire.  It is `Send + Sync` and meant to
//! be shared across turns behind an `Arc`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use ww_domain::config::BackendAuthConfig;
use ww_domain::error::{Error, Result};

use crate::metadata::MetadataClient;

/// Refresh this long before the reported expiry.
const REFRESH_MARGIN: Duration = Duration::from_secs(60);

struct CachedToken {
    token: String,
    refresh_at: Instant,
}

pub struct TokenSource {
    kind: Kind,
}

enum Kind {
    Static(String),
    Metadata {
        metadata: Arc<MetadataClient>,
        cached: Mutex<Option<CachedToken>>,
    },
}

impl TokenSource {
    /// A fixed token, never refreshed.
    pub fn fixed(token: impl Into<String>) -> Self {
        Self {
            kind: Kind::Static(token.into()),
        }
    }

    /// Tokens minted by the metadata server.
    pub fn metadata(metadata: Arc<MetadataClient>) -> Self {
        Self {
            kind: Kind::Metadata {
                metadata,
                cached: Mutex::new(None),
            },
        }
    }

    /// Build from config: `token_env` wins when the variable is set and
    /// non-empty; otherwise tokens come from the metadata server.
    pub fn from_config(auth: &BackendAuthConfig, metadata: Arc<MetadataClient>) -> Self {
        match &auth.token_env {
            Some(var) => match std::env::var(var) {
                Ok(token) if !token.is_empty() => Self::fixed(token),
                _ => {
                    tracing::warn!(
                        env_var = %var,
                        "token env var unset or empty, falling back to metadata server tokens"
                    );
                    Self::metadata(metadata)
                }
            },
            None => Self::metadata(metadata),
        }
    }

    /// Return a usable bearer token.
    pub async fn access_token(&self) -> Result<String> {
        match &self.kind {
            Kind::Static(token) => Ok(token.clone()),
            Kind::Metadata { metadata, cached } => {
                if let Some(c) = cached.lock().as_ref() {
                    if Instant::now() < c.refresh_at {
                        return Ok(c.token.clone());
                    }
                }

                // Concurrent refreshes may race; the last one wins, and every
                // token they receive is valid.
                let fresh = metadata
                    .access_token()
                    .await
                    .map_err(|e| Error::Auth(format!("service account token: {e}")))?;
                let lifetime = Duration::from_secs(fresh.expires_in);
                let refresh_at = Instant::now() + lifetime.saturating_sub(REFRESH_MARGIN);
                *cached.lock() = Some(CachedToken {
                    token: fresh.access_token.clone(),
                    refresh_at,
                });
                tracing::debug!(expires_in = fresh.expires_in, "access token refreshed");
                Ok(fresh.access_token)
            }
        }
    }

    pub fn is_fixed(&self) -> bool {
        matches!(self.kind, Kind::Static(_))
    }
}
