//! Google Compute Engine metadata server lookups.
//!
//! Project id and region never change for the lifetime of a process, so each
//! is fetched at most once and cached in an async init-once cell.  Failed
//! lookups are not cached; the next caller retries.
//!
//! The metadata host defaults to `metadata.google.internal` and can be
//! redirected with `GCE_METADATA_HOST` (emulators, tests).

use std::time::Duration;

use serde::Deserialize;
use tokio::sync::OnceCell;

use ww_domain::error::{Error, Result};

use crate::util::{from_reqwest, truncate_body};

const DEFAULT_HOST: &str = "metadata.google.internal";
const HOST_ENV: &str = "GCE_METADATA_HOST";

/// Client for the metadata server with cached project and region.
pub struct MetadataClient {
    base_url: String,
    client: reqwest::Client,
    project_id: OnceCell<String>,
    region: OnceCell<String>,
}

/// An OAuth access token minted for the instance's default service account.
#[derive(Debug, Clone, Deserialize)]
pub struct AccessToken {
    pub access_token: String,
    /// Seconds until expiry, relative to the time of the response.
    pub expires_in: u64,
}

impl MetadataClient {
    /// Build a client against `base_url` (e.g. `http://169.254.169.254`).
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_default();
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            project_id: OnceCell::new(),
            region: OnceCell::new(),
        }
    }

    /// Build a client from `GCE_METADATA_HOST`, falling back to the
    /// well-known metadata hostname.
    pub fn from_env() -> Self {
        let host = std::env::var(HOST_ENV)
            .ok()
            .filter(|h| !h.is_empty())
            .unwrap_or_else(|| DEFAULT_HOST.to_string());
        let base = if host.starts_with("http://") || host.starts_with("https://") {
            host
        } else {
            format!("http://{host}")
        };
        Self::new(base)
    }

    /// The current project id.
    pub async fn project_id(&self) -> Result<String> {
        self.project_id
            .get_or_try_init(|| self.get("project/project-id"))
            .await
            .cloned()
    }

    /// The current region, reduced from `projects/<n>/regions/<region>` to
    /// its last path segment.
    pub async fn region(&self) -> Result<String> {
        self.region
            .get_or_try_init(|| async {
                let raw = self.get("instance/region").await?;
                Ok::<_, Error>(region_from_qualified(&raw))
            })
            .await
            .cloned()
    }

    /// Mint an access token for the default service account.  Not cached
    /// here; see [`crate::auth::TokenSource`].
    pub async fn access_token(&self) -> Result<AccessToken> {
        let raw = self.get("instance/service-accounts/default/token").await?;
        serde_json::from_str(&raw).map_err(|e| Error::Metadata(format!("token response: {e}")))
    }

    async fn get(&self, path: &str) -> Result<String> {
        let url = format!("{}/computeMetadata/v1/{}", self.base_url, path);
        tracing::debug!(url = %url, "metadata request");

        let resp = self
            .client
            .get(&url)
            .header("Metadata-Flavor", "Google")
            .send()
            .await
            .map_err(from_reqwest)?;

        let status = resp.status();
        let body = resp.text().await.map_err(from_reqwest)?;
        if !status.is_success() {
            return Err(Error::Metadata(format!(
                "GET {path}: HTTP {} - {}",
                status.as_u16(),
                truncate_body(&body, 200)
            )));
        }
        Ok(body.trim().to_string())
    }
}

/// `projects/123/regions/us-central1` → `us-central1`.
pub fn region_from_qualified(raw: &str) -> String {
    match raw.rfind('/') {
        Some(pos) => raw[pos + 1..].to_string(),
        None => raw.to_string(),
    }
}
