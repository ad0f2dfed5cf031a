//! HTTP application assembly: API routes, static web client, middleware.

use axum::http::{header, HeaderValue, Method};
use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use tower_http::CompressionLevel;

use ww_domain::config::CorsConfig;

use crate::api;
use crate::state::AppState;

/// Build the complete application: `/ask`, the static web client as a
/// fallback for every other path, and the middleware stack.
pub fn build_app(state: AppState) -> Router {
    let server = &state.config.server;

    let mut router = api::router();

    // ── Static web client (SPA-style fallback to index.html) ──────────
    if server.static_dir.is_dir() {
        let index_html = server.static_dir.join("index.html");
        router = router.fallback_service(
            ServeDir::new(&server.static_dir).fallback(ServeFile::new(index_html)),
        );
    } else {
        tracing::info!(
            path = %server.static_dir.display(),
            "static directory not found, web client not served"
        );
    }

    // ── Security headers & compression ───────────────────────────────
    router = router
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("SAMEORIGIN"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_XSS_PROTECTION,
            HeaderValue::from_static("1; mode=block"),
        ))
        .layer(CompressionLayer::new().quality(CompressionLevel::Precise(5)));

    // ── CORS + concurrency limit (backpressure protection) ───────────
    tracing::info!(max_concurrent = server.max_concurrent_requests, "concurrency limit set");
    router = router
        .layer(build_cors_layer(&server.cors))
        .layer(tower::limit::ConcurrencyLimitLayer::new(
            server.max_concurrent_requests,
        ));

    if state.config.logging.debug {
        router = router.layer(TraceLayer::new_for_http());
    }

    router.with_state(state)
}

/// Build a [`CorsLayer`] from the configured allowed origins.
///
/// Origins may end in `:*` to match any port on that host
/// (e.g. `http://localhost:*`).  A lone `"*"` allows every origin.
pub fn build_cors_layer(cors: &CorsConfig) -> CorsLayer {
    let methods = [Method::GET, Method::POST, Method::OPTIONS];

    if cors.allowed_origins.len() == 1 && cors.allowed_origins[0] == "*" {
        tracing::debug!("CORS allows all origins");
        return CorsLayer::new()
            .allow_origin(tower_http::cors::Any)
            .allow_methods(methods)
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);
    }

    // Partition into exact origins and wildcard-port patterns.
    let mut exact: Vec<HeaderValue> = Vec::new();
    let mut wildcard_prefixes: Vec<String> = Vec::new();

    for origin in &cors.allowed_origins {
        if origin.ends_with(":*") {
            wildcard_prefixes.push(origin.trim_end_matches('*').to_owned());
        } else if let Ok(hv) = origin.parse::<HeaderValue>() {
            exact.push(hv);
        } else {
            tracing::warn!(origin = %origin, "invalid CORS origin, skipping");
        }
    }

    let allow_origin = if wildcard_prefixes.is_empty() {
        AllowOrigin::list(exact)
    } else {
        AllowOrigin::predicate(move |origin, _| {
            if exact.iter().any(|e| e.as_bytes() == origin.as_bytes()) {
                return true;
            }
            let origin = origin.to_str().unwrap_or("");
            wildcard_prefixes
                .iter()
                .any(|prefix| matches_any_port(origin, prefix))
        })
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(methods)
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

/// `prefix` is `scheme://host:`; the rest of `origin` must be a port number.
fn matches_any_port(origin: &str, prefix: &str) -> bool {
    origin
        .strip_prefix(prefix)
        .map(|port| !port.is_empty() && port.chars().all(|c| c.is_ascii_digit()))
        .unwrap_or(false)
}
