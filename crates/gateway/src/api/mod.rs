pub mod ask;

use axum::routing::post;
use axum::Router;

use crate::state::AppState;

/// Build the API router.  Static files and middleware are layered on top in
/// [`crate::server::build_app`].
pub fn router() -> Router<AppState> {
    Router::new().route("/ask", post(ask::ask))
}
