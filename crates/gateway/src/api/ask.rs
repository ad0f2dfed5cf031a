//! `POST /ask`: run one conversational turn.
//!
//! Body `{"sessionId"?: string, "message": string}`; success is
//! `{"payload": {"sessionId": string, "response": string}}`, failures are
//! `{"error": string}`.

use std::time::Duration;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::runtime::{AskRequest, TurnError, TurnReply};
use crate::state::AppState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Response shape
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Serialize)]
struct AskResponse {
    payload: AskPayload,
}

#[derive(Debug, Serialize)]
struct AskPayload {
    #[serde(rename = "sessionId")]
    session_id: String,
    response: String,
}

impl From<TurnReply> for AskResponse {
    fn from(reply: TurnReply) -> Self {
        Self {
            payload: AskPayload {
                session_id: reply.session_id,
                response: reply.reply,
            },
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /ask
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn ask(
    State(state): State<AppState>,
    body: Result<Json<AskRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => {
            tracing::debug!(error = %rejection.body_text(), "rejected malformed /ask body");
            return api_error(
                StatusCode::BAD_REQUEST,
                format!("invalid input: {}", rejection.body_text()),
            );
        }
    };

    // The turn runs on its own task.  If this handler returns early or is
    // dropped (client gone, deadline hit) the guard cancels the token and the
    // task abandons the backend call.
    let cancel = CancellationToken::new();
    let _cancel_on_drop = cancel.clone().drop_guard();

    let turns = state.turns.clone();
    let task = tokio::spawn(async move { turns.handle(request, cancel).await });

    let joined = match state.config.server.request_timeout_secs {
        Some(secs) => match tokio::time::timeout(Duration::from_secs(secs), task).await {
            Ok(joined) => joined,
            Err(_) => {
                tracing::warn!(timeout_secs = secs, "request deadline exceeded, cancelling turn");
                return api_error(
                    StatusCode::REQUEST_TIMEOUT,
                    format!("request timed out after {secs}s"),
                );
            }
        },
        None => task.await,
    };

    match joined {
        Ok(Ok(reply)) => Json(AskResponse::from(reply)).into_response(),
        Ok(Err(e)) => {
            let status = status_for(&e);
            if status.is_server_error() {
                tracing::error!(error = %e, "ask failed");
            } else {
                tracing::debug!(error = %e, "ask rejected");
            }
            api_error(status, e.to_string())
        }
        Err(e) => {
            tracing::error!(error = %e, "turn task failed");
            api_error(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        }
    }
}

fn status_for(error: &TurnError) -> StatusCode {
    match error {
        TurnError::Validation(_) => StatusCode::BAD_REQUEST,
        TurnError::IdentifierGeneration(_) | TurnError::Backend(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
        TurnError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
    }
}

/// Build a standardized JSON error response: `{ "error": "<message>" }`.
fn api_error(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({ "error": message.into() }))).into_response()
}
