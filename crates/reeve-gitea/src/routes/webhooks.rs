//! Gitea webhook endpoint.

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use tracing::{info, warn};

use crate::AppState;
use crate::error::ApiError;
use crate::webhook::{EVENT_HEADER, SIGNATURE_HEADER, verify_signature};

pub fn router() -> Router<AppState> {
    Router::new().route("/gitea", post(gitea_webhook))
}

/// Handle Gitea webhook events. Only pushes are acted upon.
async fn gitea_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let event_type = headers
        .get(EVENT_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown");

    if let Some(secret) = &state.webhook_secret {
        let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
        if !verify_signature(secret, &body, signature) {
            warn!(event = %event_type, "Rejected webhook with invalid signature");
            return Err(ApiError::Unauthorized("Invalid signature".to_string()));
        }
    }

    info!(event = %event_type, "Received Gitea webhook");

    if event_type != "push" {
        return Ok(StatusCode::NO_CONTENT);
    }

    state.plugin.handle_webhook(&body).await?;
    Ok(StatusCode::ACCEPTED)
}
