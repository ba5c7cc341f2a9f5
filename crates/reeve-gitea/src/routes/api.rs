//! Plugin API used by the pipeline engine.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use reeve_core::message::{Message, Trigger};
use reeve_core::schema::Pipeline;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::AppState;
use crate::error::ApiError;
use crate::plugin::CLI_METHODS;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/discover", post(discover))
        .route("/messages/{source}", post(message))
        .route("/cli", get(cli_methods))
        .route("/cli/{method}", post(cli_method))
}

/// Arguments of a CLI method call.
#[derive(Debug, Default, Deserialize)]
pub struct CliRequest {
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct CliResponse {
    pub result: String,
}

/// Resolve the pipelines for a trigger.
async fn discover(
    State(state): State<AppState>,
    Json(trigger): Json<Trigger>,
) -> Result<Json<Vec<Pipeline>>, ApiError> {
    let pipelines = state.plugin.discover(&trigger).await?;
    Ok(Json(pipelines))
}

/// Deliver a message from `source` to the plugin.
async fn message(
    State(state): State<AppState>,
    Path(source): Path<String>,
    Json(message): Json<Message>,
) -> Result<StatusCode, ApiError> {
    debug!(source = %source, message_type = %message.option("type"), "Received message");
    state.plugin.message(&source, message).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn cli_methods() -> Json<BTreeMap<&'static str, &'static str>> {
    Json(CLI_METHODS.into_iter().collect())
}

async fn cli_method(
    State(state): State<AppState>,
    Path(method): Path<String>,
    Json(request): Json<CliRequest>,
) -> Result<Json<CliResponse>, ApiError> {
    let result = state.plugin.cli_method(&method, &request.args).await?;
    Ok(Json(CliResponse { result }))
}
