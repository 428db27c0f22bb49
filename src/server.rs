//! HTTP surface — JSON routes over the space bridge.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tracing::{error, warn};

use crate::bridge::SpaceBridge;
use crate::error::{CatalogError, ChatError, Error, ProtocolError};

/// Build the router: `/health` plus the bridge routes under `/api`.
pub fn bridge_routes(bridge: Arc<SpaceBridge>) -> Router {
    let api = Router::new()
        .route("/spaces", get(list_spaces))
        .route("/spaces/{owner}/{name}", get(get_space))
        .route("/spaces/{owner}/{name}/query", post(query_space));

    Router::new()
        .route("/health", get(health))
        .nest("/api", api)
        .layer(CorsLayer::permissive())
        .with_state(bridge)
}

// ── Health ──────────────────────────────────────────────────────────────

async fn health(State(bridge): State<Arc<SpaceBridge>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "spaces-bridge",
        "model": bridge.model_name(),
        "conversations": bridge.store().len().await,
    }))
}

// ── Spaces ──────────────────────────────────────────────────────────────

async fn list_spaces(State(bridge): State<Arc<SpaceBridge>>) -> Result<impl IntoResponse, ApiError> {
    let spaces = bridge.list_spaces().await?;
    Ok(Json(spaces))
}

async fn get_space(
    State(bridge): State<Arc<SpaceBridge>>,
    Path((owner, name)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let detail = bridge.space_detail(&owner, &name).await?;
    Ok(Json(detail))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest {
    prompt: String,
    #[serde(default)]
    conversation_id: Option<String>,
}

async fn query_space(
    State(bridge): State<Arc<SpaceBridge>>,
    Path((owner, name)): Path<(String, String)>,
    Json(req): Json<QueryRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = bridge
        .query(&owner, &name, req.conversation_id.as_deref(), &req.prompt)
        .await?;
    Ok(Json(outcome))
}

// ── Errors ──────────────────────────────────────────────────────────────

/// Bridge error rendered as `{"error", "kind"}` with a matching status.
#[derive(Debug)]
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl ApiError {
    fn status_and_kind(&self) -> (StatusCode, &'static str) {
        match &self.0 {
            Error::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
            Error::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "config"),
            Error::Catalog(CatalogError::SpaceNotFound { .. }) => (StatusCode::NOT_FOUND, "space_not_found"),
            Error::Catalog(CatalogError::InvalidSpace { .. }) => (StatusCode::BAD_REQUEST, "invalid_space"),
            Error::Catalog(CatalogError::Protocol(e)) | Error::Protocol(e) => protocol_status(e),
            Error::Conversation(_) => (StatusCode::CONFLICT, "conversation_mismatch"),
            Error::Chat(ChatError::AuthRejected { .. }) => (StatusCode::BAD_GATEWAY, "chat_auth_rejected"),
            Error::Chat(ChatError::RateLimited { .. }) => (StatusCode::TOO_MANY_REQUESTS, "chat_rate_limited"),
            Error::Chat(ChatError::Unavailable { .. }) => (StatusCode::SERVICE_UNAVAILABLE, "chat_unavailable"),
            Error::Chat(ChatError::Malformed { .. }) => (StatusCode::BAD_GATEWAY, "chat_malformed"),
        }
    }
}

fn protocol_status(e: &ProtocolError) -> (StatusCode, &'static str) {
    match e {
        ProtocolError::Transient(_) => (StatusCode::SERVICE_UNAVAILABLE, "protocol_transient"),
        ProtocolError::Permanent(_) => (StatusCode::BAD_GATEWAY, "protocol_permanent"),
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind) = self.status_and_kind();
        if status.is_server_error() {
            error!(kind, error = %self.0, "Request failed");
        } else {
            warn!(kind, error = %self.0, "Request rejected");
        }
        (
            status,
            Json(serde_json::json!({
                "error": self.0.to_string(),
                "kind": kind,
            })),
        )
            .into_response()
    }
}
