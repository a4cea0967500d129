//! Administrative API and health endpoint.

use axum::body::Bytes;
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;
use tracing::warn;

use relay_protocol::{
    BroadcastResponse, ErrorResponse, HealthResponse, Message, ProtocolError, RoutingRequest,
    SendResponse,
};

use super::AppState;
use crate::hub::HubError;

/// Header carrying the admin shared secret.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Rejections returned by the admin surface.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Invalid request body")]
    InvalidBody,

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("Hub is shutting down")]
    Unavailable,
}

impl From<HubError> for ApiError {
    fn from(err: HubError) -> Self {
        match err {
            HubError::InvalidRequest(protocol) => Self::Protocol(protocol),
            HubError::ShuttingDown => Self::Unavailable,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::InvalidBody | Self::Protocol(_) => StatusCode::BAD_REQUEST,
            Self::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        };
        (status, Json(ErrorResponse::new(self.to_string()))).into_response()
    }
}

/// Rejects admin requests without the configured `X-API-Key`.
pub(crate) async fn require_api_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let provided = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok());

    if provided != Some(state.config.api_key.as_str()) {
        return ApiError::Unauthorized.into_response();
    }

    next.run(request).await
}

/// `POST /api/send`
pub(crate) async fn send_message(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<SendResponse>, ApiError> {
    let request: RoutingRequest = serde_json::from_slice(&body).map_err(|e| {
        warn!(error = %e, "Failed to decode send request");
        ApiError::InvalidBody
    })?;

    let outcome = state.hub.send(request).await?;
    Ok(Json(SendResponse::new(outcome.sent())))
}

/// `POST /api/broadcast`
pub(crate) async fn broadcast(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<BroadcastResponse>, ApiError> {
    let message: Message = serde_json::from_slice(&body).map_err(|e| {
        warn!(error = %e, "Failed to decode broadcast message");
        ApiError::InvalidBody
    })?;

    let outcome = state.hub.broadcast(message).await?;
    Ok(Json(BroadcastResponse::new(outcome.delivered)))
}

/// `GET /health`
pub(crate) async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse::healthy(state.hub.stats()))
}
