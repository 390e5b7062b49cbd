//! Negotiation API.
//!
//! Every endpoint requires a gateway-signed actor assertion (see
//! [`extractors`]).
//!
//! # Endpoints
//!
//! - `POST /negotiation/sessions`               – open a session (rider)
//! - `GET  /negotiation/sessions/{id}`          – full session view
//! - `POST /negotiation/sessions/{id}/counter`  – counter-offer
//! - `POST /negotiation/sessions/{id}/accept`   – accept the standing offer
//! - `POST /negotiation/sessions/{id}/withdraw` – rider withdraws
//! - `POST /negotiation/sessions/{id}/reject`   – driver rejects
//! - `POST /negotiation/sessions/{id}/join`     – driver joins the fan-out
//! - `GET  /negotiation/ws?session_id={id}`     – WebSocket push stream

use axum::{
    Json, Router,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use farebid_core::engine::NegotiationError;
use farebid_sdk::objects::ErrorBody;
use uuid::Uuid;

use crate::state::AppState;

pub mod extractors;
mod sessions;
mod ws;

/// Build the negotiation router, to be nested under `/negotiation`.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/sessions", post(sessions::create_session))
        .route("/sessions/{id}", get(sessions::get_session))
        .route("/sessions/{id}/counter", post(sessions::counter))
        .route("/sessions/{id}/accept", post(sessions::accept))
        .route("/sessions/{id}/withdraw", post(sessions::withdraw))
        .route("/sessions/{id}/reject", post(sessions::reject))
        .route("/sessions/{id}/join", post(sessions::join))
        .route("/ws", get(ws::negotiation_ws))
}

// ---------------------------------------------------------------------------
// Error handling
// ---------------------------------------------------------------------------

/// An engine error on its way to the client.
#[derive(Debug)]
pub struct ApiError {
    error: NegotiationError,
    session_id: Option<Uuid>,
}

impl ApiError {
    pub fn session(session_id: Uuid, error: NegotiationError) -> Self {
        Self {
            error,
            session_id: Some(session_id),
        }
    }
}

impl From<NegotiationError> for ApiError {
    fn from(error: NegotiationError) -> Self {
        Self {
            error,
            session_id: None,
        }
    }
}

pub fn status_for(error: &NegotiationError) -> StatusCode {
    use NegotiationError::*;
    match error {
        InvalidGeography(_)
        | OutOfPolicyAmount { .. }
        | AlternationViolation
        | SelfAcceptance
        | UnknownRideType(_)
        | UnsupportedCurrency(_) => StatusCode::BAD_REQUEST,
        AdmissionLimit { .. } => StatusCode::TOO_MANY_REQUESTS,
        NotParticipant | ActionNotPermitted(_) => StatusCode::FORBIDDEN,
        NotFound(_) => StatusCode::NOT_FOUND,
        Conflict | DriverAlreadyBound => StatusCode::CONFLICT,
        SessionTerminal(_) | SessionExpired => StatusCode::GONE,
        PricingUnavailable(_) | StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
        Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.error);
        let message = match &self.error {
            NegotiationError::Internal(detail) => {
                tracing::error!(session_id = ?self.session_id, error = %detail, "Negotiation API internal error");
                "internal error".to_string()
            }
            other => other.to_string(),
        };
        let body = ErrorBody {
            error: self.error.code().to_string(),
            message,
        };
        (status, Json(body)).into_response()
    }
}
