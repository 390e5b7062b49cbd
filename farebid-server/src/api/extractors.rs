//! Request authentication.
//!
//! The API gateway authenticates riders and drivers and forwards the
//! identity as a signed assertion:
//!
//! ```text
//! Farebid-Actor:     {role}:{uuid}
//! Farebid-Signature: {unix_timestamp}.{base64_signature}
//! ```
//!
//! The signature is `HMAC-SHA256("{actor}.{timestamp}", gateway_secret)`.
//! All cryptographic operations are delegated to [`farebid_sdk::signature`].

use axum::{
    Json,
    extract::FromRequestParts,
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Response},
};
use farebid_core::model::Actor;
use farebid_sdk::objects::ErrorBody;
use farebid_sdk::signature::{self, ACTOR_HEADER, SIGNATURE_HEADER, SignatureError};

use crate::state::AppState;

/// The caller identity, verified against the gateway secret.
#[derive(Debug, Clone, Copy)]
pub struct AuthenticatedActor(pub Actor);

/// Errors returned by the [`AuthenticatedActor`] extractor.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("missing Farebid-Actor header")]
    MissingActor,
    #[error("missing Farebid-Signature header")]
    MissingSignature,
    #[error("invalid header format")]
    InvalidHeader,
    #[error("invalid signature encoding")]
    InvalidBase64,
    #[error("signature verification failed")]
    VerificationFailed,
    #[error("signature expired")]
    Expired,
}

impl From<SignatureError> for AuthError {
    fn from(err: SignatureError) -> Self {
        match err {
            SignatureError::InvalidFormat | SignatureError::InvalidActor | SignatureError::Json(_) => {
                Self::InvalidHeader
            }
            SignatureError::InvalidBase64 => Self::InvalidBase64,
            SignatureError::SignatureMismatch => Self::VerificationFailed,
            SignatureError::Expired => Self::Expired,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, code) = match self {
            AuthError::MissingActor | AuthError::MissingSignature => {
                (StatusCode::UNAUTHORIZED, "MissingCredentials")
            }
            AuthError::InvalidHeader | AuthError::InvalidBase64 => {
                (StatusCode::BAD_REQUEST, "InvalidCredentials")
            }
            AuthError::VerificationFailed | AuthError::Expired => {
                (StatusCode::UNAUTHORIZED, "InvalidCredentials")
            }
        };
        let body = ErrorBody {
            error: code.to_string(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

impl FromRequestParts<AppState> for AuthenticatedActor {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let actor_value = parts
            .headers
            .get(ACTOR_HEADER)
            .ok_or(AuthError::MissingActor)?
            .to_str()
            .map_err(|_| AuthError::InvalidHeader)?;
        let sig_value = parts
            .headers
            .get(SIGNATURE_HEADER)
            .ok_or(AuthError::MissingSignature)?
            .to_str()
            .map_err(|_| AuthError::InvalidHeader)?;

        let auth = state.config.auth.read().await;
        let claim = signature::verify_actor(
            actor_value,
            sig_value,
            &auth.gateway_secret,
            auth.max_assertion_age_secs,
        )?;
        drop(auth);

        Ok(AuthenticatedActor(Actor {
            id: claim.id,
            role: claim.role.into(),
        }))
    }
}
