//! HTTP and WebSocket clients for the negotiation API.
//!
//! Gated behind the `client` cargo feature so downstream crates that only
//! need the shared types do not pull in `reqwest`.

mod negotiation;
mod push;
mod webhook;

pub use negotiation::NegotiationClient;
pub use push::PushStream;
pub use webhook::verify_bus_webhook;

use reqwest::StatusCode;

use crate::objects::ErrorBody;
use crate::signature::SignatureError;

/// Errors produced by the SDK clients.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Transport-level failure (DNS, TLS, connection reset, …).
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// HMAC signature could not be computed or verified.
    #[error("signature error: {0}")]
    Signature(#[from] SignatureError),

    /// The server returned a non-2xx status code.
    ///
    /// `error` is populated when the body parsed as an [`ErrorBody`].
    #[error("api error: status {status}, body: {body}")]
    Api {
        status: StatusCode,
        body: String,
        error: Option<ErrorBody>,
    },

    /// Response body could not be deserialized.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The base URL could not be joined with the endpoint path.
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),

    /// WebSocket handshake or transport failure.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

impl ClientError {
    /// Stable error name reported by the server, if any.
    pub fn error_name(&self) -> Option<&str> {
        match self {
            ClientError::Api {
                error: Some(body), ..
            } => Some(body.error.as_str()),
            _ => None,
        }
    }
}

async fn parse_response<T: serde::de::DeserializeOwned>(
    resp: reqwest::Response,
) -> Result<T, ClientError> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        let error = serde_json::from_str(&body).ok();
        return Err(ClientError::Api {
            status,
            body,
            error,
        });
    }
    let bytes = resp.bytes().await?;
    serde_json::from_slice(&bytes).map_err(ClientError::Json)
}
