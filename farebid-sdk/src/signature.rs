//! HMAC-SHA256 signatures used by farebid.
//!
//! The wire format for the signature header is:
//!
//! ```text
//! Farebid-Signature: {unix_timestamp}.{base64_signature}
//! ```
//!
//! Two signing schemes exist:
//!
//! * **Actor assertions** (gateway → negotiation API):
//!   `HMAC-SHA256("{actor}.{timestamp}", gateway_secret)` where `{actor}` is
//!   the `Farebid-Actor` header value, `{role}:{uuid}`.
//!
//! * **Body signing** (bus webhooks → consumers):
//!   `HMAC-SHA256("{timestamp}.{json_body}", subscriber_secret)`

use std::fmt;
use std::str::FromStr;

use uuid::Uuid;

use crate::objects::PartyRole;

/// Header name for the HMAC signature.
pub const SIGNATURE_HEADER: &str = "Farebid-Signature";

/// Header name carrying the authenticated actor (`{role}:{uuid}`).
pub const ACTOR_HEADER: &str = "Farebid-Actor";

/// Default maximum age of a signature (in seconds).
pub const MAX_SIGNATURE_AGE: i64 = 5 * 60;

/// Tolerated clock skew for timestamps from the future (in seconds).
pub const MAX_CLOCK_SKEW: i64 = 30;

/// Marker trait for types that can participate in body signing via
/// [`SignedObject`].
pub trait Signature: for<'de> serde::Deserialize<'de> + serde::Serialize {}

/// Errors produced by signature operations.
#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    #[error("invalid header format")]
    InvalidFormat,
    #[error("invalid base64 encoding")]
    InvalidBase64,
    #[error("invalid actor")]
    InvalidActor,
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid signature")]
    SignatureMismatch,
    #[error("signature expired")]
    Expired,
}

impl From<ring::error::Unspecified> for SignatureError {
    fn from(_: ring::error::Unspecified) -> Self {
        Self::SignatureMismatch
    }
}

fn hmac_key(key: &[u8]) -> ring::hmac::Key {
    ring::hmac::Key::new(ring::hmac::HMAC_SHA256, key)
}

// ---------------------------------------------------------------------------
// Actor assertions
// ---------------------------------------------------------------------------

/// Identity asserted by the gateway for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ActorClaim {
    pub id: Uuid,
    pub role: PartyRole,
}

impl fmt::Display for ActorClaim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.role, self.id)
    }
}

impl FromStr for ActorClaim {
    type Err = SignatureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (role, id) = s.split_once(':').ok_or(SignatureError::InvalidActor)?;
        let role = role.parse().map_err(|_| SignatureError::InvalidActor)?;
        let id = Uuid::parse_str(id).map_err(|_| SignatureError::InvalidActor)?;
        Ok(Self { id, role })
    }
}

/// Sign an actor assertion with the current time.
///
/// Returns the formatted `Farebid-Signature` header value.
pub fn sign_actor(actor: &ActorClaim, key: &[u8]) -> String {
    let timestamp = time::OffsetDateTime::now_utc().unix_timestamp();
    sign_actor_at(actor, timestamp, key)
}

/// Sign an actor assertion for an explicit timestamp.
pub fn sign_actor_at(actor: &ActorClaim, timestamp: i64, key: &[u8]) -> String {
    let data = format!("{actor}.{timestamp}");
    let sig = ring::hmac::sign(&hmac_key(key), data.as_bytes());
    format_signature_header(timestamp, sig.as_ref())
}

/// Verify the `Farebid-Actor` / `Farebid-Signature` header pair.
///
/// Checks `HMAC-SHA256("{actor}.{timestamp}", key)` and that the timestamp is
/// no older than `max_age` seconds.
pub fn verify_actor(
    actor_header: &str,
    signature_header: &str,
    key: &[u8],
    max_age: i64,
) -> Result<ActorClaim, SignatureError> {
    let actor: ActorClaim = actor_header.parse()?;
    let (timestamp, signature) = parse_signature_header(signature_header)?;
    let data = format!("{actor_header}.{timestamp}");
    ring::hmac::verify(&hmac_key(key), data.as_bytes(), signature.as_ref())?;
    check_timestamp(timestamp, max_age)?;
    Ok(actor)
}

// ---------------------------------------------------------------------------
// SignedObject: body signing
// ---------------------------------------------------------------------------

/// A signed body carrying its typed payload, timestamp, raw JSON, and
/// HMAC-SHA256 signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedObject<T: Signature> {
    pub body: T,
    pub timestamp: i64,
    pub json: String,
    pub signature: Box<[u8]>,
}

impl<T: Signature> SignedObject<T> {
    /// Serializes `body` to JSON and computes
    /// `HMAC-SHA256("{timestamp}.{json}", key)`.
    pub fn new(body: T, key: &[u8]) -> Result<Self, serde_json::Error> {
        let now = time::OffsetDateTime::now_utc().unix_timestamp();
        let json = serde_json::to_string(&body)?;
        let data = format!("{now}.{json}");
        let signature = ring::hmac::sign(&hmac_key(key), data.as_bytes());
        let signature = signature.as_ref().to_owned().into_boxed_slice();
        Ok(Self {
            body,
            timestamp: now,
            json,
            signature,
        })
    }

    /// Reconstruct a [`SignedObject`] from a raw `Farebid-Signature` header
    /// value and the JSON request body string.
    ///
    /// This parses the header and deserializes the body but does **not**
    /// verify the HMAC. Call [`verify`](Self::verify) for that.
    pub fn from_header_and_body(
        header_value: &str,
        body_json: String,
    ) -> Result<Self, SignatureError> {
        let (timestamp, signature) = parse_signature_header(header_value)?;
        let body: T = serde_json::from_str(&body_json)?;
        Ok(Self {
            body,
            timestamp,
            json: body_json,
            signature,
        })
    }

    /// Verify the HMAC signature and timestamp freshness, consuming `self`
    /// and returning the authenticated payload.
    pub fn verify(self, key: &[u8]) -> Result<T, SignatureError> {
        let data = format!("{}.{}", self.timestamp, self.json);
        ring::hmac::verify(&hmac_key(key), data.as_bytes(), self.signature.as_ref())?;
        check_timestamp(self.timestamp, MAX_SIGNATURE_AGE)?;
        Ok(self.body)
    }

    /// Format the full `Farebid-Signature` header value (`{timestamp}.{b64}`).
    pub fn to_header(&self) -> String {
        format_signature_header(self.timestamp, &self.signature)
    }
}

// ---------------------------------------------------------------------------
// Header parsing / formatting
// ---------------------------------------------------------------------------

/// Parse a `Farebid-Signature` header value (`{timestamp}.{base64}`) into
/// `(timestamp, raw_signature_bytes)`.
pub fn parse_signature_header(value: &str) -> Result<(i64, Box<[u8]>), SignatureError> {
    let (timestamp, encoded) = value.split_once('.').ok_or(SignatureError::InvalidFormat)?;
    let timestamp: i64 = timestamp
        .parse()
        .map_err(|_| SignatureError::InvalidFormat)?;
    let signature = fast32::base64::RFC4648_NOPAD
        .decode_str(encoded)
        .map_err(|_| SignatureError::InvalidBase64)?;
    Ok((timestamp, signature.into_boxed_slice()))
}

/// Format a `{timestamp}.{base64}` header value from its parts.
pub fn format_signature_header(timestamp: i64, signature: &[u8]) -> String {
    format!(
        "{}.{}",
        timestamp,
        fast32::base64::RFC4648_NOPAD.encode(signature)
    )
}

/// Check that a signature timestamp is at most `max_age` seconds old and not
/// further than [`MAX_CLOCK_SKEW`] in the future.
pub fn check_timestamp(timestamp: i64, max_age: i64) -> Result<(), SignatureError> {
    let now = time::OffsetDateTime::now_utc().unix_timestamp();
    if now - timestamp > max_age || timestamp - now > MAX_CLOCK_SKEW {
        return Err(SignatureError::Expired);
    }
    Ok(())
}
