//! Webhook signature verification helper for bus consumers.

use crate::objects::BusMessage;
use crate::signature::{SignatureError, SignedObject};

/// Verify and deserialize an incoming negotiation bus webhook.
///
/// * `signature_header` – value of the `Farebid-Signature` request header.
/// * `body` – raw JSON request body string.
/// * `secret` – the subscriber secret configured on the farebid server.
///
/// ```ignore
/// use farebid_sdk::client::verify_bus_webhook;
///
/// let message = verify_bus_webhook(signature_header, &body, secret)?;
/// if seen.insert(message.dedup_key()) {
///     handle(message);
/// }
/// ```
pub fn verify_bus_webhook(
    signature_header: &str,
    body: &str,
    secret: &[u8],
) -> Result<BusMessage, SignatureError> {
    SignedObject::<BusMessage>::from_header_and_body(signature_header, body.to_owned())?
        .verify(secret)
}
