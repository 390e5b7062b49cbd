/// Verification settings for gateway-signed actor assertions.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// HMAC secret shared with the API gateway.
    pub gateway_secret: Box<[u8]>,
    /// Maximum accepted assertion age, in seconds.
    pub max_assertion_age_secs: i64,
}
