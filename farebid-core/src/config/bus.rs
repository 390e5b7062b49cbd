use url::Url;

/// Where committed negotiation events are delivered.
#[derive(Debug, Clone, Default)]
pub struct BusConfig {
    pub webhooks: Vec<WebhookSubscriber>,
    /// Delivery attempts per message and subscriber before giving up.
    pub max_attempts: u32,
}

#[derive(Debug, Clone)]
pub struct WebhookSubscriber {
    pub url: Url,
    /// Key for the `Farebid-Signature` body signature.
    pub secret: Box<[u8]>,
    /// Subjects to deliver (`negotiation.accepted`, ...). Empty means all.
    pub subjects: Vec<String>,
}

impl WebhookSubscriber {
    pub fn wants(&self, subject: &str) -> bool {
        self.subjects.is_empty() || self.subjects.iter().any(|s| s == subject)
    }
}
