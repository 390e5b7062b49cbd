//! BusRelay processor.
//!
//! The BusRelay is responsible for:
//! - Receiving committed `NegotiationEvent`s from the bus channel
//! - Fanning each message out to the webhook subscribers whose subject
//!   filter matches
//! - Signing every delivery body (`Farebid-Signature`)
//! - Retrying failed deliveries with exponential backoff (2^0 to 2^11 seconds)
//!
//! Deliveries run concurrently, so a subscriber may see messages of one
//! session out of order. Consumers order and de-duplicate by
//! `(session.id, version)`.

use std::sync::Arc;

use farebid_sdk::objects::BusMessage;
use farebid_sdk::signature::{SIGNATURE_HEADER, SignedObject};
use kanau::processor::Processor;
use thiserror::Error;
use tokio::sync::{RwLock, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::config::{BusConfig, WebhookSubscriber};
use crate::events::{BusReceiver, NegotiationEvent};
use crate::utils::backoff::calculate_retry_delay;

/// Errors that can occur during a single delivery attempt.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("HTTP request error: {0}")]
    Request(#[from] reqwest::Error),

    /// Subscriber answered with a non-2xx status.
    #[error("webhook delivery failed with status {status}: {body}")]
    DeliveryFailed { status: u16, body: String },

    #[error("payload serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// One message bound for one subscriber.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub subscriber: WebhookSubscriber,
    pub message: BusMessage,
}

/// Builds the deliveries for `event` under `config`'s subscriber list.
pub fn fan_out(config: &BusConfig, event: &NegotiationEvent) -> Vec<Delivery> {
    let message = event.to_bus_message();
    config
        .webhooks
        .iter()
        .filter(|s| s.wants(&message.subject))
        .map(|subscriber| Delivery {
            subscriber: subscriber.clone(),
            message: message.clone(),
        })
        .collect()
}

/// BusRelay delivers negotiation events to downstream webhook subscribers.
pub struct BusRelay {
    http_client: reqwest::Client,
    config: Arc<RwLock<BusConfig>>,
}

impl BusRelay {
    /// `config` is shared with the config reloader; subscriber changes
    /// apply to the next message.
    pub fn new(config: Arc<RwLock<BusConfig>>) -> Self {
        Self {
            http_client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            config,
        }
    }

    /// Run the BusRelay until shutdown is signaled or the bus channel
    /// closes and every delivery has finished.
    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>, mut bus_rx: BusReceiver) {
        info!("BusRelay started");
        let relay = Arc::new(self);
        let mut in_flight = JoinSet::new();

        loop {
            tokio::select! {
                biased;

                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("BusRelay received shutdown signal");
                        break;
                    }
                }

                event = bus_rx.recv() => {
                    let Some(event) = event else {
                        info!("Bus channel closed");
                        break;
                    };
                    let deliveries = fan_out(&*relay.config.read().await, &event);
                    debug!(
                        session_id = %event.snapshot.id,
                        version = event.version(),
                        subscribers = deliveries.len(),
                        "Relaying bus event"
                    );
                    for delivery in deliveries {
                        let relay = Arc::clone(&relay);
                        let shutdown_rx = shutdown_rx.clone();
                        in_flight.spawn(async move {
                            relay.deliver_with_retry(delivery, shutdown_rx).await;
                        });
                    }
                }

                Some(_) = in_flight.join_next(), if !in_flight.is_empty() => {}
            }
        }

        // Pending retries observe the shutdown signal and stop early.
        while in_flight.join_next().await.is_some() {}

        info!("BusRelay shutdown complete");
    }

    async fn deliver_with_retry(&self, delivery: Delivery, mut shutdown_rx: watch::Receiver<bool>) {
        let max_attempts = self.config.read().await.max_attempts.max(1);
        let url = delivery.subscriber.url.clone();
        let subject = delivery.message.subject.clone();
        let session_id = delivery.message.session.id;
        let version = delivery.message.version;

        for attempt in 0..max_attempts {
            match self.process(delivery.clone()).await {
                Ok(()) => {
                    info!(%url, %subject, %session_id, version, attempt, "Bus message delivered");
                    return;
                }
                Err(e) if attempt + 1 == max_attempts => {
                    error!(%url, %subject, %session_id, version, error = %e, "Giving up on bus delivery");
                    return;
                }
                Err(e) => {
                    let delay = calculate_retry_delay(attempt);
                    warn!(%url, %subject, %session_id, error = %e, retry_in = ?delay, "Bus delivery failed");
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = shutdown_rx.changed() => {
                            warn!(%url, %session_id, version, "Shutdown during delivery retry, dropping message");
                            return;
                        }
                    }
                }
            }
        }
    }
}

impl Processor<Delivery> for BusRelay {
    type Output = ();
    type Error = RelayError;

    async fn process(&self, delivery: Delivery) -> Result<(), RelayError> {
        let signed = SignedObject::new(delivery.message, &delivery.subscriber.secret)?;
        let response = self
            .http_client
            .post(delivery.subscriber.url)
            .header("Content-Type", "application/json")
            .header(SIGNATURE_HEADER, signed.to_header())
            .body(signed.json)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(RelayError::DeliveryFailed {
                status: status.as_u16(),
                body,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{PartyRole, SessionStatus};
    use crate::events::EventKind;
    use crate::model::{Offer, SessionSnapshot};
    use rust_decimal::Decimal;
    use time::OffsetDateTime;
    use url::Url;
    use uuid::Uuid;

    fn event(kind: EventKind, status: SessionStatus) -> NegotiationEvent {
        let now = OffsetDateTime::now_utc();
        let id = Uuid::now_v7();
        NegotiationEvent {
            kind,
            occurred_at: now,
            snapshot: SessionSnapshot {
                id,
                rider_id: Uuid::from_u128(1),
                driver_id: Some(Uuid::from_u128(11)),
                currency: "INR".into(),
                floor: Decimal::from(40),
                ceiling: Decimal::from(100),
                status,
                current_offer: Offer {
                    id: Uuid::now_v7(),
                    session_id: id,
                    ordinal: 2,
                    originator: PartyRole::Driver,
                    amount: Decimal::from(75),
                    currency: "INR".into(),
                    created_at: now,
                },
                created_at: now,
                updated_at: now,
                deadline_at: now,
                version: 3,
                closed_by: None,
                rejected_drivers: Vec::new(),
            },
        }
    }

    fn subscriber(url: &str, subjects: &[&str]) -> WebhookSubscriber {
        WebhookSubscriber {
            url: Url::parse(url).unwrap(),
            secret: b"hook-secret".to_vec().into_boxed_slice(),
            subjects: subjects.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn fan_out_honours_subject_filters() {
        let config = BusConfig {
            webhooks: vec![
                subscriber("http://billing.internal/hook", &["negotiation.accepted"]),
                subscriber("http://audit.internal/hook", &[]),
            ],
            max_attempts: 3,
        };

        let accepted = fan_out(&config, &event(EventKind::Accepted, SessionStatus::Accepted));
        assert_eq!(accepted.len(), 2);
        assert_eq!(accepted[0].message.subject, "negotiation.accepted");
        assert_eq!(accepted[0].message.version, 3);

        let countered = fan_out(&config, &event(EventKind::Countered, SessionStatus::Countered));
        assert_eq!(countered.len(), 1);
        assert_eq!(countered[0].subscriber.url.host_str(), Some("audit.internal"));
    }

    #[tokio::test]
    async fn unreachable_subscriber_is_a_request_error() {
        let config = Arc::new(RwLock::new(BusConfig::default()));
        let relay = BusRelay::new(config);
        let delivery = fan_out(
            &BusConfig {
                webhooks: vec![subscriber("http://127.0.0.1:1/hook", &[])],
                max_attempts: 1,
            },
            &event(EventKind::Expired, SessionStatus::Expired),
        )
        .remove(0);
        let err = relay.process(delivery).await.unwrap_err();
        assert!(matches!(err, RelayError::Request(_)), "{err:?}");
    }

    #[tokio::test]
    async fn run_stops_when_the_channel_closes() {
        let relay = BusRelay::new(Arc::new(RwLock::new(BusConfig::default())));
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let (bus_tx, bus_rx) = crate::events::bus_channel();
        bus_tx
            .send(event(EventKind::Countered, SessionStatus::Countered))
            .await
            .unwrap();
        drop(bus_tx);
        relay.run(shutdown_rx, bus_rx).await;
    }
}
