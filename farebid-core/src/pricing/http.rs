use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use url::Url;

use super::{PricingError, PricingOracle, Quote, QuoteRequest};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpPricingConfig {
    pub url: Url,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_timeout_ms() -> u64 {
    1500
}

#[derive(Debug, Deserialize)]
struct QuoteResponse {
    baseline: Decimal,
    floor: Decimal,
    ceiling: Decimal,
    #[serde(default)]
    ttl_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct QuoteErrorResponse {
    error: String,
}

/// Pricing served by a remote HTTP service.
///
/// `POST {url}` with a JSON [`QuoteRequest`]. Any transport failure, timeout
/// or 5xx is reported as [`PricingError::Unavailable`].
pub struct HttpPricingOracle {
    client: Client,
    url: Url,
}

impl HttpPricingOracle {
    pub fn new(config: HttpPricingConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;
        Ok(Self {
            client,
            url: config.url,
        })
    }
}

#[async_trait]
impl PricingOracle for HttpPricingOracle {
    #[tracing::instrument(skip_all, err, name = "HTTP:PricingQuote")]
    async fn quote(&self, request: &QuoteRequest) -> Result<Quote, PricingError> {
        let response = self
            .client
            .post(self.url.clone())
            .json(request)
            .send()
            .await
            .map_err(|e| PricingError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            let body: QuoteResponse = response
                .json()
                .await
                .map_err(|e| PricingError::Unavailable(format!("bad quote body: {e}")))?;
            return Ok(Quote {
                baseline: body.baseline,
                floor: body.floor,
                ceiling: body.ceiling,
                ttl: body.ttl_secs.map(Duration::from_secs),
            });
        }

        if status.is_client_error() {
            let reason = response
                .json::<QuoteErrorResponse>()
                .await
                .map(|b| b.error)
                .unwrap_or_default();
            return Err(match (status, reason.as_str()) {
                (_, "unknown_ride_type") | (StatusCode::NOT_FOUND, _) => {
                    PricingError::UnknownRideType(request.ride_type_id.clone())
                }
                (_, "unsupported_currency") => {
                    PricingError::UnsupportedCurrency(request.currency.clone())
                }
                (_, "out_of_service_area") => PricingError::OutOfServiceArea,
                _ => PricingError::Unavailable(format!("pricing returned {status}")),
            });
        }

        Err(PricingError::Unavailable(format!("pricing returned {status}")))
    }
}
