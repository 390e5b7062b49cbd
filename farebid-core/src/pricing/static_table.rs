use std::time::Duration;

use async_trait::async_trait;
use compact_str::CompactString;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{PricingError, PricingOracle, Quote, QuoteRequest, haversine_km};

/// Fare rule for one ride type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RideTypeRate {
    pub id: CompactString,
    pub base_fare: Decimal,
    pub per_km: Decimal,
    /// `floor = baseline * floor_ratio`
    pub floor_ratio: Decimal,
    /// `ceiling = baseline * ceiling_ratio`
    pub ceiling_ratio: Decimal,
    #[serde(default)]
    pub ttl_secs: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticPricingConfig {
    pub currency: CompactString,
    #[serde(default)]
    pub max_trip_km: Option<f64>,
    pub ride_types: Vec<RideTypeRate>,
}

/// Rate-card pricing from configuration, for single-market deployments and
/// tests.
#[derive(Debug, Clone)]
pub struct StaticPricingOracle {
    config: StaticPricingConfig,
}

impl StaticPricingOracle {
    pub fn new(config: StaticPricingConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl PricingOracle for StaticPricingOracle {
    async fn quote(&self, request: &QuoteRequest) -> Result<Quote, PricingError> {
        if request.currency != self.config.currency {
            return Err(PricingError::UnsupportedCurrency(request.currency.clone()));
        }
        let rate = self
            .config
            .ride_types
            .iter()
            .find(|r| r.id == request.ride_type_id)
            .ok_or_else(|| PricingError::UnknownRideType(request.ride_type_id.clone()))?;

        let km = haversine_km(request.pickup, request.drop_off);
        if self.config.max_trip_km.is_some_and(|max| km > max) {
            return Err(PricingError::OutOfServiceArea);
        }
        let km = Decimal::try_from(km)
            .map_err(|e| PricingError::Unavailable(format!("distance overflow: {e}")))?
            .round_dp(3);

        let baseline = (rate.base_fare + rate.per_km * km).round_dp(2);
        Ok(Quote {
            baseline,
            floor: (baseline * rate.floor_ratio).round_dp(2),
            ceiling: (baseline * rate.ceiling_ratio).round_dp(2),
            ttl: rate.ttl_secs.map(Duration::from_secs),
        })
    }
}
