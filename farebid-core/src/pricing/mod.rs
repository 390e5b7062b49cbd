//! Pricing oracle: baseline fare and the negotiable band for a trip.

mod http;
mod static_table;

pub use http::{HttpPricingConfig, HttpPricingOracle};
pub use static_table::{RideTypeRate, StaticPricingConfig, StaticPricingOracle};

use std::time::Duration;

use async_trait::async_trait;
use compact_str::CompactString;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::model::GeoPoint;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteRequest {
    pub pickup: GeoPoint,
    #[serde(rename = "drop")]
    pub drop_off: GeoPoint,
    pub ride_type_id: CompactString,
    pub currency: CompactString,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quote {
    pub baseline: Decimal,
    pub floor: Decimal,
    pub ceiling: Decimal,
    /// Session lifetime suggested by pricing; the policy default applies
    /// when absent.
    pub ttl: Option<Duration>,
}

impl Quote {
    /// `0 < floor <= baseline <= ceiling`.
    pub fn is_coherent(&self) -> bool {
        self.floor > Decimal::ZERO && self.floor <= self.baseline && self.baseline <= self.ceiling
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PricingError {
    #[error("unknown ride type: {0}")]
    UnknownRideType(CompactString),
    #[error("unsupported currency: {0}")]
    UnsupportedCurrency(CompactString),
    #[error("trip is outside the service area")]
    OutOfServiceArea,
    #[error("pricing unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait PricingOracle: Send + Sync {
    async fn quote(&self, request: &QuoteRequest) -> Result<Quote, PricingError>;
}

/// Great-circle distance in kilometres.
pub fn haversine_km(a: GeoPoint, b: GeoPoint) -> f64 {
    const EARTH_RADIUS_KM: f64 = 6371.0088;
    let (lat1, lat2) = (a.lat.to_radians(), b.lat.to_radians());
    let dlat = (b.lat - a.lat).to_radians();
    let dlng = (b.lng - a.lng).to_radians();
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().asin()
}
