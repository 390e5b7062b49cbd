use rust_decimal::Decimal;
use uuid::Uuid;

use crate::entities::SessionStatus;
use crate::pricing::PricingError;
use crate::store::StoreError;

/// Coarse classification of [`NegotiationError`], used for retry decisions
/// and status mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    Authorization,
    State,
    Concurrency,
    Unavailable,
    Internal,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NegotiationError {
    #[error("invalid geography: {0}")]
    InvalidGeography(String),
    #[error("amount {amount} is outside the allowed range [{floor}, {ceiling}]")]
    OutOfPolicyAmount {
        amount: Decimal,
        floor: Decimal,
        ceiling: Decimal,
    },
    #[error("the other party must move before you can counter again")]
    AlternationViolation,
    #[error("you cannot accept your own offer")]
    SelfAcceptance,
    #[error("unknown ride type: {0}")]
    UnknownRideType(String),
    #[error("unsupported currency: {0}")]
    UnsupportedCurrency(String),
    #[error("rider already holds {limit} open sessions")]
    AdmissionLimit { limit: u32 },

    #[error("actor is not a participant of this session")]
    NotParticipant,
    #[error("action not permitted: {0}")]
    ActionNotPermitted(&'static str),

    #[error("session is already {0}")]
    SessionTerminal(SessionStatus),
    #[error("session has expired")]
    SessionExpired,
    #[error("another driver is already bound to this session")]
    DriverAlreadyBound,

    #[error("session was modified concurrently, re-read and retry")]
    Conflict,

    #[error("pricing unavailable: {0}")]
    PricingUnavailable(String),
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("deadline exceeded")]
    DeadlineExceeded,

    #[error("session {0} not found")]
    NotFound(Uuid),
    #[error("internal error: {0}")]
    Internal(String),
}

impl NegotiationError {
    pub fn kind(&self) -> ErrorKind {
        use NegotiationError::*;
        match self {
            InvalidGeography(_)
            | OutOfPolicyAmount { .. }
            | AlternationViolation
            | SelfAcceptance
            | UnknownRideType(_)
            | UnsupportedCurrency(_)
            | AdmissionLimit { .. } => ErrorKind::Validation,
            NotParticipant | ActionNotPermitted(_) => ErrorKind::Authorization,
            SessionTerminal(_) | SessionExpired | DriverAlreadyBound | NotFound(_) => {
                ErrorKind::State
            }
            Conflict => ErrorKind::Concurrency,
            PricingUnavailable(_) | StoreUnavailable(_) | DeadlineExceeded => {
                ErrorKind::Unavailable
            }
            Internal(_) => ErrorKind::Internal,
        }
    }

    /// `true` when the same request may succeed if sent again unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Unavailable | ErrorKind::Concurrency)
    }

    /// Stable name used in API error bodies.
    pub fn code(&self) -> &'static str {
        use NegotiationError::*;
        match self {
            InvalidGeography(_) => "InvalidGeography",
            OutOfPolicyAmount { .. } => "OutOfPolicyAmount",
            AlternationViolation => "AlternationViolation",
            SelfAcceptance => "SelfAcceptance",
            UnknownRideType(_) => "UnknownRideType",
            UnsupportedCurrency(_) => "UnsupportedCurrency",
            AdmissionLimit { .. } => "AdmissionLimit",
            NotParticipant => "NotParticipant",
            ActionNotPermitted(_) => "ActionNotPermitted",
            SessionTerminal(_) => "SessionTerminal",
            SessionExpired => "SessionExpired",
            DriverAlreadyBound => "DriverAlreadyBound",
            Conflict => "Conflict",
            PricingUnavailable(_) => "PricingUnavailable",
            StoreUnavailable(_) => "StoreUnavailable",
            DeadlineExceeded => "DeadlineExceeded",
            NotFound(_) => "NotFound",
            Internal(_) => "Internal",
        }
    }
}

impl From<StoreError> for NegotiationError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(reason) => NegotiationError::StoreUnavailable(reason),
            StoreError::VersionMismatch => NegotiationError::Conflict,
            StoreError::NotFound(id) => NegotiationError::NotFound(id),
            StoreError::Backend(reason) => NegotiationError::Internal(reason),
        }
    }
}

impl From<PricingError> for NegotiationError {
    fn from(err: PricingError) -> Self {
        match err {
            PricingError::UnknownRideType(id) => NegotiationError::UnknownRideType(id.into()),
            PricingError::UnsupportedCurrency(c) => NegotiationError::UnsupportedCurrency(c.into()),
            PricingError::OutOfServiceArea => {
                NegotiationError::InvalidGeography("trip is outside the service area".into())
            }
            PricingError::Unavailable(reason) => NegotiationError::PricingUnavailable(reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_failures_are_retryable() {
        assert!(NegotiationError::Conflict.is_retryable());
        assert!(NegotiationError::DeadlineExceeded.is_retryable());
        assert!(NegotiationError::StoreUnavailable("down".into()).is_retryable());
        assert!(!NegotiationError::AlternationViolation.is_retryable());
        assert!(!NegotiationError::SessionExpired.is_retryable());
    }

    #[test]
    fn store_errors_map_to_taxonomy() {
        assert_eq!(
            NegotiationError::from(StoreError::VersionMismatch),
            NegotiationError::Conflict
        );
        let err = NegotiationError::from(StoreError::Backend("syntax".into()));
        assert_eq!(err.kind(), ErrorKind::Internal);
    }
}
