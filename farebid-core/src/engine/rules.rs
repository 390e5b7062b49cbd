//! Pure decision logic: given the current snapshot, who is acting and what
//! they asked for, decide the transition to commit or the error to return.
//!
//! Checks run in a fixed order (role, driver binding, terminal state,
//! participation, deadline, alternation, amount) so the same request
//! always fails with the same error.

use rust_decimal::Decimal;
use time::OffsetDateTime;
use uuid::Uuid;

use super::NegotiationError;
use crate::config::NegotiationPolicy;
use crate::entities::{PartyRole, SessionStatus};
use crate::model::{Actor, GeoPoint, SessionSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Counter(Decimal),
    Accept,
    Withdraw,
    Reject,
    Join,
    /// Read access: `get` and push subscriptions.
    View,
}

impl Action {
    fn mutates(self) -> bool {
        !matches!(self, Action::View)
    }
}

/// What the engine has to write for an authorized action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Append an offer and move to `countered`.
    Counter {
        amount: Decimal,
        deadline_at: OffsetDateTime,
        bind_driver: Option<Uuid>,
    },
    /// Close the session.
    Terminate {
        status: SessionStatus,
        bind_driver: Option<Uuid>,
    },
    /// An unbound driver leaves the fan-out; the session row is untouched.
    DriverRejected,
    /// Driver binding without a version bump.
    Join,
    Observe,
}

pub fn evaluate(
    snapshot: &SessionSnapshot,
    actor: Actor,
    action: Action,
    now: OffsetDateTime,
    policy: &NegotiationPolicy,
) -> Result<Transition, NegotiationError> {
    check_role(actor, action)?;

    if actor.role == PartyRole::Driver
        && matches!(action, Action::Accept | Action::Join)
        && snapshot.driver_id.is_some_and(|bound| bound != actor.id)
    {
        return Err(NegotiationError::DriverAlreadyBound);
    }

    if action.mutates() {
        match snapshot.status {
            SessionStatus::Expired => return Err(NegotiationError::SessionExpired),
            status if status.is_terminal() => {
                return Err(NegotiationError::SessionTerminal(status));
            }
            _ => {}
        }
    }

    if !is_participant(snapshot, actor) {
        return Err(NegotiationError::NotParticipant);
    }

    if matches!(action, Action::Counter(_) | Action::Accept) && now >= snapshot.deadline_at {
        return Err(NegotiationError::SessionExpired);
    }

    let bind_driver = match actor.role {
        PartyRole::Driver if snapshot.driver_id.is_none() => Some(actor.id),
        _ => None,
    };

    match action {
        Action::Counter(amount) => {
            if snapshot.current_offer.originator == actor.role {
                return Err(NegotiationError::AlternationViolation);
            }
            check_amount(amount, snapshot.floor, snapshot.ceiling)?;
            let extended = snapshot.deadline_at + policy.counter_extension;
            let hard_limit = snapshot.created_at + policy.max_session_lifetime;
            Ok(Transition::Counter {
                amount,
                deadline_at: extended.min(hard_limit),
                bind_driver,
            })
        }
        Action::Accept => {
            if snapshot.current_offer.originator == actor.role {
                return Err(NegotiationError::SelfAcceptance);
            }
            Ok(Transition::Terminate {
                status: SessionStatus::Accepted,
                bind_driver,
            })
        }
        Action::Withdraw => Ok(Transition::Terminate {
            status: SessionStatus::Withdrawn,
            bind_driver: None,
        }),
        Action::Reject if snapshot.driver_id == Some(actor.id) => Ok(Transition::Terminate {
            status: SessionStatus::Rejected,
            bind_driver: None,
        }),
        Action::Reject => Ok(Transition::DriverRejected),
        Action::Join => Ok(Transition::Join),
        Action::View => Ok(Transition::Observe),
    }
}

fn check_role(actor: Actor, action: Action) -> Result<(), NegotiationError> {
    match (action, actor.role) {
        (Action::Withdraw, PartyRole::Driver) => Err(NegotiationError::ActionNotPermitted(
            "only the rider may withdraw",
        )),
        (Action::Reject, PartyRole::Rider) => Err(NegotiationError::ActionNotPermitted(
            "only a driver may reject; riders withdraw",
        )),
        (Action::Join, PartyRole::Rider) => Err(NegotiationError::ActionNotPermitted(
            "only drivers join sessions",
        )),
        _ => Ok(()),
    }
}

/// Riders own their session. Drivers are participants while the session is
/// unbound and they have not rejected it, or once they are the bound driver.
pub fn is_participant(snapshot: &SessionSnapshot, actor: Actor) -> bool {
    match actor.role {
        PartyRole::Rider => snapshot.rider_id == actor.id,
        PartyRole::Driver => match snapshot.driver_id {
            Some(bound) => bound == actor.id,
            None => !snapshot.rejected_drivers.contains(&actor.id),
        },
    }
}

pub fn check_amount(amount: Decimal, floor: Decimal, ceiling: Decimal) -> Result<(), NegotiationError> {
    if amount < floor || amount > ceiling {
        return Err(NegotiationError::OutOfPolicyAmount {
            amount,
            floor,
            ceiling,
        });
    }
    Ok(())
}

pub fn check_geography(pickup: GeoPoint, drop_off: GeoPoint) -> Result<(), NegotiationError> {
    for (name, point) in [("pickup", pickup), ("drop", drop_off)] {
        if !point.lat.is_finite() || !point.lng.is_finite() {
            return Err(NegotiationError::InvalidGeography(format!(
                "{name} has non-finite coordinates"
            )));
        }
        if !(-90.0..=90.0).contains(&point.lat) || !(-180.0..=180.0).contains(&point.lng) {
            return Err(NegotiationError::InvalidGeography(format!(
                "{name} is out of range"
            )));
        }
    }
    if pickup == drop_off {
        return Err(NegotiationError::InvalidGeography(
            "pickup and drop are the same point".into(),
        ));
    }
    Ok(())
}

/// ISO 4217 shape: three uppercase ASCII letters.
pub fn check_currency(currency: &str) -> Result<(), NegotiationError> {
    if currency.len() == 3 && currency.bytes().all(|b| b.is_ascii_uppercase()) {
        Ok(())
    } else {
        Err(NegotiationError::UnsupportedCurrency(currency.to_owned()))
    }
}
