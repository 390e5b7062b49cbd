//! Background processors.
//!
//! - `ExpirySweeper`: on every tick, expires overdue sessions through the
//!   engine and purges old terminal snapshots from the cache
//! - `BusRelay`: receives committed `NegotiationEvent`s and delivers them to
//!   webhook subscribers

pub mod bus_relay;
pub mod expiry_sweeper;

pub use bus_relay::{BusRelay, Delivery, RelayError};
pub use expiry_sweeper::{ExpirySweeper, SweepReport, SweepTick};
