//! Events emitted after each committed state transition.
//!
//! # Event Flow
//!
//! 1. `SessionEngine` commits a transition and builds a `NegotiationEvent`.
//! 2. The event goes to the `PushHub` (live participants) synchronously.
//! 3. The same event is queued on the bus channel for the `BusRelay`,
//!    which delivers it to downstream webhook subscribers.
//!
//! Both paths are best-effort; consumers reconcile by `version`.

pub mod channels;
pub mod types;

pub use channels::{BusReceiver, BusSender, DEFAULT_CHANNEL_BUFFER, bus_channel};
pub use types::{EventKind, NegotiationEvent};
