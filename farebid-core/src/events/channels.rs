//! Bus channel factory and handles.

use super::types::NegotiationEvent;
use tokio::sync::mpsc;

/// Default buffer size for the bus channel.
///
/// Publishing uses `try_send`; when the relay falls this far behind, new
/// events are dropped and logged instead of blocking the engine.
pub const DEFAULT_CHANNEL_BUFFER: usize = 256;

/// Sender handle for bus events.
pub type BusSender = mpsc::Sender<NegotiationEvent>;
/// Receiver handle for bus events.
pub type BusReceiver = mpsc::Receiver<NegotiationEvent>;

/// Create a new bus channel with [`DEFAULT_CHANNEL_BUFFER`] slots.
pub fn bus_channel() -> (BusSender, BusReceiver) {
    mpsc::channel(DEFAULT_CHANNEL_BUFFER)
}
