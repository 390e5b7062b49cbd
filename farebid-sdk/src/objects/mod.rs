pub mod bus;
pub mod error;
pub mod push;
pub mod session;

pub use bus::BusMessage;
pub use error::ErrorBody;
pub use push::{PushEventType, PushFrame, WsCloseCode};
pub use session::{
    CounterRequest, CreateSessionRequest, GeoPoint, OfferView, PartyRole, SessionSnapshotView,
    SessionStatus, SessionView,
};
