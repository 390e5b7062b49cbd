//! Shared wire types, signatures and optional HTTP/WebSocket clients for the
//! farebid fare-negotiation service.

#[cfg(feature = "client")]
pub mod client;
pub mod objects;
pub mod signature;
