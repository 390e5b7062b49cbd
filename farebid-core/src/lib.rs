#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![forbid(unsafe_code)]

pub mod cache;
pub mod clock;
pub mod config;
pub mod engine;
pub mod entities;
pub mod events;
pub mod framework;
pub mod model;
pub mod pricing;
pub mod processors;
pub mod push;
pub mod store;
pub mod utils;

#[cfg(test)]
mod test_utils;

pub use engine::{Deadline, EngineComponents, NegotiationError, SessionEngine};
