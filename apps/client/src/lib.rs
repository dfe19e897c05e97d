//! Relay client that forwards webhook deliveries to a local HTTP service
//!
//! A [`Session`] holds one WebSocket connection to the relay server. Each
//! delivery read from it is forwarded to the local service by the
//! [`Forwarder`] and the local response is written back as a result.

pub mod cli;
pub mod config;
pub mod console;
pub mod credentials;
pub mod forwarder;
pub mod session;

#[cfg(test)]
mod testing;

pub use config::SessionConfig;
pub use console::Console;
pub use forwarder::Forwarder;
pub use session::{Session, SessionState};
