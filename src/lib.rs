//! Core functionality for the keyneg daemon.
//!
//! keyneg negotiates a 32-byte shared secret per policy with a remote peer
//! over UDP, driven by commands arriving on a local unix socket. This crate
//! wires the negotiation engine to its transport, control listener, policy
//! registry and stats sink; the protocol itself lives in the
//! `keyneg-session`, `keyneg-wire` and `keyneg-crypto` crates.

pub mod config;
pub mod control;
mod core;
pub mod registry;
pub mod stats;
pub mod transport;

pub use crate::core::{handle_control_command, Core, CoreError};
pub use config::{Config, ConfigError};

/// Daemon version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// Re-export commonly used types from the protocol crates.
pub use keyneg_session::{Negotiator, Session, SessionState};
pub use keyneg_types::{NegotiateError, PolicyConfig};
