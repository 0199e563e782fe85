//! Policy configuration delivered over the control socket.

use std::net::{Ipv4Addr, SocketAddrV4};

use serde::Deserialize;

use crate::{DEFAULT_RETRY_TIMES, DEFAULT_TIMEOUT_MS};

/// A single negotiation policy: which peer to negotiate with and how long a
/// session for it may stay in flight.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PolicyConfig {
    /// Policy id, used as the session identifier. Zero is reserved.
    pub policy_id: u32,
    /// Remote peer address.
    pub remote_ip: Ipv4Addr,
    /// Remote peer UDP port.
    pub remote_port: u16,
    /// Session timeout; sessions older than this are swept.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u32,
    /// Retry budget. Stored for operators; no retransmission is performed.
    #[serde(default = "default_retry_times")]
    pub retry_times: u32,
}

fn default_timeout_ms() -> u32 {
    DEFAULT_TIMEOUT_MS
}

fn default_retry_times() -> u32 {
    DEFAULT_RETRY_TIMES
}

impl PolicyConfig {
    /// Peer endpoint this policy negotiates with.
    pub fn peer_addr(&self) -> SocketAddrV4 {
        SocketAddrV4::new(self.remote_ip, self.remote_port)
    }
}
