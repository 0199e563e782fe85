//! Wire codec for negotiation datagrams.
//!
//! One datagram carries exactly one packet: a fixed 20-byte little-endian
//! header followed by a payload of u32 words. Per-type payload constraints
//! (nonce sizes, empty CONFIRM) are enforced by the negotiation engine, not
//! here, so new message types can reuse the codec unchanged.

mod encoding;
mod packet;
mod types;

pub use encoding::*;
pub use packet::*;
pub use types::*;

use keyneg_types::WireError;

/// Result type for wire codec operations.
pub type WireResult<T> = Result<T, WireError>;
