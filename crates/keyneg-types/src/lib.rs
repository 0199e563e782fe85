//! Shared types for the keyneg daemon.
//!
//! This crate holds the protocol constants, error enums and policy
//! configuration shared by the wire codec, the negotiation engine and the
//! daemon itself.

mod error;
mod policy;

pub use error::{CryptoError, NegotiateError, WireError};
pub use policy::PolicyConfig;

/// Magic number identifying negotiation frames on the wire.
pub const MAGIC: u32 = 0x0E45_474F;

/// Size of the fixed packet header in bytes.
pub const HEADER_SIZE: usize = 20;

/// Size of a negotiation nonce in bytes.
pub const NONCE_SIZE: usize = 32;

/// Size of the derived shared key in bytes.
pub const KEY_SIZE: usize = 32;

/// Maximum number of policies the registry will hold.
pub const MAX_POLICY_COUNT: usize = 4096;

/// Default per-policy negotiation timeout in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u32 = 1000;

/// Default per-policy retry budget. Stored with the policy; retransmission
/// itself is not implemented.
pub const DEFAULT_RETRY_TIMES: u32 = 3;

/// A specialized Result type for negotiation operations.
pub type NegotiateResult<T> = Result<T, NegotiateError>;
