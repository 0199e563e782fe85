//! Error types for the keyneg daemon.

use thiserror::Error;

/// Errors that can occur while decoding a datagram into a packet.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum WireError {
    /// Input shorter than the fixed header
    #[error("datagram shorter than the fixed header")]
    Truncated,

    /// Magic number did not match
    #[error("bad magic number")]
    BadMagic,

    /// Received an unrecognized packet type
    #[error("unrecognized packet type")]
    UnknownPacketType,

    /// Payload is not a whole number of words
    #[error("payload is not word-aligned")]
    Unaligned,

    /// The length field disagrees with the datagram size
    #[error("payload length field does not match the datagram")]
    LengthMismatch,
}

/// Errors that can occur during cryptographic operations.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CryptoError {
    /// The operating system random source failed
    #[error("random generator unavailable")]
    RngFailure,
}

/// Errors surfaced by negotiation operations.
///
/// `Ok(())` plays the role of a success code; everything else is a tagged
/// failure that callers match on.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum NegotiateError {
    /// No datagram became available within the requested wait
    #[error("operation timed out")]
    Timeout,

    /// Protocol violation, malformed payload or invalid argument
    #[error("invalid parameter")]
    InvalidParam,

    /// A session with this policy id already exists on this endpoint
    #[error("session already exists")]
    AlreadyExists,

    /// Session was abandoned before completing
    #[error("negotiation failed")]
    NegotiationFailed,

    /// Random generator or allocation failure
    #[error("memory or random source failure")]
    MemoryError,

    /// Transport-level failure
    #[error("socket operation failed")]
    SocketError,
}

impl From<WireError> for NegotiateError {
    fn from(_: WireError) -> Self {
        NegotiateError::InvalidParam
    }
}

impl From<CryptoError> for NegotiateError {
    fn from(_: CryptoError) -> Self {
        NegotiateError::MemoryError
    }
}
