//! # Error Types
//!
//! Custom error types for the AMR decoder using `thiserror`.

use thiserror::Error;

use crate::amr::protocol::MessageKind;

/// Main error type for the AMR decoder
#[derive(Debug, Error)]
pub enum AmrError {
    /// CRC residual did not match the accept value
    #[error("{kind} checksum mismatch (residual 0x{residual:04X})")]
    Checksum { kind: MessageKind, residual: u16 },

    /// Raw payload shorter than the wire format requires
    #[error("{kind} payload too short: expected {expected} bytes, got {actual}")]
    Truncated {
        kind: MessageKind,
        expected: usize,
        actual: usize,
    },

    /// Frame header carried a tag no parser handles
    #[error("Unknown message type tag: {0}")]
    UnknownKind(u8),

    /// Ring frame too short for a header, or longer than any message
    #[error("Malformed frame of {len} bytes")]
    MalformedFrame { len: usize },

    /// Bit-range read or write outside the supplied buffer
    #[error("Bit range {offset}+{len} out of bounds for {available} bits")]
    BitRange {
        offset: usize,
        len: u8,
        available: usize,
    },

    /// Ring buffer errors
    #[error("Ring buffer error: {0}")]
    Ring(#[from] RingError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Ring buffer push failures.
///
/// Kept `Copy` and allocation-free because pushes happen on the bit clock.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum RingError {
    /// Backing storage was missing or too small at construction
    #[error("ring is not initialized")]
    Uninitialized,

    /// Zero-length frames cannot be distinguished from the wrap sentinel
    #[error("cannot push an empty frame")]
    EmptyFrame,

    /// Not enough contiguous space for the frame
    #[error("ring full: {requested} bytes requested, {free} free")]
    Full { requested: usize, free: usize },
}

/// Result type alias for the AMR decoder
pub type Result<T> = std::result::Result<T, AmrError>;
