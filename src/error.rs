use std::time::Duration;
use thiserror::Error;

/// Error taxonomy for the link core.
///
/// `DecodeError` and `ProtocolStall` are never raised to a collaborator as a
/// hard failure — they are counted and logged, and surface only indirectly
/// through a [`crate::LinkState`] transition. `TransportIO`, `ConfigError`
/// and `ShutdownTimeout` are returned directly from the API calls that can
/// fail.
#[derive(Debug, Error)]
pub enum LinkError {
    /// A socket bind/send/recv failed at the OS level.
    #[error("transport I/O failed: {0}")]
    TransportIO(#[from] std::io::Error),

    /// A packet failed structural validation (header, tail, length or
    /// checksum). Carries the reason for logging only.
    #[error("decode failed: {0}")]
    DecodeError(DecodeReason),

    /// The watchdog detected an RX or TX stall.
    #[error("protocol stalled: no traffic for {0:?}")]
    ProtocolStall(Duration),

    /// Invalid configuration at startup; fatal to `connect()` only.
    #[error("invalid configuration: {0}")]
    ConfigError(String),

    /// Background tasks did not join within the shutdown grace window.
    #[error("shutdown did not complete within {0:?}")]
    ShutdownTimeout(Duration),
}

/// Why a decode attempt was rejected. Kept separate from [`LinkError`] so
/// callers that only care about counting drops don't need to match on the
/// full error enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeReason {
    #[error("packet too short")]
    InvalidLength,
    #[error("unexpected header byte")]
    BadHeader,
    #[error("unexpected tail byte")]
    BadTail,
    #[error("checksum mismatch")]
    ChecksumMismatch,
}

pub type Result<T> = std::result::Result<T, LinkError>;
