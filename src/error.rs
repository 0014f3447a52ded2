//! Error types
//!
//! None of these reach the caller of the sample intake API; the pusher logs
//! and absorbs them. They surface from the lower-level building blocks
//! (demuxers, packagers, transports) so those stay testable on their own.

use thiserror::Error;

/// Top-level error type
#[derive(Debug, Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("media error: {0}")]
    Media(#[from] MediaError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("config error: {0}")]
    Config(String),
}

/// Elementary stream errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MediaError {
    /// No Annex-B start code where one was required.
    #[error("annexb start code not found at {position} of {size}B sample")]
    MalformedStream { size: usize, position: usize },

    /// SPS too short to carry profile and level.
    #[error("sps of {0}B is too short for an avc sequence header")]
    InvalidSequenceHeader(usize),
}

/// Outbound connection errors
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport not connected")]
    NotConnected,

    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("connect to {0} timed out")]
    Timeout(String),
}

pub type Result<T> = std::result::Result<T, Error>;
