//! Error types for the slice controller

use thiserror::Error;

/// Slice controller error type
#[derive(Error, Debug)]
pub enum SliceError {
    /// Configuration error
    #[error("config error: {0}")]
    Config(String),

    /// Malformed hardware address
    #[error("invalid hardware address: {0}")]
    InvalidMac(String),

    /// Southbound send failed
    #[error("transport error on dpid {dpid}: {reason}")]
    Transport {
        /// Device the message was addressed to
        dpid: u64,
        /// Failure description
        reason: String,
    },

    /// Controller task is gone
    #[error("controller channel closed")]
    ChannelClosed,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for the slice controller
pub type SliceResult<T> = Result<T, SliceError>;
