//! Error types for the IMU acquisition and streaming pipeline

use thiserror::Error;

#[cfg(feature = "mpsse")]
use crate::ffi::{status_to_string, FT_STATUS, FT_OK};

/// Error type for sensor, queue and sender operations
#[derive(Error, Debug)]
pub enum ImuError {
    /// FTDI driver error
    #[error("FTDI error: {status} ({description})")]
    FtdiError { status: u32, description: String },

    /// No MPSSE channels found
    #[error("No MPSSE channels found")]
    NoChannelsFound,

    /// Invalid channel index
    #[error("Invalid channel index: {0}")]
    InvalidChannel(u32),

    /// Register bus failure reported by a transport
    #[error("Bus error: {0}")]
    Bus(String),

    /// Invalid WHO_AM_I response
    #[error("Invalid WHO_AM_I response: expected 0x98, got 0x{0:02X}")]
    InvalidDeviceId(u8),

    /// Data transfer error
    #[error("Data transfer error: expected {expected} bytes, transferred {actual}")]
    TransferError { expected: u32, actual: u32 },

    /// Invalid parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// FIFO read attempted before `enable_fifo`
    #[error("FIFO not enabled on sensor {0}")]
    FifoNotEnabled(i32),

    /// Wire packet could not be decoded
    #[error("Malformed packet: {0}")]
    MalformedPacket(String),

    /// Sender could not reach its endpoint at startup
    #[error("Connection to {endpoint} failed: {source}")]
    ConnectFailed {
        endpoint: String,
        #[source]
        source: std::io::Error,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Termination handler could not be installed
    #[error("Failed to install termination handler: {0}")]
    SignalHandler(String),

    /// A supervised thread panicked
    #[error("{0} task panicked")]
    TaskPanicked(&'static str),

    /// Every configured sensor has failed
    #[error("All sensor devices failed")]
    AllDevicesFailed,
}

#[cfg(feature = "mpsse")]
impl From<FT_STATUS> for ImuError {
    fn from(status: FT_STATUS) -> Self {
        debug_assert!(status != FT_OK, "FT_OK is not an error");
        ImuError::FtdiError {
            status,
            description: status_to_string(status).to_string(),
        }
    }
}

/// Result type for IMU operations
pub type Result<T> = std::result::Result<T, ImuError>;
