//! Error types for serial port operations.

use thiserror::Error;

/// Errors that can occur while opening or operating a serial port.
#[derive(Debug, Error)]
pub enum Error {
    /// The device identifier could not be acquired (does not exist,
    /// permission denied, or already exclusively held).
    #[error("failed to open serial port {port}: {source}")]
    Open {
        port: String,
        #[source]
        source: std::io::Error,
    },

    /// The OS rejected the requested line-control state, or the requested
    /// combination is not expressible on this platform.
    #[error("configuration error: {reason}")]
    Config { reason: String },

    /// A write, read, or availability query failed at the OS level after the
    /// handle was successfully opened.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An operation was attempted on a handle that was never successfully
    /// opened or has been closed.
    #[error("serial port is not open")]
    NotOpen,
}

impl Error {
    /// Create an `Open` error from a port name and the underlying cause.
    pub fn open(port: impl Into<String>, source: std::io::Error) -> Self {
        Self::Open {
            port: port.into(),
            source,
        }
    }

    /// Create a `Config` error from a message.
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
