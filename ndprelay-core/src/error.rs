//! Error types for ndprelay

use thiserror::Error;

/// Result type alias for ndprelay operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for ndprelay
#[derive(Error, Debug)]
pub enum Error {
    /// Underlying OS failure (socket, device, ioctl)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Interface could not be resolved by name or index
    #[error("Interface '{0}' not found")]
    InterfaceNotFound(String),

    /// Neither a name nor an index was given to an open call
    #[error("No interface name or index given")]
    InterfaceUnspecified,

    /// Name and index were both given but resolve to different interfaces
    #[error("Expected interface {name} to have index {expected}, found {actual}")]
    InterfaceMismatch {
        name: String,
        expected: u32,
        actual: u32,
    },

    /// Interface exposes no usable link-layer address
    #[error("Interface '{0}' has no link-layer address")]
    NoLinkAddress(String),

    /// Packet capture error
    #[error("Packet capture error: {0}")]
    Capture(String),

    /// Kernel filter could not be installed
    #[error("Filter error: {0}")]
    Filter(String),
}

impl Error {
    /// Create a capture error with a custom message
    pub fn capture<S: Into<String>>(msg: S) -> Self {
        Error::Capture(msg.into())
    }

    /// Create a filter error with a custom message
    pub fn filter<S: Into<String>>(msg: S) -> Self {
        Error::Filter(msg.into())
    }
}
