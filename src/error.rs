//! Error types for alplink.

use thiserror::Error;

/// Main error type for all link and bridge operations.
#[derive(Debug, Error)]
pub enum LinkError {
    /// I/O error on the underlying transport.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Rejected before any I/O took place (negative pin, unknown handle, ...).
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The link is closed or its transport was lost.
    #[error("Connection closed")]
    ConnectionClosed,

    /// `close()` was called on a link that is already closed.
    #[error("Link already closed")]
    AlreadyClosed,

    /// No protocol with the given name in the registry.
    #[error("Unknown protocol: {0}")]
    UnknownProtocol(String),

    /// The pub/sub client refused a publish or subscribe.
    #[error("Bus error: {0}")]
    Bus(String),
}

impl LinkError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        LinkError::InvalidArgument(msg.into())
    }
}

/// Result type alias using LinkError.
pub type Result<T> = std::result::Result<T, LinkError>;
