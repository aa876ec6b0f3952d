//! Error handling for the chat server

use std::fmt;
use std::io;

/// Result type alias for chat server operations
pub type Result<T> = std::result::Result<T, CastError>;

/// Chat server error types
#[derive(Debug)]
pub enum CastError {
    /// Fatal setup failure (socket/bind/listen); aborts server startup
    Setup(String),
    /// Failure on a single connection; closes that connection only
    Connection(String),
    /// Payload exceeded the 65535-byte frame limit and was truncated
    Truncated {
        /// Bytes that did not fit into the frame
        dropped: usize,
    },
    /// Append to a message that was already committed
    AlreadyCommitted,
    /// Buffer growth failure; the in-progress message is discarded
    Allocation(String),
    /// Invalid configuration or command line
    Config(String),
}

impl CastError {
    /// Create a fatal setup error
    pub fn setup<T: Into<String>>(msg: T) -> Self {
        CastError::Setup(msg.into())
    }

    /// Create a per-connection error
    pub fn connection<T: Into<String>>(msg: T) -> Self {
        CastError::Connection(msg.into())
    }

    /// Create an allocation error
    pub fn allocation<T: Into<String>>(msg: T) -> Self {
        CastError::Allocation(msg.into())
    }

    /// Create a configuration error
    pub fn config<T: Into<String>>(msg: T) -> Self {
        CastError::Config(msg.into())
    }

    /// Whether this error must abort server startup
    pub fn is_fatal(&self) -> bool {
        matches!(self, CastError::Setup(_))
    }
}

impl fmt::Display for CastError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CastError::Setup(msg) => write!(f, "Setup error: {}", msg),
            CastError::Connection(msg) => write!(f, "Connection error: {}", msg),
            CastError::Truncated { dropped } => {
                write!(f, "Payload truncated: {} bytes over the frame limit", dropped)
            }
            CastError::AlreadyCommitted => write!(f, "Message is already committed"),
            CastError::Allocation(msg) => write!(f, "Allocation error: {}", msg),
            CastError::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for CastError {}

impl From<io::Error> for CastError {
    fn from(err: io::Error) -> Self {
        CastError::Connection(format!("IO error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(CastError::setup("bind failed").is_fatal());
        assert!(!CastError::connection("reset by peer").is_fatal());
        assert!(!CastError::Truncated { dropped: 12 }.is_fatal());
    }

    #[test]
    fn test_display_truncated() {
        let err = CastError::Truncated { dropped: 7 };
        assert_eq!(
            err.to_string(),
            "Payload truncated: 7 bytes over the frame limit"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::ConnectionReset, "reset");
        let err: CastError = io_err.into();
        assert!(matches!(err, CastError::Connection(_)));
    }
}
