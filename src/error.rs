// ABOUTME: Session-level error type shared by the client pool and the server
// ABOUTME: Wraps transport and codec failures and carries protocol status codes with their descriptions

use crate::codec::CodecError;
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    /// I/O error on the socket (connect, read, write)
    #[error("Connection error: {0}")]
    Connection(#[from] io::Error),

    /// Malformed or out-of-bounds packet
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// The peer answered with a non-zero status
    #[error("Protocol error {status}: {description}")]
    Protocol { status: u32, description: &'static str },

    #[error("Operation timeout")]
    Timeout,

    /// Wrong response type for the request in flight
    #[error("Unexpected PDU: expected {expected}, got {actual}")]
    UnexpectedPdu { expected: String, actual: String },

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Invalid session state: {0}")]
    InvalidState(String),

    /// No auth record for the (isp, client id) pair
    #[error("Unknown client: {0}")]
    UnknownClient(String),

    /// The rate limiter or the in-flight window refused the call
    #[error("Flow control: send rate exceeded")]
    FlowControl,

    /// No healthy session is available right now
    #[error("No healthy session available")]
    PoolExhausted,

    /// No number segment matched the destination
    #[error("No route for phone number {0}")]
    NoRoute(String),
}

impl GatewayError {
    /// Worth retrying after a short back-off
    pub fn is_transient(&self) -> bool {
        matches!(self, GatewayError::FlowControl | GatewayError::PoolExhausted)
    }

    /// A decode failure inside a well-framed packet. The packet has been
    /// consumed and the stream is still in sync.
    pub fn is_body_error(&self) -> bool {
        match self {
            GatewayError::Codec(err) => !matches!(
                err,
                CodecError::InvalidPduLength { .. } | CodecError::InvalidCommandId(_) | CodecError::Io(_)
            ),
            _ => false,
        }
    }
}

/// Result type alias for session operations
pub type GatewayResult<T> = Result<T, GatewayError>;

impl From<tokio::time::error::Elapsed> for GatewayError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        GatewayError::Timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codec_errors_convert() {
        let err: GatewayError = CodecError::InvalidCommandId(7).into();
        assert!(matches!(err, GatewayError::Codec(CodecError::InvalidCommandId(7))));
        assert!(!err.is_transient());
    }

    #[test]
    fn back_pressure_is_transient() {
        assert!(GatewayError::FlowControl.is_transient());
        assert!(GatewayError::PoolExhausted.is_transient());
        assert!(!GatewayError::Timeout.is_transient());
    }

    #[test]
    fn protocol_error_formats_description() {
        let err = GatewayError::Protocol {
            status: 3,
            description: "authentication failed",
        };
        assert_eq!(err.to_string(), "Protocol error 3: authentication failed");
    }
}
