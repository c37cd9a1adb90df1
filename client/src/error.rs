use shared::catalog::PayloadError;
use shared::{FrameError, ServerMessage};
use std::fmt;

#[derive(Debug)]
pub enum ClientError {
    Io(std::io::Error),
    Frame(FrameError),
    Payload(PayloadError),
    Cache(bincode::Error),
    /// The server closed the connection
    Closed,
    /// No reply arrived in time
    Timeout,
    /// `ClientRefused`, the client version is too old
    Refused(String),
    /// A request was answered with `success: false`
    Rejected(String),
    /// The server reported a protocol violation
    Protocol(String),
    DigestMismatch { expected: String, actual: String },
    Unexpected(ServerMessage),
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::Io(e) => write!(f, "I/O error: {}", e),
            ClientError::Frame(e) => write!(f, "{}", e),
            ClientError::Payload(e) => write!(f, "bad catalog: {}", e),
            ClientError::Cache(e) => write!(f, "bad catalog cache: {}", e),
            ClientError::Closed => write!(f, "connection closed by server"),
            ClientError::Timeout => write!(f, "timed out waiting for the server"),
            ClientError::Refused(reason) => write!(f, "client refused: {}", reason),
            ClientError::Rejected(message) => write!(f, "request rejected: {}", message),
            ClientError::Protocol(reason) => write!(f, "protocol error: {}", reason),
            ClientError::DigestMismatch { expected, actual } => write!(
                f,
                "catalog digest mismatch (expected {}, got {})",
                expected, actual
            ),
            ClientError::Unexpected(message) => write!(f, "unexpected message {:?}", message),
        }
    }
}

impl std::error::Error for ClientError {}

impl From<std::io::Error> for ClientError {
    fn from(e: std::io::Error) -> Self {
        ClientError::Io(e)
    }
}

impl From<FrameError> for ClientError {
    fn from(e: FrameError) -> Self {
        ClientError::Frame(e)
    }
}

impl From<PayloadError> for ClientError {
    fn from(e: PayloadError) -> Self {
        ClientError::Payload(e)
    }
}

impl From<bincode::Error> for ClientError {
    fn from(e: bincode::Error) -> Self {
        ClientError::Cache(e)
    }
}
