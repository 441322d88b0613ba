use thiserror::Error;

use crate::operation::OperationType;

/// Errors raised while encoding or decoding wire messages.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Serialization error: {0}")]
    Serialization(#[source] serde_json::Error),
    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(#[source] serde_json::Error),
    #[error("Malformed operation: {0}")]
    MalformedOperation(#[source] serde_json::Error),
    #[error("Unknown operation type: {0:?}")]
    UnknownOperationType(String),
    #[error("Invalid {kind} payload: {message}")]
    InvalidPayload { kind: OperationType, message: String },
    #[error("Unexpected message type: {0:?}")]
    UnexpectedMessageType(String),
}
