use thiserror::Error;
use tokio_tungstenite::tungstenite;

use canco_core::ProtocolError;

/// Errors surfaced by the server loop and the client.
#[derive(Error, Debug)]
pub enum CollabError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}
