//! WebSocket client for a single canvas room.
//!
//! Thin wrapper over a `tokio-tungstenite` stream: operations go out as
//! `operation` envelopes, inbound frames come back decoded.

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use canco_core::{Envelope, Operation, ShapeEvent};

use crate::error::CollabError;
use crate::server::JOIN_PATH_PREFIX;

/// Something the server sent.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// `CREATE_SHAPE` / `UPDATE_SHAPE` / `DELETE_SHAPE`
    Shape(ShapeEvent),
    /// Any other envelope
    Other(Envelope),
    /// The server closed the connection, with its close frame if one was sent
    Disconnected(Option<CloseFrame>),
}

pub struct CanvasClient {
    room_id: String,
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl CanvasClient {
    /// `ws://host:port` + room id → join URL.
    pub fn room_url(server_url: &str, room_id: &str) -> String {
        format!(
            "{}{JOIN_PATH_PREFIX}{room_id}",
            server_url.trim_end_matches('/')
        )
    }

    /// Connect to `room_id` on the server at `server_url` (`ws://host:port`).
    pub async fn connect(server_url: &str, room_id: &str) -> Result<Self, CollabError> {
        let url = Self::room_url(server_url, room_id);
        let (stream, _response) = tokio_tungstenite::connect_async(url.as_str()).await?;
        log::debug!("Connected to {url}");

        Ok(Self {
            room_id: room_id.to_string(),
            stream,
        })
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    pub async fn send_operation(&mut self, op: &Operation) -> Result<(), CollabError> {
        self.send_envelope(&Envelope::operation(op)?).await
    }

    pub async fn send_envelope(&mut self, envelope: &Envelope) -> Result<(), CollabError> {
        self.send_text(envelope.encode()?).await
    }

    /// Send a raw text frame, valid JSON or not.
    pub async fn send_text(&mut self, text: impl Into<String>) -> Result<(), CollabError> {
        self.stream.send(Message::text(text.into())).await?;
        Ok(())
    }

    /// Wait for the next event from the server.
    ///
    /// Control frames are skipped. A frame that is not a valid envelope is
    /// returned as an error; the connection stays usable.
    pub async fn next_event(&mut self) -> Result<ClientEvent, CollabError> {
        loop {
            let text = match self.stream.next().await {
                Some(Ok(Message::Text(text))) => text.to_string(),
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => text,
                    Err(_) => {
                        log::warn!("Skipping non-UTF-8 binary frame in room {}", self.room_id);
                        continue;
                    }
                },
                Some(Ok(Message::Close(frame))) => return Ok(ClientEvent::Disconnected(frame)),
                Some(Ok(_)) => continue,
                Some(Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed))
                | None => return Ok(ClientEvent::Disconnected(None)),
                Some(Err(e)) => return Err(e.into()),
            };

            let envelope = Envelope::decode(&text)?;
            return Ok(match ShapeEvent::from_envelope(&envelope)? {
                Some(event) => ClientEvent::Shape(event),
                None => ClientEvent::Other(envelope),
            });
        }
    }

    /// Close the connection.
    pub async fn close(mut self) -> Result<(), CollabError> {
        match self.stream.close(None).await {
            Ok(())
            | Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}
