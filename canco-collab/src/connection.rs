//! Per-connection tasks.
//!
//! ```text
//!  socket ──► ConnectionHandler::run ──► Room::apply_operation
//!                                              │
//!                                   outbound channel (per user)
//!                                              │
//!  socket ◄── write_outbound ◄─────────────────┘
//! ```
//!
//! The reader decodes `{type, data}` envelopes and forwards `operation`
//! payloads to the room; malformed messages are logged and skipped. When
//! the socket closes or errors the reader deregisters its user, which
//! drops the user's sender and lets the writer finish.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::Message;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use uuid::Uuid;

use canco_core::Envelope;

use crate::broadcast::OutboundReceiver;
use crate::room::{Applied, Room};

/// Inbound traffic counters, shareable across connections.
#[derive(Debug, Default)]
pub struct MessageCounters {
    pub messages: AtomicU64,
    pub bytes: AtomicU64,
    pub rejected: AtomicU64,
}

/// Totals for one connection, returned when its loop ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionSummary {
    pub messages: u64,
    pub operations: u64,
    pub ignored: u64,
    pub rejected: u64,
}

/// What happened to one inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handled {
    Applied(Applied),
    /// Well-formed envelope of a type the server does not act on
    Ignored,
    /// Could not be decoded; dropped
    Rejected,
}

/// Receive loop for one user in one room.
pub struct ConnectionHandler {
    room: Arc<Room>,
    user_id: Uuid,
    counters: Arc<MessageCounters>,
}

impl ConnectionHandler {
    pub fn new(room: Arc<Room>, user_id: Uuid) -> Self {
        Self {
            room,
            user_id,
            counters: Arc::new(MessageCounters::default()),
        }
    }

    /// Report inbound traffic into shared counters.
    pub fn with_counters(mut self, counters: Arc<MessageCounters>) -> Self {
        self.counters = counters;
        self
    }

    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    /// Process frames until the stream ends or fails, then remove the user
    /// from the room.
    pub async fn run<S>(self, mut incoming: S) -> ConnectionSummary
    where
        S: Stream<Item = Result<Message, axum::Error>> + Unpin,
    {
        let mut summary = ConnectionSummary::default();
        let room_id = self.room.id().to_string();

        while let Some(frame) = incoming.next().await {
            let handled = match frame {
                Ok(Message::Text(text)) => self.handle_text(&text).await,
                Ok(Message::Binary(bytes)) => match std::str::from_utf8(&bytes) {
                    Ok(text) => self.handle_text(text).await,
                    Err(e) => {
                        log::warn!(
                            "Dropping non-UTF-8 binary frame from user {} in room {room_id}: {e}",
                            self.user_id
                        );
                        self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                        Handled::Rejected
                    }
                },
                Ok(Message::Close(frame)) => {
                    log::debug!(
                        "User {} in room {room_id} sent close: {frame:?}",
                        self.user_id
                    );
                    break;
                }
                // Ping/pong are answered by the WebSocket layer
                Ok(_) => continue,
                Err(e) => {
                    log::warn!(
                        "Receive failed for user {} in room {room_id}: {e}",
                        self.user_id
                    );
                    break;
                }
            };

            summary.messages += 1;
            match handled {
                Handled::Applied(_) => summary.operations += 1,
                Handled::Ignored => summary.ignored += 1,
                Handled::Rejected => summary.rejected += 1,
            }
        }

        self.room.remove_user(self.user_id).await;
        log::info!(
            "Connection for user {} in room {room_id} ended: {summary:?}",
            self.user_id
        );
        summary
    }

    /// Decode one envelope and act on it.
    pub async fn handle_text(&self, text: &str) -> Handled {
        self.counters.messages.fetch_add(1, Ordering::Relaxed);
        self.counters
            .bytes
            .fetch_add(text.len() as u64, Ordering::Relaxed);

        let envelope = match Envelope::decode(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                log::warn!(
                    "Dropping message from user {} in room {}: {e}",
                    self.user_id,
                    self.room.id()
                );
                self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                return Handled::Rejected;
            }
        };

        if !envelope.is_operation() {
            log::debug!(
                "Ignoring {:?} message from user {} in room {}",
                envelope.kind,
                self.user_id,
                self.room.id()
            );
            return Handled::Ignored;
        }

        match envelope.into_operation() {
            Ok(op) => {
                log::debug!(
                    "User {} in room {} sent {} {}",
                    self.user_id,
                    self.room.id(),
                    op.kind(),
                    op.id
                );
                Handled::Applied(self.room.apply_operation(op).await)
            }
            Err(e) => {
                log::warn!(
                    "Dropping operation from user {} in room {}: {e}",
                    self.user_id,
                    self.room.id()
                );
                self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                Handled::Rejected
            }
        }
    }
}

/// Drain a user's outbound channel into the socket.
///
/// Each write gets `write_timeout`. A failed or timed-out write stops the
/// writer and drops the receiver, so later broadcasts to this user fail
/// fast. Messages skipped because the writer lagged are counted on the
/// room. Returns once the room has dropped the user's sender and the
/// channel is drained, or on the first failure.
pub async fn write_outbound<K>(
    mut outbound: OutboundReceiver,
    mut sink: K,
    write_timeout: Duration,
    room: Arc<Room>,
    user_id: Uuid,
) where
    K: Sink<Message, Error = axum::Error> + Unpin,
{
    let room_id = room.id();
    loop {
        let text = match outbound.recv().await {
            Ok(text) => text,
            Err(RecvError::Lagged(skipped)) => {
                log::warn!(
                    "User {user_id} in room {room_id} fell behind; dropped {skipped} oldest messages"
                );
                room.record_dropped(skipped);
                continue;
            }
            Err(RecvError::Closed) => break,
        };

        let frame = Message::Text(text.to_string());
        match tokio::time::timeout(write_timeout, sink.send(frame)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                log::warn!("Write to user {user_id} in room {room_id} failed: {e}");
                return;
            }
            Err(_) => {
                log::warn!(
                    "Write to user {user_id} in room {room_id} timed out after {write_timeout:?}"
                );
                return;
            }
        }
    }

    let _ = tokio::time::timeout(write_timeout, sink.close()).await;
    log::debug!("Writer for user {user_id} in room {room_id} finished");
}
