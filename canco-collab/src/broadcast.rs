//! Fan-out of room events to every connected user.
//!
//! Each user owns a bounded `tokio::sync::broadcast` channel with a single
//! receiver held by the connection's writer task. An event is serialized
//! once into an `Arc<str>` and the same allocation is sent to every user.
//! Sending never blocks: a writer that falls behind by more than the
//! channel capacity skips the oldest messages (`RecvError::Lagged`) and
//! reports them through [`Broadcaster::record_dropped`]. A send to a user
//! whose writer is gone is logged and skipped so the remaining users still
//! receive the event.
//!
//! Stats are tracked via atomics so that broadcasting never takes a lock of
//! its own.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::broadcast;

use canco_core::Event;

use crate::room::User;

/// Sending half of a user's outbound channel, held by the room.
pub type OutboundSender = broadcast::Sender<Arc<str>>;
/// Receiving half, drained by the connection's writer task.
pub type OutboundReceiver = broadcast::Receiver<Arc<str>>;

/// Create a user's outbound channel holding at least `capacity` messages.
pub fn outbound_channel(capacity: usize) -> (OutboundSender, OutboundReceiver) {
    broadcast::channel(capacity.max(1))
}

/// Statistics for monitoring broadcast health.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastStats {
    /// Events serialized and fanned out
    pub events_sent: u64,
    /// Individual queue pushes that succeeded
    pub deliveries: u64,
    /// Sends rejected because the user's writer was gone
    pub failed_deliveries: u64,
    /// Messages a lagging writer skipped
    pub dropped_messages: u64,
}

#[derive(Default)]
struct AtomicBroadcastStats {
    events_sent: AtomicU64,
    deliveries: AtomicU64,
    failed_deliveries: AtomicU64,
    dropped_messages: AtomicU64,
}

/// Per-room broadcaster.
#[derive(Default)]
pub struct Broadcaster {
    stats: AtomicBroadcastStats,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serialize `{type: event_type, data: payload}` once and queue it for
    /// every user.
    ///
    /// Returns the number of users the event was queued for. Serialization
    /// and delivery failures are logged, never returned.
    pub fn broadcast<T: Serialize>(
        &self,
        room_id: &str,
        users: &[User],
        event_type: &str,
        payload: &T,
    ) -> usize {
        match Event::new(event_type, payload).encode() {
            Ok(text) => self.deliver(room_id, users, event_type, Arc::from(text)),
            Err(e) => {
                log::error!("Failed to encode {event_type} event for room {room_id}: {e}");
                0
            }
        }
    }

    /// Queue a pre-encoded message for every user.
    pub fn deliver(
        &self,
        room_id: &str,
        users: &[User],
        event_type: &str,
        message: Arc<str>,
    ) -> usize {
        let mut delivered = 0;

        for user in users {
            match user.outbound().send(message.clone()) {
                Ok(_) => delivered += 1,
                Err(_) => {
                    self.stats.failed_deliveries.fetch_add(1, Ordering::Relaxed);
                    log::warn!(
                        "Failed to deliver {event_type} to user {} in room {room_id}: writer closed",
                        user.id()
                    );
                }
            }
        }

        self.stats.events_sent.fetch_add(1, Ordering::Relaxed);
        self.stats
            .deliveries
            .fetch_add(delivered as u64, Ordering::Relaxed);
        log::trace!("Broadcast {event_type} in room {room_id} to {delivered}/{} users", users.len());

        delivered
    }

    /// Count messages a lagging writer skipped.
    pub fn record_dropped(&self, count: u64) {
        self.stats
            .dropped_messages
            .fetch_add(count, Ordering::Relaxed);
    }

    /// Lock-free snapshot of the counters.
    pub fn stats(&self) -> BroadcastStats {
        BroadcastStats {
            events_sent: self.stats.events_sent.load(Ordering::Relaxed),
            deliveries: self.stats.deliveries.load(Ordering::Relaxed),
            failed_deliveries: self.stats.failed_deliveries.load(Ordering::Relaxed),
            dropped_messages: self.stats.dropped_messages.load(Ordering::Relaxed),
        }
    }
}
