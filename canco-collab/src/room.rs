//! A single shared canvas.
//!
//! ```text
//!            ┌──────────────── RwLock ────────────────┐
//! Room(id) ──┤ users:      [User, User, ...]          │
//!            │ shapes:     IndexMap<id, Shape>        │
//!            │ operations: [Operation, ...] (append)  │
//!            └────────────────────────────────────────┘
//! ```
//!
//! One lock guards all three collections. Mutations (including applying an
//! operation and queueing its event) take it exclusively; [`Room::broadcast`]
//! only needs it shared. Queueing never blocks, so the lock is never held
//! across network I/O.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use canco_core::{EventType, Operation, OperationType, Shape};

use crate::broadcast::{BroadcastStats, Broadcaster, OutboundSender};
use crate::processor::{self, Effect};

pub const DEFAULT_ROOM_TITLE: &str = "Untitled Room";
pub const DEFAULT_USER_NAME: &str = "Anonymous";

/// A connected participant. Lives in the room's user list while its
/// connection is open; dropping it closes the outbound channel, which ends
/// the connection's writer once it has drained.
#[derive(Debug)]
pub struct User {
    id: Uuid,
    name: String,
    outbound: OutboundSender,
}

impl User {
    pub fn new(outbound: OutboundSender) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: DEFAULT_USER_NAME.to_string(),
            outbound,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn outbound(&self) -> &OutboundSender {
        &self.outbound
    }

    pub fn info(&self) -> UserInfo {
        UserInfo {
            id: self.id,
            name: self.name.clone(),
        }
    }
}

/// Public identity of a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub id: Uuid,
    pub name: String,
}

/// Shapes in insertion order plus the append-only operation log.
#[derive(Debug, Default)]
pub struct CanvasState {
    pub(crate) shapes: IndexMap<String, Shape>,
    pub(crate) operations: Vec<Operation>,
}

impl CanvasState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shapes(&self) -> impl Iterator<Item = &Shape> {
        self.shapes.values()
    }

    pub fn shape(&self, id: &str) -> Option<&Shape> {
        self.shapes.get(id)
    }

    pub fn shape_count(&self) -> usize {
        self.shapes.len()
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }
}

/// Result of [`Room::apply_operation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Applied {
    pub kind: OperationType,
    pub effect: Effect,
    /// Event broadcast for this operation, if any
    pub event: Option<EventType>,
    /// Users the event was queued for
    pub recipients: usize,
}

/// Serializable view of a room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomSnapshot {
    pub id: String,
    pub title: String,
    pub users: Vec<UserInfo>,
    pub shapes: Vec<Shape>,
    pub operations: Vec<Operation>,
}

struct RoomInner {
    users: Vec<User>,
    canvas: CanvasState,
}

pub struct Room {
    id: String,
    title: String,
    inner: RwLock<RoomInner>,
    broadcaster: Broadcaster,
}

impl Room {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: DEFAULT_ROOM_TITLE.to_string(),
            inner: RwLock::new(RoomInner {
                users: Vec::new(),
                canvas: CanvasState::new(),
            }),
            broadcaster: Broadcaster::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// Register a connection's outbound channel as a new user.
    pub async fn add_user(&self, outbound: OutboundSender) -> UserInfo {
        let user = User::new(outbound);
        let info = user.info();

        let mut inner = self.inner.write().await;
        inner.users.push(user);
        log::info!(
            "User {} joined room {} ({} connected)",
            info.id,
            self.id,
            inner.users.len()
        );
        info
    }

    /// Like [`add_user`](Self::add_user), but refuses once `limit` users are
    /// connected. The check and the insert happen under one lock.
    pub async fn try_add_user(&self, outbound: OutboundSender, limit: usize) -> Option<UserInfo> {
        let mut inner = self.inner.write().await;
        if inner.users.len() >= limit {
            log::warn!("Room {} is full ({limit} users); refusing connection", self.id);
            return None;
        }

        let user = User::new(outbound);
        let info = user.info();
        inner.users.push(user);
        log::info!(
            "User {} joined room {} ({} connected)",
            info.id,
            self.id,
            inner.users.len()
        );
        Some(info)
    }

    /// Remove a user. No-op when the id is unknown.
    pub async fn remove_user(&self, user_id: Uuid) -> Option<UserInfo> {
        let mut inner = self.inner.write().await;
        let index = inner.users.iter().position(|user| user.id() == user_id)?;
        let user = inner.users.remove(index);
        log::info!(
            "User {user_id} left room {} ({} connected)",
            self.id,
            inner.users.len()
        );
        Some(user.info())
    }

    /// Journal and apply an operation, then queue its event for every user.
    ///
    /// Runs under the exclusive lock so that events are queued in the same
    /// order the operations were applied. A create whose id already exists
    /// stored nothing, so it is journaled but not broadcast.
    pub async fn apply_operation(&self, op: Operation) -> Applied {
        let kind = op.kind();
        let mut inner = self.inner.write().await;
        let effect = processor::apply(&self.id, &mut inner.canvas, op);

        let event = match effect {
            Effect::DuplicateIgnored => None,
            _ => EventType::for_operation(kind),
        };
        let recipients = match (event, inner.canvas.operations.last()) {
            (Some(event), Some(op)) => {
                self.broadcaster
                    .broadcast(&self.id, &inner.users, event.as_str(), op)
            }
            _ => 0,
        };

        Applied {
            kind,
            effect,
            event,
            recipients,
        }
    }

    /// Queue `{type: event_type, data: payload}` for every connected user.
    ///
    /// Returns the number of users the event was queued for.
    pub async fn broadcast<T: Serialize>(&self, event_type: &str, payload: &T) -> usize {
        let inner = self.inner.read().await;
        self.broadcaster
            .broadcast(&self.id, &inner.users, event_type, payload)
    }

    pub async fn user_count(&self) -> usize {
        self.inner.read().await.users.len()
    }

    pub async fn has_user(&self, user_id: Uuid) -> bool {
        self.inner
            .read()
            .await
            .users
            .iter()
            .any(|user| user.id() == user_id)
    }

    pub async fn users(&self) -> Vec<UserInfo> {
        self.inner.read().await.users.iter().map(User::info).collect()
    }

    /// Shapes in insertion order.
    pub async fn shapes(&self) -> Vec<Shape> {
        self.inner.read().await.canvas.shapes().cloned().collect()
    }

    pub async fn shape(&self, id: &str) -> Option<Shape> {
        self.inner.read().await.canvas.shape(id).cloned()
    }

    pub async fn shape_count(&self) -> usize {
        self.inner.read().await.canvas.shape_count()
    }

    pub async fn operations(&self) -> Vec<Operation> {
        self.inner.read().await.canvas.operations().to_vec()
    }

    pub async fn operation_count(&self) -> usize {
        self.inner.read().await.canvas.operations.len()
    }

    pub async fn snapshot(&self) -> RoomSnapshot {
        let inner = self.inner.read().await;
        RoomSnapshot {
            id: self.id.clone(),
            title: self.title.clone(),
            users: inner.users.iter().map(User::info).collect(),
            shapes: inner.canvas.shapes().cloned().collect(),
            operations: inner.canvas.operations().to_vec(),
        }
    }

    pub fn broadcast_stats(&self) -> BroadcastStats {
        self.broadcaster.stats()
    }

    /// Count messages a lagging connection skipped.
    pub fn record_dropped(&self, count: u64) {
        self.broadcaster.record_dropped(count);
    }
}

impl std::fmt::Debug for Room {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Room")
            .field("id", &self.id)
            .field("title", &self.title)
            .finish_non_exhaustive()
    }
}
