//! # canco-collab: shared canvas rooms over WebSocket
//!
//! ```text
//! ┌──────────────┐   {type, data} JSON   ┌──────────────────────────┐
//! │ CanvasClient │ ◄───────────────────► │ SyncServer               │
//! └──────────────┘                       │   RoomRegistry           │
//!                                        │     └─ Room (RwLock)     │
//!                                        │          users           │
//!                                        │          shapes          │
//!                                        │          operation log   │
//!                                        └──────────┬───────────────┘
//!                                                   │ Broadcaster
//!                                                   ▼
//!                                    per-user bounded broadcast channels
//! ```
//!
//! ## Modules
//!
//! - [`registry`]: room id → room, created exactly once
//! - [`room`]: users, shapes and operation log behind one lock
//! - [`processor`]: what each operation kind does to a room
//! - [`broadcast`]: per-user outbound channels and serialize-once fan-out
//! - [`connection`]: receive loop and socket writer for one user
//! - [`server`]: axum router: room creation, ping and WebSocket joins
//! - [`client`]: WebSocket client for one room

pub mod broadcast;
pub mod client;
pub mod connection;
pub mod error;
pub mod processor;
pub mod registry;
pub mod room;
pub mod server;

pub use broadcast::{
    outbound_channel, BroadcastStats, Broadcaster, OutboundReceiver, OutboundSender,
};
pub use client::{CanvasClient, ClientEvent};
pub use connection::{ConnectionHandler, ConnectionSummary, Handled, MessageCounters};
pub use error::CollabError;
pub use processor::Effect;
pub use registry::RoomRegistry;
pub use room::{Applied, CanvasState, Room, RoomSnapshot, User, UserInfo};
pub use server::{CreateRoomRequest, ServerConfig, ServerStats, SyncServer};
