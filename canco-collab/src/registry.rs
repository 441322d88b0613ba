//! Room registry: maps room ids to rooms.
//!
//! Built once at startup and shared (`Arc<RoomRegistry>`) with everything
//! that needs to find a room. Rooms are never evicted.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::room::Room;

#[derive(Default)]
pub struct RoomRegistry {
    rooms: RwLock<HashMap<String, Arc<Room>>>,
    /// Rooms constructed since startup
    created: AtomicU64,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the room for `room_id`, creating it on first use.
    ///
    /// Concurrent callers with the same id all receive the same instance;
    /// the room is constructed exactly once. The map lock is only held for
    /// the lookup or insert.
    pub async fn get_or_create(&self, room_id: &str) -> Arc<Room> {
        // Fast path: read lock
        {
            let rooms = self.rooms.read().await;
            if let Some(room) = rooms.get(room_id) {
                return room.clone();
            }
        }

        // Slow path: write lock, re-checked
        let mut rooms = self.rooms.write().await;
        if let Some(room) = rooms.get(room_id) {
            return room.clone();
        }

        let room = Arc::new(Room::new(room_id));
        rooms.insert(room_id.to_string(), room.clone());
        self.created.fetch_add(1, Ordering::Relaxed);
        log::info!("Created room {room_id} ({} rooms)", rooms.len());
        room
    }

    pub async fn get(&self, room_id: &str) -> Option<Arc<Room>> {
        self.rooms.read().await.get(room_id).cloned()
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    pub async fn room_ids(&self) -> Vec<String> {
        self.rooms.read().await.keys().cloned().collect()
    }

    pub fn rooms_created(&self) -> u64 {
        self.created.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_or_create_same_room() {
        let registry = RoomRegistry::new();

        let room1 = registry.get_or_create("r1").await;
        let room2 = registry.get_or_create("r1").await;

        assert!(Arc::ptr_eq(&room1, &room2));
        assert_eq!(room1.id(), "r1");
        assert_eq!(registry.room_count().await, 1);
        assert_eq!(registry.rooms_created(), 1);
    }

    #[tokio::test]
    async fn test_multiple_rooms() {
        let registry = RoomRegistry::new();

        let _a = registry.get_or_create("a").await;
        let _b = registry.get_or_create("b").await;

        assert_eq!(registry.room_count().await, 2);
        let mut ids = registry.room_ids().await;
        ids.sort();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_get_does_not_create() {
        let registry = RoomRegistry::new();
        assert!(registry.get("missing").await.is_none());
        assert_eq!(registry.room_count().await, 0);

        let created = registry.get_or_create("present").await;
        let found = registry.get("present").await.unwrap();
        assert!(Arc::ptr_eq(&created, &found));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_get_or_create_single_instance() {
        let registry = Arc::new(RoomRegistry::new());

        let handles: Vec<_> = (0..64)
            .map(|_| {
                let registry = registry.clone();
                tokio::spawn(async move { registry.get_or_create("r1").await })
            })
            .collect();

        let mut rooms = Vec::new();
        for handle in handles {
            rooms.push(handle.await.unwrap());
        }

        let first = &rooms[0];
        assert!(rooms.iter().all(|room| Arc::ptr_eq(room, first)));
        assert_eq!(registry.room_count().await, 1);
        assert_eq!(registry.rooms_created(), 1);
    }

    #[tokio::test]
    async fn test_isolated_registries() {
        let one = RoomRegistry::new();
        let two = RoomRegistry::new();

        let a = one.get_or_create("r1").await;
        let b = two.get_or_create("r1").await;

        assert!(!Arc::ptr_eq(&a, &b));
    }
}
