use dashmap::DashMap;
use std::collections::HashSet;
use tandem_models::{RoomId, UserId};

/// In-memory room membership. Entries exist only while at least one member
/// is joined; an empty set is pruned so lookups never see ghost rooms.
#[derive(Debug, Default)]
pub struct RoomMembership {
    rooms: DashMap<RoomId, HashSet<UserId>>,
}

impl RoomMembership {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent: joining a room twice leaves a single membership entry.
    pub fn join(&self, room_id: RoomId, user_id: UserId) {
        self.rooms.entry(room_id).or_default().insert(user_id);
    }

    pub fn leave(&self, room_id: RoomId, user_id: UserId) {
        self.rooms
            .remove_if_mut(&room_id, |_, members| {
                members.remove(&user_id);
                members.is_empty()
            });
    }

    /// Remove the user from every room, returning the rooms it was in.
    pub fn leave_all(&self, user_id: UserId) -> Vec<RoomId> {
        let joined: Vec<RoomId> = self
            .rooms
            .iter()
            .filter(|entry| entry.value().contains(&user_id))
            .map(|entry| *entry.key())
            .collect();
        for room_id in &joined {
            self.leave(*room_id, user_id);
        }
        joined
    }

    pub fn contains(&self, room_id: RoomId, user_id: UserId) -> bool {
        self.rooms
            .get(&room_id)
            .map(|members| members.contains(&user_id))
            .unwrap_or(false)
    }

    pub fn members(&self, room_id: RoomId) -> Vec<UserId> {
        self.rooms
            .get(&room_id)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}
