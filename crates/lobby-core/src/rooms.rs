//! Conversation id -> set of live sessions currently viewing it. No
//! persistence; fan-out rides the event bus, this map is the authoritative
//! membership record and the bookkeeping for forced eviction.

use std::collections::HashSet;

use dashmap::DashMap;

pub struct RoomRouter {
    rooms: DashMap<i64, HashSet<String>>,
}

impl RoomRouter {
    pub fn new() -> Self {
        Self {
            rooms: DashMap::new(),
        }
    }

    /// Idempotent: re-entering a joined room is a silent no-op.
    /// Returns true if the session was newly added.
    pub fn join(&self, room_id: i64, session_id: &str) -> bool {
        self.rooms
            .entry(room_id)
            .or_default()
            .insert(session_id.to_string())
    }

    /// Idempotent. Empty rooms are dropped from the map.
    pub fn leave(&self, room_id: i64, session_id: &str) -> bool {
        let Some(mut members) = self.rooms.get_mut(&room_id) else {
            return false;
        };
        let removed = members.remove(session_id);
        let now_empty = members.is_empty();
        drop(members);
        if now_empty {
            self.rooms.remove_if(&room_id, |_, members| members.is_empty());
        }
        removed
    }

    /// Remove a disconnecting session from every room it had entered.
    pub fn leave_all(&self, session_id: &str) {
        let room_ids: Vec<i64> = self.rooms.iter().map(|r| *r.key()).collect();
        for room_id in room_ids {
            self.leave(room_id, session_id);
        }
    }

    pub fn contains(&self, room_id: i64, session_id: &str) -> bool {
        self.rooms
            .get(&room_id)
            .is_some_and(|members| members.contains(session_id))
    }

    pub fn members(&self, room_id: i64) -> Vec<String> {
        self.rooms
            .get(&room_id)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Tear the room down entirely (group deletion). Returns the evicted
    /// sessions.
    pub fn evict_all(&self, room_id: i64) -> Vec<String> {
        self.rooms
            .remove(&room_id)
            .map(|(_, members)| members.into_iter().collect())
            .unwrap_or_default()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}

impl Default for RoomRouter {
    fn default() -> Self {
        Self::new()
    }
}
