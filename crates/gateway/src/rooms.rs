use std::collections::{HashMap, HashSet};

use clinic_common::ConsultationId;

/// Live room membership: which connections are attached to which consultation.
///
/// A connection belongs to at most one room. Rooms exist only while they have
/// members.
#[derive(Debug, Default)]
pub struct RoomRegistry {
    /// consultation → conn_ids
    rooms: HashMap<ConsultationId, HashSet<String>>,
    /// conn_id → consultation (reverse lookup for cleanup on disconnect)
    by_conn: HashMap<String, ConsultationId>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach `conn_id` to `room`, detaching it from any other room first.
    /// Returns the room it was moved out of, if it changed rooms.
    pub fn join(&mut self, conn_id: &str, room: ConsultationId) -> Option<ConsultationId> {
        if self.by_conn.get(conn_id) == Some(&room) {
            return None;
        }
        let previous = self.leave(conn_id);
        self.rooms
            .entry(room.clone())
            .or_default()
            .insert(conn_id.to_string());
        self.by_conn.insert(conn_id.to_string(), room);
        previous
    }

    /// Detach `conn_id` from its room. Returns the room it was in.
    pub fn leave(&mut self, conn_id: &str) -> Option<ConsultationId> {
        let room = self.by_conn.remove(conn_id)?;
        if let Some(members) = self.rooms.get_mut(&room) {
            members.remove(conn_id);
            if members.is_empty() {
                self.rooms.remove(&room);
            }
        }
        Some(room)
    }

    /// Current members of `room`, sorted for stable iteration.
    pub fn members(&self, room: &ConsultationId) -> Vec<String> {
        let mut out: Vec<String> = self
            .rooms
            .get(room)
            .map(|m| m.iter().cloned().collect())
            .unwrap_or_default();
        out.sort();
        out
    }

    pub fn room_of(&self, conn_id: &str) -> Option<&ConsultationId> {
        self.by_conn.get(conn_id)
    }

    pub fn member_count(&self, room: &ConsultationId) -> usize {
        self.rooms.get(room).map_or(0, HashSet::len)
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_and_list_members() {
        let mut reg = RoomRegistry::new();
        assert!(reg.join("a", "c1".into()).is_none());
        assert!(reg.join("b", "c1".into()).is_none());
        assert_eq!(reg.members(&"c1".into()), vec!["a", "b"]);
        assert_eq!(reg.room_count(), 1);
    }

    #[test]
    fn join_moves_connection_between_rooms() {
        let mut reg = RoomRegistry::new();
        reg.join("a", "c1".into());
        reg.join("b", "c1".into());

        let previous = reg.join("a", "c2".into());
        assert_eq!(previous, Some("c1".into()));
        assert_eq!(reg.members(&"c1".into()), vec!["b"]);
        assert_eq!(reg.members(&"c2".into()), vec!["a"]);
        assert_eq!(reg.room_of("a"), Some(&"c2".into()));
    }

    #[test]
    fn rejoining_same_room_is_noop() {
        let mut reg = RoomRegistry::new();
        reg.join("a", "c1".into());
        assert!(reg.join("a", "c1".into()).is_none());
        assert_eq!(reg.member_count(&"c1".into()), 1);
    }

    #[test]
    fn empty_rooms_are_dropped() {
        let mut reg = RoomRegistry::new();
        reg.join("a", "c1".into());
        assert_eq!(reg.leave("a"), Some("c1".into()));
        assert_eq!(reg.room_count(), 0);
        assert!(reg.members(&"c1".into()).is_empty());
        assert!(reg.leave("a").is_none());
    }
}
