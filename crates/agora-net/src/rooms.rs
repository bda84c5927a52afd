//! Room (conversation) membership tracking.
//!
//! The set records which rooms the client *intends* to be joined to. It is
//! mutated by explicit join/leave calls only, never by transport state, and
//! it is the source of truth for what must be re-joined after a reconnect.

use std::collections::HashSet;

use agora_shared::types::ConversationId;

#[derive(Debug, Clone, Default)]
pub struct RoomSet {
    rooms: HashSet<ConversationId>,
}

impl RoomSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record intent to be in a room. Returns false if already present.
    pub fn join(&mut self, room: ConversationId) -> bool {
        self.rooms.insert(room)
    }

    /// Drop intent to be in a room. Returns false if it was not present.
    pub fn leave(&mut self, room: &ConversationId) -> bool {
        self.rooms.remove(room)
    }

    pub fn contains(&self, room: &ConversationId) -> bool {
        self.rooms.contains(room)
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    /// Snapshot for reconnect replay.
    pub fn snapshot(&self) -> Vec<ConversationId> {
        self.rooms.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_leave_idempotent() {
        let mut rooms = RoomSet::new();
        let a = ConversationId::from("a");

        assert!(rooms.join(a.clone()));
        assert!(!rooms.join(a.clone()));
        assert_eq!(rooms.len(), 1);

        assert!(rooms.leave(&a));
        assert!(!rooms.leave(&a));
        assert!(rooms.is_empty());
    }

    #[test]
    fn test_snapshot_holds_every_room_once() {
        let mut rooms = RoomSet::new();
        rooms.join(ConversationId::from("a"));
        rooms.join(ConversationId::from("b"));
        rooms.join(ConversationId::from("a"));

        let snapshot = rooms.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert!(snapshot.contains(&ConversationId::from("a")));
        assert!(snapshot.contains(&ConversationId::from("b")));
    }
}
