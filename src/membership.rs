//! Membership index: the bidirectional Roommate <-> Room relation
//!
//! Two ordered maps keyed by name, with membership edges stored as sets of
//! keys on both sides. Every mutation goes through an index method that
//! updates both directions, so the symmetry invariant
//! `m in r.mates <=> r in m.rooms` holds after every operation; neither side
//! can be mutated independently from outside.
//!
//! Name comparison is exact byte-wise ordering, no case folding. Zero-length
//! names are rejected at the parsing boundary, not here.

use std::collections::{BTreeMap, BTreeSet};

/// Reserved token in a mates list that toggles a room's open flag instead of
/// naming a member
pub const OPEN_WILDCARD: &str = "*";

/// A named user that may belong to any number of rooms
#[derive(Debug)]
pub struct Roommate {
    name: String,
    passwd: String,
    rooms: BTreeSet<String>,
}

impl Roommate {
    /// Unique name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Login password
    pub fn passwd(&self) -> &str {
        &self.passwd
    }

    /// Names of the rooms this roommate belongs to, in name order
    pub fn rooms(&self) -> impl Iterator<Item = &str> {
        self.rooms.iter().map(String::as_str)
    }

    /// Whether this roommate is a member of `room`
    pub fn is_in(&self, room: &str) -> bool {
        self.rooms.contains(room)
    }
}

/// A named room with a member set and an open flag
///
/// `is_open` is independent of membership: it is toggled by the `"*"`
/// wildcard in a mates list, and an open room admits non-member occupants.
#[derive(Debug)]
pub struct Room {
    name: String,
    is_open: bool,
    mates: BTreeSet<String>,
}

impl Room {
    /// Unique name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether non-members may occupy the room
    pub fn is_open(&self) -> bool {
        self.is_open
    }

    /// Names of the room's mates, in name order
    pub fn mates(&self) -> impl Iterator<Item = &str> {
        self.mates.iter().map(String::as_str)
    }

    /// Whether `mate` is a member of this room
    pub fn has_mate(&self, mate: &str) -> bool {
        self.mates.contains(mate)
    }

    /// Member count
    pub fn mate_count(&self) -> usize {
        self.mates.len()
    }
}

/// Outcome of a roommate upsert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// A new roommate was created
    Created,
    /// A roommate of that name exists; the existing entry wins
    AlreadyExists,
}

/// Exclusive owner of all Roommate and Room entities
#[derive(Debug, Default)]
pub struct MembershipIndex {
    mates: BTreeMap<String, Roommate>,
    rooms: BTreeMap<String, Room>,
}

impl MembershipIndex {
    /// Create an empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a roommate; idempotent, an existing entry keeps its password
    pub fn roommate_upsert(&mut self, name: &str, passwd: &str) -> UpsertOutcome {
        if self.mates.contains_key(name) {
            return UpsertOutcome::AlreadyExists;
        }
        self.mates.insert(
            name.to_string(),
            Roommate {
                name: name.to_string(),
                passwd: passwd.to_string(),
                rooms: BTreeSet::new(),
            },
        );
        UpsertOutcome::Created
    }

    /// Remove a roommate, severing the back-reference in each of its rooms
    /// first; no-op if absent
    pub fn roommate_remove(&mut self, name: &str) {
        if let Some(mate) = self.mates.remove(name) {
            for room_name in &mate.rooms {
                if let Some(room) = self.rooms.get_mut(room_name) {
                    room.mates.remove(name);
                }
            }
        }
    }

    /// Remove every roommate; rooms survive with empty member sets
    pub fn roommate_clear(&mut self) {
        self.mates.clear();
        for room in self.rooms.values_mut() {
            room.mates.clear();
        }
    }

    /// Add mates to a room, creating the room if absent
    ///
    /// The `"*"` wildcard sets the open flag and is not a membership entry.
    /// Names that do not resolve to an existing roommate are silently
    /// ignored; no roommate is ever created implicitly here.
    pub fn room_add_mates<S: AsRef<str>>(&mut self, room_name: &str, mate_names: &[S]) {
        let room = self
            .rooms
            .entry(room_name.to_string())
            .or_insert_with(|| Room {
                name: room_name.to_string(),
                is_open: false,
                mates: BTreeSet::new(),
            });
        for name in mate_names {
            let name = name.as_ref();
            if name == OPEN_WILDCARD {
                room.is_open = true;
                continue;
            }
            if let Some(mate) = self.mates.get_mut(name) {
                mate.rooms.insert(room_name.to_string());
                room.mates.insert(name.to_string());
            }
        }
    }

    /// Remove mates from a room; symmetric to [`Self::room_add_mates`]
    ///
    /// The `"*"` wildcard clears the open flag; unresolved names and an
    /// absent room are silently ignored.
    pub fn room_remove_mates<S: AsRef<str>>(&mut self, room_name: &str, mate_names: &[S]) {
        let Some(room) = self.rooms.get_mut(room_name) else {
            return;
        };
        for name in mate_names {
            let name = name.as_ref();
            if name == OPEN_WILDCARD {
                room.is_open = false;
                continue;
            }
            if let Some(mate) = self.mates.get_mut(name) {
                mate.rooms.remove(room_name);
                room.mates.remove(name);
            }
        }
    }

    /// Remove a room, severing the back-reference in each of its mates
    /// first; no-op if absent
    pub fn room_remove(&mut self, name: &str) {
        if let Some(room) = self.rooms.remove(name) {
            for mate_name in &room.mates {
                if let Some(mate) = self.mates.get_mut(mate_name) {
                    mate.rooms.remove(name);
                }
            }
        }
    }

    /// Remove every room; roommates survive with empty room sets
    pub fn room_clear(&mut self) {
        self.rooms.clear();
        for mate in self.mates.values_mut() {
            mate.rooms.clear();
        }
    }

    /// Look up a roommate by name
    pub fn roommate(&self, name: &str) -> Option<&Roommate> {
        self.mates.get(name)
    }

    /// Look up a room by name
    pub fn room(&self, name: &str) -> Option<&Room> {
        self.rooms.get(name)
    }

    /// Fresh name-ordered traversal of all roommates
    pub fn roommates(&self) -> impl Iterator<Item = &Roommate> {
        self.mates.values()
    }

    /// Fresh name-ordered traversal of all rooms
    pub fn rooms(&self) -> impl Iterator<Item = &Room> {
        self.rooms.values()
    }

    /// Roommate count
    pub fn roommate_count(&self) -> usize {
        self.mates.len()
    }

    /// Room count
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}
