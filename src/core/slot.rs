//! Combat slots and fixed-size per-slot storage

use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the four fixed combat positions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Slot {
    Primary,
    Support1,
    Support2,
    Opponent,
}

/// Which side of the fight a slot belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    /// Primary combatant and its supports
    Party,
    /// The opponent
    Enemy,
}

impl Slot {
    /// All slots in rotation order
    pub const ALL: [Slot; 4] = [Slot::Primary, Slot::Support1, Slot::Support2, Slot::Opponent];

    pub const fn index(self) -> usize {
        match self {
            Slot::Primary => 0,
            Slot::Support1 => 1,
            Slot::Support2 => 2,
            Slot::Opponent => 3,
        }
    }

    pub const fn side(self) -> Side {
        match self {
            Slot::Opponent => Side::Enemy,
            _ => Side::Party,
        }
    }

    pub const fn is_support(self) -> bool {
        matches!(self, Slot::Support1 | Slot::Support2)
    }

    /// Whether two slots fight on opposite sides
    pub fn opposes(self, other: Slot) -> bool {
        self.side() != other.side()
    }

    pub const fn label(self) -> &'static str {
        match self {
            Slot::Primary => "primary",
            Slot::Support1 => "support-1",
            Slot::Support2 => "support-2",
            Slot::Opponent => "opponent",
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl std::str::FromStr for Slot {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "primary" | "p" => Ok(Slot::Primary),
            "support-1" | "support1" | "s1" => Ok(Slot::Support1),
            "support-2" | "support2" | "s2" => Ok(Slot::Support2),
            "opponent" | "o" => Ok(Slot::Opponent),
            _ => Err(format!(
                "invalid slot '{s}' (expected: primary, support-1, support-2, opponent)"
            )),
        }
    }
}

/// Fixed four-entry map keyed by [`Slot`]
///
/// Support slots are optional, so every entry may be empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotMap<T> {
    entries: [Option<T>; 4],
}

impl<T> Default for SlotMap<T> {
    fn default() -> Self {
        SlotMap {
            entries: [None, None, None, None],
        }
    }
}

impl<T> SlotMap<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, slot: Slot) -> Option<&T> {
        self.entries[slot.index()].as_ref()
    }

    pub fn get_mut(&mut self, slot: Slot) -> Option<&mut T> {
        self.entries[slot.index()].as_mut()
    }

    /// Put a value in a slot, returning whatever was there before
    pub fn insert(&mut self, slot: Slot, value: T) -> Option<T> {
        self.entries[slot.index()].replace(value)
    }

    pub fn remove(&mut self, slot: Slot) -> Option<T> {
        self.entries[slot.index()].take()
    }

    pub fn contains(&self, slot: Slot) -> bool {
        self.entries[slot.index()].is_some()
    }

    pub fn clear(&mut self) {
        for entry in &mut self.entries {
            *entry = None;
        }
    }

    /// Occupied entries in rotation order
    pub fn iter(&self) -> impl Iterator<Item = (Slot, &T)> {
        Slot::ALL
            .into_iter()
            .zip(self.entries.iter())
            .filter_map(|(slot, entry)| entry.as_ref().map(|value| (slot, value)))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Slot, &mut T)> {
        Slot::ALL
            .into_iter()
            .zip(self.entries.iter_mut())
            .filter_map(|(slot, entry)| entry.as_mut().map(|value| (slot, value)))
    }

    /// Occupied slots in rotation order
    pub fn occupied(&self) -> impl Iterator<Item = Slot> + '_ {
        self.iter().map(|(slot, _)| slot)
    }

    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| e.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Transform every occupied entry
    pub fn map<U>(&self, mut f: impl FnMut(Slot, &T) -> U) -> SlotMap<U> {
        let mut out = SlotMap::new();
        for (slot, value) in self.iter() {
            out.insert(slot, f(slot, value));
        }
        out
    }
}
