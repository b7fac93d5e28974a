//! Turn order
//!
//! Rotation follows [`Slot::ALL`]: primary, support-1, support-2, opponent,
//! then back to primary. Empty slots are not part of the rotation at all;
//! defeated slots are skipped with a bounded number of retries.

use crate::core::{Slot, SlotMap};

/// Result of advancing the turn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnAdvance {
    pub next: Slot,
    /// The advance crossed the opponent→primary edge
    pub round_complete: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnSequencer {
    previous: Option<Slot>,
    round: u32,
    max_retries: u32,
}

impl TurnSequencer {
    pub fn new(max_retries: u32) -> Self {
        TurnSequencer {
            previous: None,
            round: 1,
            max_retries,
        }
    }

    /// The slot that acted last
    pub fn previous(&self) -> Option<Slot> {
        self.previous
    }

    /// Current round, starting at 1
    pub fn round(&self) -> u32 {
        self.round
    }

    pub fn reset(&mut self) {
        self.previous = None;
        self.round = 1;
    }

    /// The occupied slot after `current` in rotation order, ignoring liveness
    ///
    /// `liveness` holds an entry for every occupied slot. Returns `current`
    /// when it is the only occupied slot.
    pub fn next_in_rotation(current: Slot, liveness: &SlotMap<bool>) -> Slot {
        let start = current.index();
        (1..=Slot::ALL.len())
            .map(|offset| Slot::ALL[(start + offset) % Slot::ALL.len()])
            .find(|slot| liveness.contains(*slot))
            .unwrap_or(current)
    }

    /// Next living slot after `current`, or `None` if retries run out
    ///
    /// Deterministic in `(current, liveness)`.
    pub fn next_slot(&self, current: Slot, liveness: &SlotMap<bool>) -> Option<TurnAdvance> {
        let mut from = current;
        let mut round_complete = false;
        for _ in 0..=self.max_retries {
            let candidate = Self::next_in_rotation(from, liveness);
            if candidate.index() <= from.index() {
                round_complete = true;
            }
            if liveness.get(candidate).copied().unwrap_or(false) {
                return Some(TurnAdvance {
                    next: candidate,
                    round_complete,
                });
            }
            from = candidate;
        }
        None
    }

    /// Move the turn on from `current`, recording it and counting rounds
    pub fn advance(&mut self, current: Slot, liveness: &SlotMap<bool>) -> Option<TurnAdvance> {
        let advance = self.next_slot(current, liveness)?;
        self.previous = Some(current);
        if advance.round_complete {
            self.round += 1;
        }
        Some(advance)
    }
}
