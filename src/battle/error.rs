//! Rejections from the battle session
//!
//! Every illegal request is answered with one of these instead of a panic.
//! The session state is left untouched whenever an error is returned.

use crate::battle::session::BattlePhase;
use crate::core::Slot;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BattleError {
    #[error("Battle is not active (phase: {0:?})")]
    NotActive(BattlePhase),

    #[error("Battle has already started")]
    AlreadyStarted,

    #[error("Cannot start a battle without a primary combatant and an opponent")]
    MissingCombatant,

    #[error("Another action is already in flight")]
    MoveInFlight,

    #[error("It is {active}'s turn, not {slot}'s")]
    NotYourTurn { slot: Slot, active: Slot },

    #[error("No combatant in slot {0}")]
    EmptySlot(Slot),

    #[error("Combatant in slot {0} is defeated")]
    Defeated(Slot),

    #[error("Ability index {index} out of range for {slot} ({available} available)")]
    AbilityOutOfRange {
        slot: Slot,
        index: usize,
        available: usize,
    },

    #[error("{actor} cannot target {target}")]
    InvalidTarget { actor: Slot, target: Slot },

    #[error("Slot {0} is under manual control and awaiting a move")]
    AwaitingManualMove(Slot),

    #[error("Battle did not conclude within {0} actions")]
    ActionLimit(u32),
}
