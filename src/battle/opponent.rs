//! Autonomous combatant policy
//!
//! A policy is activated by the session when its slot's turn begins and
//! cancelled when that stops being true. Activation only starts a delay; the
//! in-flight gate is not claimed until the delay expires, so a manual move
//! can still pre-empt it.

use crate::battle::config::PolicyTuning;
use crate::battle::resolver::ActionKind;
use crate::core::{Combatant, Slot};
use rand::seq::SliceRandom;
use rand::{Rng, RngCore};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyState {
    Idle,
    DelayPending { deadline: Instant },
    /// Holds the in-flight gate until the chosen action finalizes
    Committed,
}

/// Result of checking a policy's timer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyPoll {
    /// Nothing to do yet (or the policy is not waiting)
    NotDue,
    /// The delay ended but another move was already in flight
    Preempted,
    /// The delay ended and the policy now owns the turn
    Commit,
}

#[derive(Debug, Clone)]
pub struct OpponentPolicy {
    slot: Slot,
    delay: Duration,
    state: PolicyState,
}

impl OpponentPolicy {
    pub fn new(slot: Slot, delay: Duration) -> Self {
        OpponentPolicy {
            slot,
            delay,
            state: PolicyState::Idle,
        }
    }

    pub fn slot(&self) -> Slot {
        self.slot
    }

    pub fn state(&self) -> PolicyState {
        self.state
    }

    pub fn deadline(&self) -> Option<Instant> {
        match self.state {
            PolicyState::DelayPending { deadline } => Some(deadline),
            _ => None,
        }
    }

    /// Start the delay if idle. Returns whether a new delay began.
    pub fn activate(&mut self, now: Instant) -> bool {
        if self.state != PolicyState::Idle {
            return false;
        }
        let deadline = now + self.delay;
        debug!(
            slot = %self.slot,
            delay_ms = self.delay.as_millis() as u64,
            "policy delay started"
        );
        self.state = PolicyState::DelayPending { deadline };
        true
    }

    /// Drop any pending delay. Returns whether one was pending.
    pub fn cancel(&mut self) -> bool {
        let was_pending = matches!(self.state, PolicyState::DelayPending { .. });
        if was_pending {
            debug!(slot = %self.slot, "policy delay cancelled");
        }
        self.state = PolicyState::Idle;
        was_pending
    }

    /// Check the timer against `now`
    pub fn poll(&mut self, now: Instant, move_in_flight: bool) -> PolicyPoll {
        match self.state {
            PolicyState::DelayPending { deadline } if now >= deadline => {
                if move_in_flight {
                    debug!(slot = %self.slot, "policy pre-empted by a move in flight");
                    self.state = PolicyState::Idle;
                    PolicyPoll::Preempted
                } else {
                    self.state = PolicyState::Committed;
                    PolicyPoll::Commit
                }
            }
            _ => PolicyPoll::NotDue,
        }
    }

    /// The committed action finalized
    pub fn complete(&mut self) {
        if self.state == PolicyState::Committed {
            self.state = PolicyState::Idle;
        }
    }
}

/// Choose a move for `combatant`
///
/// Healing abilities are tried first with a chance that grows as HP falls;
/// otherwise an attack ability is used with `tuning.ability_chance`, or a
/// basic attack.
pub fn decide_action(
    combatant: &Combatant,
    tuning: &PolicyTuning,
    rng: &mut dyn RngCore,
) -> ActionKind {
    let healing: Vec<usize> = combatant.healing_abilities().map(|(i, _)| i).collect();
    let attacks: Vec<usize> = combatant.attack_abilities().map(|(i, _)| i).collect();

    if !healing.is_empty() {
        let chance = tuning.heal_chance(combatant.hp_fraction());
        if rng.gen::<f64>() < chance {
            return healing
                .choose(rng)
                .or_else(|| attacks.choose(rng))
                .map(|&i| ActionKind::Ability(i))
                .unwrap_or(ActionKind::BasicAttack);
        }
    }

    if !attacks.is_empty() && rng.gen::<f64>() < tuning.ability_chance {
        if let Some(&index) = attacks.choose(rng) {
            return ActionKind::Ability(index);
        }
    }

    ActionKind::BasicAttack
}
