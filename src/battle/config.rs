//! Battle tuning
//!
//! All timings are stored in milliseconds so the config round-trips through
//! JSON cleanly; accessors hand out [`Duration`]s.

use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// One row of the heal-chance table: below `hp_fraction`, heal with `chance`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HealThreshold {
    pub hp_fraction: f64,
    pub chance: f64,
}

/// Probabilities used by the autonomous opponent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyTuning {
    /// Checked in order; the first row whose fraction exceeds current HP wins
    pub heal_thresholds: Vec<HealThreshold>,
    /// Heal chance when no threshold matches
    pub base_heal_chance: f64,
    /// Chance of using an attack ability over a basic attack
    pub ability_chance: f64,
}

impl Default for PolicyTuning {
    fn default() -> Self {
        PolicyTuning {
            heal_thresholds: vec![
                HealThreshold {
                    hp_fraction: 0.3,
                    chance: 0.3,
                },
                HealThreshold {
                    hp_fraction: 0.5,
                    chance: 0.2,
                },
            ],
            base_heal_chance: 0.1,
            ability_chance: 0.7,
        }
    }
}

impl PolicyTuning {
    /// Heal chance for a given HP fraction
    pub fn heal_chance(&self, hp_fraction: f64) -> f64 {
        self.heal_thresholds
            .iter()
            .find(|t| hp_fraction < t.hp_fraction)
            .map(|t| t.chance)
            .unwrap_or(self.base_heal_chance)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BattleConfig {
    /// Pause before an autonomous slot commits to a move
    pub opponent_delay_ms: u64,
    /// Window within which identical effect requests are dropped
    pub dedup_window_ms: u64,
    /// Gap between the effects of consecutive strikes
    pub strike_stagger_ms: u64,
    /// Upper bound on a narrative request
    pub narrative_timeout_ms: u64,
    /// Bounded re-invocations when skipping defeated slots
    pub turn_retries: u32,
    /// Abilities drawn per combatant at battle start
    pub abilities_per_combatant: usize,
    pub policy: PolicyTuning,
}

impl Default for BattleConfig {
    fn default() -> Self {
        BattleConfig {
            opponent_delay_ms: 800,
            dedup_window_ms: 200,
            strike_stagger_ms: 100,
            narrative_timeout_ms: 60_000,
            turn_retries: 10,
            abilities_per_combatant: 3,
            policy: PolicyTuning::default(),
        }
    }
}

impl BattleConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from a JSON file; missing fields take their defaults
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }

    pub fn with_opponent_delay(mut self, delay: Duration) -> Self {
        self.opponent_delay_ms = delay.as_millis() as u64;
        self
    }

    pub fn with_dedup_window(mut self, window: Duration) -> Self {
        self.dedup_window_ms = window.as_millis() as u64;
        self
    }

    pub fn with_strike_stagger(mut self, stagger: Duration) -> Self {
        self.strike_stagger_ms = stagger.as_millis() as u64;
        self
    }

    pub fn with_narrative_timeout(mut self, timeout: Duration) -> Self {
        self.narrative_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_abilities_per_combatant(mut self, count: usize) -> Self {
        self.abilities_per_combatant = count;
        self
    }

    pub fn with_policy(mut self, policy: PolicyTuning) -> Self {
        self.policy = policy;
        self
    }

    pub fn opponent_delay(&self) -> Duration {
        Duration::from_millis(self.opponent_delay_ms)
    }

    pub fn dedup_window(&self) -> Duration {
        Duration::from_millis(self.dedup_window_ms)
    }

    pub fn strike_stagger(&self) -> Duration {
        Duration::from_millis(self.strike_stagger_ms)
    }

    pub fn narrative_timeout(&self) -> Duration {
        Duration::from_millis(self.narrative_timeout_ms)
    }
}
