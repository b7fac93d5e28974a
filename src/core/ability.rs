//! Combatant abilities
//!
//! An ability is either an attack or a heal. The two carry disjoint fields,
//! so they are modelled as an enum and consumers go through
//! [`Ability::as_attack`] / [`Ability::as_healing`] rather than reading
//! fields that may not exist.

use crate::dice::DiceExpr;
use serde::{Deserialize, Serialize};

/// Most strikes a single attack ability may make
pub const MAX_STRIKES: u32 = 10;

/// A damaging ability
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttackAbility {
    pub name: String,
    /// Damage rolled per strike
    pub damage: DiceExpr,
    /// Whether each strike must beat the defender's armor class
    pub requires_attack_roll: bool,
    /// Number of strikes (1 for ordinary abilities)
    pub attacks: u32,
    /// Extra damage added to every strike that lands
    pub bonus_damage: Option<DiceExpr>,
}

impl AttackAbility {
    pub fn new(name: impl Into<String>, damage: DiceExpr) -> Self {
        AttackAbility {
            name: name.into(),
            damage,
            requires_attack_roll: false,
            attacks: 1,
            bonus_damage: None,
        }
    }

    pub fn with_attack_roll(mut self) -> Self {
        self.requires_attack_roll = true;
        self
    }

    pub fn with_attacks(mut self, attacks: u32) -> Self {
        self.attacks = attacks.clamp(1, MAX_STRIKES);
        self
    }

    pub fn with_bonus_damage(mut self, bonus: DiceExpr) -> Self {
        self.bonus_damage = Some(bonus);
        self
    }

    pub fn is_multi_strike(&self) -> bool {
        self.attacks > 1
    }
}

/// A self-targeted healing ability
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealingAbility {
    pub name: String,
    pub healing: DiceExpr,
}

impl HealingAbility {
    pub fn new(name: impl Into<String>, healing: DiceExpr) -> Self {
        HealingAbility {
            name: name.into(),
            healing,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Ability {
    Attack(AttackAbility),
    Healing(HealingAbility),
}

impl Ability {
    pub fn name(&self) -> &str {
        match self {
            Ability::Attack(a) => &a.name,
            Ability::Healing(h) => &h.name,
        }
    }

    pub fn as_attack(&self) -> Option<&AttackAbility> {
        match self {
            Ability::Attack(a) => Some(a),
            Ability::Healing(_) => None,
        }
    }

    pub fn as_healing(&self) -> Option<&HealingAbility> {
        match self {
            Ability::Healing(h) => Some(h),
            Ability::Attack(_) => None,
        }
    }

    pub fn is_healing(&self) -> bool {
        matches!(self, Ability::Healing(_))
    }
}

impl From<AttackAbility> for Ability {
    fn from(a: AttackAbility) -> Self {
        Ability::Attack(a)
    }
}

impl From<HealingAbility> for Ability {
    fn from(h: HealingAbility) -> Self {
        Ability::Healing(h)
    }
}
