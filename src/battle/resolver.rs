//! Action resolution
//!
//! [`resolve`] is a pure function of the two combatants, the chosen action
//! and the dice. It never mutates a combatant: the session applies the
//! returned HP change in its finalize step, once the effects have landed.

use crate::battle::BattleError;
use crate::core::{Ability, AttackAbility, Combatant, Slot, MAX_STRIKES};
use crate::dice::{DiceExpr, DiceRoller};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// What the actor does on its turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionKind {
    /// Weapon attack
    BasicAttack,
    /// Ability by index into the actor's ability list
    Ability(usize),
}

/// A submitted move, with an optional explicit target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Action {
    pub kind: ActionKind,
    pub target: Option<Slot>,
}

impl Action {
    pub fn basic_attack() -> Self {
        Action {
            kind: ActionKind::BasicAttack,
            target: None,
        }
    }

    pub fn ability(index: usize) -> Self {
        Action {
            kind: ActionKind::Ability(index),
            target: None,
        }
    }

    pub fn with_target(mut self, target: Slot) -> Self {
        self.target = Some(target);
        self
    }
}

/// The four resolution shapes, plus healing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResolutionShape {
    BasicAttack,
    /// Single strike that must beat armor class
    GatedAbility,
    /// Single strike that always lands
    AutomaticAbility,
    MultiStrike,
    Healing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Hit,
    Miss,
    Heal,
}

/// One d20 hit test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttackRoll {
    pub natural: u32,
    pub bonus: i32,
    pub armor_class: i32,
}

impl AttackRoll {
    pub fn total(&self) -> i32 {
        (self.natural as i32).saturating_add(self.bonus)
    }

    pub fn hits(&self) -> bool {
        self.total() >= self.armor_class
    }
}

/// One strike of an attack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Strike {
    /// Zero-based position within the action
    pub index: u32,
    /// `None` when the strike lands automatically
    pub roll: Option<AttackRoll>,
    pub hit: bool,
    pub damage: u32,
}

/// Everything decided about one action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub actor: Slot,
    pub target: Slot,
    pub shape: ResolutionShape,
    pub outcome: Outcome,
    pub ability_name: Option<String>,
    pub strikes: SmallVec<[Strike; 4]>,
    /// Rolled damage or healing before clamping
    pub rolled: u32,
    pub hp_before: u32,
    pub hp_after: u32,
    pub event_text: String,
}

impl Resolution {
    /// Signed HP change on the target
    pub fn hp_delta(&self) -> i64 {
        self.hp_after as i64 - self.hp_before as i64
    }

    /// The target ends at 0 HP from this action
    pub fn defeats_target(&self) -> bool {
        self.outcome == Outcome::Hit && self.hp_before > 0 && self.hp_after == 0
    }

    pub fn hit_count(&self) -> usize {
        self.strikes.iter().filter(|s| s.hit).count()
    }

    /// HP actually removed from the target
    pub fn damage_dealt(&self) -> u32 {
        self.hp_before.saturating_sub(self.hp_after)
    }

    /// HP actually restored
    pub fn healing_done(&self) -> u32 {
        self.hp_after.saturating_sub(self.hp_before)
    }
}

/// A combatant together with the slot it occupies
#[derive(Debug, Clone, Copy)]
pub struct Participant<'a> {
    pub slot: Slot,
    pub combatant: &'a Combatant,
}

impl<'a> Participant<'a> {
    pub fn new(slot: Slot, combatant: &'a Combatant) -> Self {
        Participant { slot, combatant }
    }
}

/// Resolve `kind` from `attacker` against `defender`
///
/// For healing, `defender` is ignored and the attacker heals itself.
pub fn resolve(
    attacker: Participant<'_>,
    defender: Participant<'_>,
    kind: ActionKind,
    dice: &mut dyn DiceRoller,
) -> Result<Resolution, BattleError> {
    match kind {
        ActionKind::BasicAttack => {
            let weapon = attacker.combatant.weapon_damage();
            let strikes = roll_strikes(
                attacker.combatant,
                defender.combatant,
                1,
                true,
                weapon,
                None,
                dice,
            );
            Ok(build_attack(
                attacker,
                defender,
                ResolutionShape::BasicAttack,
                None,
                strikes,
            ))
        }
        ActionKind::Ability(index) => {
            let ability =
                attacker
                    .combatant
                    .ability(index)
                    .ok_or(BattleError::AbilityOutOfRange {
                        slot: attacker.slot,
                        index,
                        available: attacker.combatant.abilities.len(),
                    })?;
            match ability {
                Ability::Healing(heal) => {
                    let hp_before = attacker.combatant.hit_points();
                    let rolled = dice.roll_amount(&heal.healing);
                    let hp_after = hp_before
                        .saturating_add(rolled)
                        .min(attacker.combatant.max_hit_points());
                    let event_text = format!(
                        "{} uses {} and recovers {} HP ({} → {}).",
                        attacker.combatant.name,
                        heal.name,
                        hp_after - hp_before,
                        hp_before,
                        hp_after
                    );
                    Ok(Resolution {
                        actor: attacker.slot,
                        target: attacker.slot,
                        shape: ResolutionShape::Healing,
                        outcome: Outcome::Heal,
                        ability_name: Some(heal.name.clone()),
                        strikes: SmallVec::new(),
                        rolled,
                        hp_before,
                        hp_after,
                        event_text,
                    })
                }
                Ability::Attack(attack) => {
                    let shape = attack_shape(attack);
                    let gated = attack.requires_attack_roll || attack.is_multi_strike();
                    let strikes = roll_strikes(
                        attacker.combatant,
                        defender.combatant,
                        attack.attacks,
                        gated,
                        attack.damage,
                        attack.bonus_damage,
                        dice,
                    );
                    Ok(build_attack(attacker, defender, shape, Some(&attack.name), strikes))
                }
            }
        }
    }
}

fn attack_shape(attack: &AttackAbility) -> ResolutionShape {
    if attack.is_multi_strike() {
        ResolutionShape::MultiStrike
    } else if attack.requires_attack_roll {
        ResolutionShape::GatedAbility
    } else {
        ResolutionShape::AutomaticAbility
    }
}

/// Roll every strike: hit test first (if gated), then damage and bonus on a hit
fn roll_strikes(
    attacker: &Combatant,
    defender: &Combatant,
    count: u32,
    gated: bool,
    damage: DiceExpr,
    bonus: Option<DiceExpr>,
    dice: &mut dyn DiceRoller,
) -> SmallVec<[Strike; 4]> {
    (0..count.clamp(1, MAX_STRIKES))
        .map(|index| {
            let roll = gated.then(|| AttackRoll {
                natural: dice.roll_d20(),
                bonus: attacker.attack_bonus,
                armor_class: defender.armor_class,
            });
            let hit = roll.map_or(true, |r| r.hits());
            let damage = if hit {
                let base = dice.roll_amount(&damage);
                base.saturating_add(bonus.map_or(0, |b| dice.roll_amount(&b)))
            } else {
                0
            };
            Strike {
                index,
                roll,
                hit,
                damage,
            }
        })
        .collect()
}

fn build_attack(
    attacker: Participant<'_>,
    defender: Participant<'_>,
    shape: ResolutionShape,
    ability_name: Option<&str>,
    strikes: SmallVec<[Strike; 4]>,
) -> Resolution {
    let rolled = strikes
        .iter()
        .fold(0u32, |total, s| total.saturating_add(s.damage));
    let any_hit = strikes.iter().any(|s| s.hit);
    let hp_before = defender.combatant.hit_points();
    let hp_after = hp_before.saturating_sub(rolled);
    let outcome = if any_hit { Outcome::Hit } else { Outcome::Miss };

    let event_text = attack_text(
        attacker.combatant,
        defender.combatant,
        shape,
        ability_name,
        &strikes,
        hp_before,
        hp_after,
    );

    Resolution {
        actor: attacker.slot,
        target: defender.slot,
        shape,
        outcome,
        ability_name: ability_name.map(str::to_string),
        strikes,
        rolled,
        hp_before,
        hp_after,
        event_text,
    }
}

fn roll_note(roll: &Option<AttackRoll>) -> String {
    match roll {
        Some(r) => format!(
            " (roll {}{:+}={} vs AC {})",
            r.natural,
            r.bonus,
            r.total(),
            r.armor_class
        ),
        None => String::new(),
    }
}

fn attack_text(
    attacker: &Combatant,
    defender: &Combatant,
    shape: ResolutionShape,
    ability_name: Option<&str>,
    strikes: &[Strike],
    hp_before: u32,
    hp_after: u32,
) -> String {
    let a = &attacker.name;
    let d = &defender.name;
    let with = ability_name.map(|n| format!(" with {n}")).unwrap_or_default();

    let mut text = match shape {
        ResolutionShape::MultiStrike => {
            let name = ability_name.unwrap_or("a flurry");
            if strikes.iter().all(|s| !s.hit) {
                format!("{a} unleashes {name} on {d}, but every strike misses.")
            } else {
                let parts: Vec<String> = strikes
                    .iter()
                    .map(|s| {
                        if s.hit {
                            format!("strike {} hits for {}", s.index + 1, s.damage)
                        } else {
                            format!("strike {} misses", s.index + 1)
                        }
                    })
                    .collect();
                format!(
                    "{a} unleashes {name} on {d}: {}. {} total damage ({hp_before} → {hp_after} HP).",
                    parts.join(", "),
                    hp_before - hp_after
                )
            }
        }
        _ => {
            let strike = strikes[0];
            let note = roll_note(&strike.roll);
            if strike.hit {
                format!(
                    "{a} hits {d}{with} for {} damage{note} ({hp_before} → {hp_after} HP).",
                    strike.damage
                )
            } else {
                format!("{a} misses {d}{with}{note}.")
            }
        }
    };

    if hp_before > 0 && hp_after == 0 {
        text.push_str(&format!(" {d} falls!"));
    }
    text
}
