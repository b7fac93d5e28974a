//! Live combatant record

use crate::core::{Ability, AttackAbility, CombatantName, HealingAbility};
use crate::dice::DiceExpr;
use serde::{Deserialize, Serialize};

/// Damage used when a stat block has no usable weapon dice
pub const FALLBACK_DAMAGE: DiceExpr = DiceExpr::new(1, 4, 0);

/// Catalog classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CombatantKind {
    #[default]
    Hero,
    Monster,
}

/// Presentation data passed through untouched to renderers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DisplayMeta {
    pub image: Option<String>,
    pub color: Option<String>,
    /// Short flavor line handed to the narrative collaborator
    pub flavor: Option<String>,
}

/// The stat block and live hit points occupying a slot
///
/// `hit_points` is private so every change goes through [`Combatant::take_damage`]
/// and [`Combatant::heal`], which keep it within `0..=max_hit_points`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "CombatantRecord")]
pub struct Combatant {
    pub name: CombatantName,
    pub class_label: String,
    pub kind: CombatantKind,
    hit_points: u32,
    max_hit_points: u32,
    pub armor_class: i32,
    pub attack_bonus: i32,
    pub default_damage: DiceExpr,
    pub melee_damage: Option<DiceExpr>,
    pub ranged_damage: Option<DiceExpr>,
    pub abilities: Vec<Ability>,
    pub description: String,
    pub display: DisplayMeta,
}

/// Serialized form of [`Combatant`], checked before it becomes one
#[derive(Deserialize)]
struct CombatantRecord {
    name: CombatantName,
    class_label: String,
    kind: CombatantKind,
    hit_points: u32,
    max_hit_points: u32,
    armor_class: i32,
    attack_bonus: i32,
    default_damage: DiceExpr,
    melee_damage: Option<DiceExpr>,
    ranged_damage: Option<DiceExpr>,
    abilities: Vec<Ability>,
    description: String,
    display: DisplayMeta,
}

impl TryFrom<CombatantRecord> for Combatant {
    type Error = String;

    fn try_from(record: CombatantRecord) -> Result<Self, Self::Error> {
        if record.max_hit_points == 0 {
            return Err(format!("{}: max_hit_points must be at least 1", record.name));
        }
        if record.hit_points > record.max_hit_points {
            return Err(format!(
                "{}: hit_points {} exceeds max_hit_points {}",
                record.name, record.hit_points, record.max_hit_points
            ));
        }
        Ok(Combatant {
            name: record.name,
            class_label: record.class_label,
            kind: record.kind,
            hit_points: record.hit_points,
            max_hit_points: record.max_hit_points,
            armor_class: record.armor_class,
            attack_bonus: record.attack_bonus,
            default_damage: record.default_damage,
            melee_damage: record.melee_damage,
            ranged_damage: record.ranged_damage,
            abilities: record.abilities,
            description: record.description,
            display: record.display,
        })
    }
}

impl Combatant {
    /// Create a combatant at full health with no abilities
    ///
    /// A max HP of 0 is raised to 1 so a fresh combatant is never born defeated.
    pub fn new(name: impl Into<CombatantName>, max_hit_points: u32, armor_class: i32) -> Self {
        let max_hit_points = max_hit_points.max(1);
        Combatant {
            name: name.into(),
            class_label: String::new(),
            kind: CombatantKind::Hero,
            hit_points: max_hit_points,
            max_hit_points,
            armor_class,
            attack_bonus: 0,
            default_damage: FALLBACK_DAMAGE,
            melee_damage: None,
            ranged_damage: None,
            abilities: Vec::new(),
            description: String::new(),
            display: DisplayMeta::default(),
        }
    }

    pub fn with_class_label(mut self, label: impl Into<String>) -> Self {
        self.class_label = label.into();
        self
    }

    pub fn with_kind(mut self, kind: CombatantKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_attack_bonus(mut self, bonus: i32) -> Self {
        self.attack_bonus = bonus;
        self
    }

    pub fn with_default_damage(mut self, dice: DiceExpr) -> Self {
        self.default_damage = dice;
        self
    }

    pub fn with_melee_damage(mut self, dice: DiceExpr) -> Self {
        self.melee_damage = Some(dice);
        self
    }

    pub fn with_ranged_damage(mut self, dice: DiceExpr) -> Self {
        self.ranged_damage = Some(dice);
        self
    }

    pub fn with_ability(mut self, ability: impl Into<Ability>) -> Self {
        self.abilities.push(ability.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_display(mut self, display: DisplayMeta) -> Self {
        self.display = display;
        self
    }

    /// Start at something other than full health (clamped)
    pub fn with_hit_points(mut self, hit_points: u32) -> Self {
        self.hit_points = hit_points.min(self.max_hit_points);
        self
    }

    pub fn hit_points(&self) -> u32 {
        self.hit_points
    }

    pub fn max_hit_points(&self) -> u32 {
        self.max_hit_points
    }

    pub fn is_defeated(&self) -> bool {
        self.hit_points == 0
    }

    pub fn is_alive(&self) -> bool {
        !self.is_defeated()
    }

    /// Current HP as a fraction of max, in `0.0..=1.0`
    pub fn hp_fraction(&self) -> f64 {
        self.hit_points as f64 / self.max_hit_points as f64
    }

    /// Apply damage, flooring at 0. Returns the HP actually removed.
    pub fn take_damage(&mut self, amount: u32) -> u32 {
        let removed = amount.min(self.hit_points);
        self.hit_points -= removed;
        removed
    }

    /// Apply healing, capped at max. Returns the HP actually restored.
    pub fn heal(&mut self, amount: u32) -> u32 {
        let restored = amount.min(self.max_hit_points.saturating_sub(self.hit_points));
        self.hit_points += restored;
        restored
    }

    /// Restore full health for a new battle
    pub fn reset_for_battle(&mut self) {
        self.hit_points = self.max_hit_points;
    }

    /// Dice for a basic attack: melee, then ranged, then the default
    pub fn weapon_damage(&self) -> DiceExpr {
        self.melee_damage
            .or(self.ranged_damage)
            .unwrap_or(self.default_damage)
    }

    /// Attack abilities with their index into `abilities`
    pub fn attack_abilities(&self) -> impl Iterator<Item = (usize, &AttackAbility)> {
        self.abilities
            .iter()
            .enumerate()
            .filter_map(|(i, a)| a.as_attack().map(|atk| (i, atk)))
    }

    /// Healing abilities with their index into `abilities`
    pub fn healing_abilities(&self) -> impl Iterator<Item = (usize, &HealingAbility)> {
        self.abilities
            .iter()
            .enumerate()
            .filter_map(|(i, a)| a.as_healing().map(|heal| (i, heal)))
    }

    pub fn ability(&self, index: usize) -> Option<&Ability> {
        self.abilities.get(index)
    }

    pub fn flavor(&self) -> &str {
        self.display
            .flavor
            .as_deref()
            .unwrap_or(self.description.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn knight() -> Combatant {
        Combatant::new("Knight", 20, 16)
            .with_attack_bonus(3)
            .with_ability(AttackAbility::new("Cleave", DiceExpr::new(2, 6, 0)))
            .with_ability(HealingAbility::new("Second Wind", DiceExpr::new(1, 10, 1)))
            .with_ability(AttackAbility::new("Shove", DiceExpr::new(1, 4, 0)))
    }

    #[test]
    fn test_damage_floors_at_zero() {
        let mut c = knight().with_hit_points(1);
        assert_eq!(c.take_damage(7), 1);
        assert_eq!(c.hit_points(), 0);
        assert!(c.is_defeated());
        assert_eq!(c.take_damage(3), 0);
        assert_eq!(c.hit_points(), 0);
    }

    #[test]
    fn test_deserialize_rejects_broken_hit_points() {
        let json = serde_json::to_value(knight().with_hit_points(12)).unwrap();
        let back: Combatant = serde_json::from_value(json.clone()).unwrap();
        assert_eq!(back.hit_points(), 12);
        assert_eq!(back.max_hit_points(), 20);

        let mut overfull = json.clone();
        overfull["hit_points"] = 25.into();
        assert!(serde_json::from_value::<Combatant>(overfull).is_err());

        let mut empty = json;
        empty["max_hit_points"] = 0.into();
        empty["hit_points"] = 0.into();
        assert!(serde_json::from_value::<Combatant>(empty).is_err());
    }

    #[test]
    fn test_heal_caps_at_max() {
        let mut c = knight().with_hit_points(19);
        assert_eq!(c.heal(50), 1);
        assert_eq!(c.hit_points(), 20);
        assert_eq!(c.heal(5), 0);
    }

    #[test]
    fn test_zero_max_hp_is_raised() {
        let c = Combatant::new("Wisp", 0, 10);
        assert_eq!(c.max_hit_points(), 1);
        assert!(c.is_alive());
    }

    #[test]
    fn test_hp_fraction_and_reset() {
        let mut c = knight();
        c.take_damage(15);
        assert!((c.hp_fraction() - 0.25).abs() < 1e-9);
        c.reset_for_battle();
        assert_eq!(c.hit_points(), 20);
    }

    #[test]
    fn test_ability_partitions_keep_indices() {
        let c = knight();
        let attacks: Vec<usize> = c.attack_abilities().map(|(i, _)| i).collect();
        let heals: Vec<usize> = c.healing_abilities().map(|(i, _)| i).collect();
        assert_eq!(attacks, vec![0, 2]);
        assert_eq!(heals, vec![1]);
    }

    #[test]
    fn test_weapon_damage_preference() {
        let base = Combatant::new("Scout", 10, 12).with_default_damage(DiceExpr::new(1, 6, 0));
        assert_eq!(base.weapon_damage(), DiceExpr::new(1, 6, 0));

        let ranged = base.clone().with_ranged_damage(DiceExpr::new(1, 8, 0));
        assert_eq!(ranged.weapon_damage(), DiceExpr::new(1, 8, 0));

        let melee = ranged.with_melee_damage(DiceExpr::new(1, 10, 0));
        assert_eq!(melee.weapon_damage(), DiceExpr::new(1, 10, 0));
    }
}
