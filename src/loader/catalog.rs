//! Catalog of combatant stat blocks
//!
//! Provides lookup of combatant templates by id, and turns a template into a
//! validated [`Combatant`] for a battle.

use crate::core::combatant::FALLBACK_DAMAGE;
use crate::core::{
    Ability, AttackAbility, Combatant, CombatantKind, DisplayMeta, HealingAbility, MAX_STRIKES,
};
use crate::dice::DiceExpr;
use deunicode::deunicode;
use rand::seq::index::sample;
use rand::Rng;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, warn};

/// Stat block bundled with the crate
const BUILTIN_BESTIARY: &str = include_str!("../../data/bestiary.json");

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Catalog file not found: {0}")]
    NotFound(String),

    #[error("Failed to read catalog: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed catalog JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Unknown combatant '{0}'")]
    UnknownCombatant(String),

    #[error("Duplicate combatant id '{0}'")]
    DuplicateId(String),
}

/// Ability as written in catalog data, before validation
///
/// Dice are kept as raw strings so one bad entry can be dropped without
/// rejecting the whole file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AbilityDefinition {
    Attack {
        name: String,
        damage: String,
        #[serde(default)]
        requires_attack_roll: bool,
        #[serde(default = "default_attacks")]
        attacks: u32,
        #[serde(default)]
        bonus_damage: Option<String>,
    },
    Healing {
        name: String,
        healing: String,
    },
}

fn default_attacks() -> u32 {
    1
}

impl AbilityDefinition {
    pub fn name(&self) -> &str {
        match self {
            AbilityDefinition::Attack { name, .. } | AbilityDefinition::Healing { name, .. } => {
                name
            }
        }
    }

    /// Validate into a usable ability, or explain why it was rejected
    pub fn validate(&self) -> std::result::Result<Ability, String> {
        match self {
            AbilityDefinition::Attack {
                name,
                damage,
                requires_attack_roll,
                attacks,
                bonus_damage,
            } => {
                if *attacks == 0 || *attacks > MAX_STRIKES {
                    return Err(format!("strike count {attacks} outside 1..={MAX_STRIKES}"));
                }
                let damage = DiceExpr::parse(damage).map_err(|e| e.to_string())?;
                let bonus_damage = bonus_damage
                    .as_deref()
                    .map(DiceExpr::parse)
                    .transpose()
                    .map_err(|e| e.to_string())?;
                Ok(Ability::Attack(AttackAbility {
                    name: name.clone(),
                    damage,
                    requires_attack_roll: *requires_attack_roll,
                    attacks: *attacks,
                    bonus_damage,
                }))
            }
            AbilityDefinition::Healing { name, healing } => {
                let healing = DiceExpr::parse(healing).map_err(|e| e.to_string())?;
                Ok(Ability::Healing(HealingAbility::new(name.clone(), healing)))
            }
        }
    }
}

/// A catalog entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombatantTemplate {
    pub name: String,
    #[serde(default)]
    pub class_label: String,
    #[serde(default)]
    pub kind: CombatantKind,
    pub max_hit_points: i64,
    pub armor_class: i32,
    #[serde(default)]
    pub attack_bonus: i32,
    #[serde(default)]
    pub default_damage: Option<String>,
    #[serde(default)]
    pub melee_damage: Option<String>,
    #[serde(default)]
    pub ranged_damage: Option<String>,
    #[serde(default)]
    pub abilities: Vec<AbilityDefinition>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub display: DisplayMeta,
}

impl CombatantTemplate {
    /// Validated abilities, in catalog order; invalid ones are dropped
    pub fn valid_abilities(&self) -> Vec<Ability> {
        self.abilities
            .iter()
            .filter_map(|def| match def.validate() {
                Ok(ability) => Some(ability),
                Err(reason) => {
                    warn!(
                        combatant = %self.name,
                        ability = def.name(),
                        %reason,
                        "dropping invalid ability"
                    );
                    None
                }
            })
            .collect()
    }

    /// Build a full-health combatant carrying every valid ability
    pub fn to_combatant(&self) -> Combatant {
        let max_hp = if self.max_hit_points < 1 {
            warn!(
                combatant = %self.name,
                max_hit_points = self.max_hit_points,
                "invalid max HP, clamping to 1"
            );
            1
        } else {
            u32::try_from(self.max_hit_points).unwrap_or(u32::MAX)
        };

        let armor_class = if self.armor_class < 0 {
            warn!(
                combatant = %self.name,
                armor_class = self.armor_class,
                "negative AC, using 0"
            );
            0
        } else {
            self.armor_class
        };

        let mut combatant = Combatant::new(self.name.as_str(), max_hp, armor_class)
            .with_class_label(self.class_label.clone())
            .with_kind(self.kind)
            .with_attack_bonus(self.attack_bonus)
            .with_default_damage(
                self.weapon_dice("default_damage", self.default_damage.as_deref())
                    .unwrap_or(FALLBACK_DAMAGE),
            )
            .with_description(self.description.clone())
            .with_display(self.display.clone());
        combatant.melee_damage = self.weapon_dice("melee_damage", self.melee_damage.as_deref());
        combatant.ranged_damage = self.weapon_dice("ranged_damage", self.ranged_damage.as_deref());
        combatant.abilities = self.valid_abilities();
        combatant
    }

    /// Build a combatant with at most `limit` abilities sampled uniformly
    /// without replacement. Sampled abilities keep their catalog order.
    pub fn instantiate<R: Rng + ?Sized>(&self, limit: usize, rng: &mut R) -> Combatant {
        let mut combatant = self.to_combatant();
        let pool = std::mem::take(&mut combatant.abilities);
        combatant.abilities = select_abilities(pool, limit, rng);
        combatant
    }

    fn weapon_dice(&self, field: &str, notation: Option<&str>) -> Option<DiceExpr> {
        let notation = notation?;
        match DiceExpr::parse(notation) {
            Ok(expr) => Some(expr),
            Err(err) => {
                warn!(
                    combatant = %self.name,
                    field,
                    error = %err,
                    "ignoring invalid weapon dice"
                );
                None
            }
        }
    }
}

/// Pick up to `limit` abilities from `pool` uniformly without replacement
pub fn select_abilities<R: Rng + ?Sized>(
    pool: Vec<Ability>,
    limit: usize,
    rng: &mut R,
) -> Vec<Ability> {
    if pool.len() <= limit {
        return pool;
    }
    let mut picked = sample(rng, pool.len(), limit).into_vec();
    picked.sort_unstable();
    let mut slots: Vec<Option<Ability>> = pool.into_iter().map(Some).collect();
    picked
        .into_iter()
        .filter_map(|i| slots[i].take())
        .collect()
}

/// Read-only lookup of combatant templates
pub trait CombatantCatalog {
    fn lookup(&self, id: &str) -> Option<&CombatantTemplate>;

    /// Lookup that reports unknown ids as an error
    fn require(&self, id: &str) -> std::result::Result<&CombatantTemplate, CatalogError> {
        self.lookup(id)
            .ok_or_else(|| CatalogError::UnknownCombatant(id.to_string()))
    }
}

/// Normalize a combatant id: ASCII-fold, lowercase, spaces to underscores
pub fn normalize_id(id: &str) -> String {
    deunicode(id.trim())
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
}

/// In-memory catalog keyed by normalized id
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    templates: FxHashMap<String, CombatantTemplate>,
}

#[derive(Deserialize)]
struct CatalogFile {
    combatants: Vec<CatalogEntry>,
}

#[derive(Deserialize)]
struct CatalogEntry {
    #[serde(default)]
    id: Option<String>,
    #[serde(flatten)]
    template: CombatantTemplate,
}

impl Catalog {
    /// Create an empty catalog
    pub fn new() -> Self {
        Catalog {
            templates: FxHashMap::default(),
        }
    }

    /// Parse a catalog from JSON text
    ///
    /// The file is `{"combatants": [...]}`; each entry may carry an explicit
    /// `id`, otherwise its name is used.
    pub fn from_json_str(json: &str) -> std::result::Result<Self, CatalogError> {
        let file: CatalogFile = serde_json::from_str(json)?;
        let mut catalog = Catalog::new();
        for entry in file.combatants {
            let id = entry.id.unwrap_or_else(|| entry.template.name.clone());
            catalog.insert(&id, entry.template)?;
        }
        Ok(catalog)
    }

    /// Load a catalog file from disk
    pub fn load_from_path(path: &Path) -> std::result::Result<Self, CatalogError> {
        if !path.exists() {
            return Err(CatalogError::NotFound(path.display().to_string()));
        }
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Load a catalog file without blocking the async runtime
    pub async fn load_from_path_async(path: &Path) -> std::result::Result<Self, CatalogError> {
        let json = match tokio::fs::read_to_string(path).await {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CatalogError::NotFound(path.display().to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        let catalog = Self::from_json_str(&json)?;
        debug!(path = %path.display(), combatants = catalog.len(), "catalog loaded");
        Ok(catalog)
    }

    /// Catalog bundled with the crate
    pub fn builtin() -> std::result::Result<Self, CatalogError> {
        Self::from_json_str(BUILTIN_BESTIARY)
    }

    /// Add a template under a (normalized) id
    pub fn insert(
        &mut self,
        id: &str,
        template: CombatantTemplate,
    ) -> std::result::Result<(), CatalogError> {
        let key = normalize_id(id);
        if self.templates.contains_key(&key) {
            return Err(CatalogError::DuplicateId(key));
        }
        self.templates.insert(key, template);
        Ok(())
    }

    /// Normalized ids, sorted
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.templates.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

impl CombatantCatalog for Catalog {
    fn lookup(&self, id: &str) -> Option<&CombatantTemplate> {
        self.templates.get(&normalize_id(id))
    }
}
