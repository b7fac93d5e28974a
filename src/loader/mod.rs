//! Combatant catalog loading
//!
//! Stat blocks come from JSON and are validated on the way into a battle.

pub mod catalog;

pub use catalog::{
    normalize_id, AbilityDefinition, Catalog, CatalogError, CombatantCatalog, CombatantTemplate,
};
