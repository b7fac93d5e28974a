//! Core combat data model

pub mod ability;
pub mod combatant;
pub mod slot;
pub mod types;

pub use ability::{Ability, AttackAbility, HealingAbility, MAX_STRIKES};
pub use combatant::{Combatant, CombatantKind, DisplayMeta};
pub use slot::{Side, Slot, SlotMap};
pub use types::{CombatantName, ConversationId};
