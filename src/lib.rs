//! Duel Engine - turn-based combat resolution for up to four combat slots
//!
//! The engine decides turn order, resolves attacks, abilities and healing
//! against hit-point pools, sequences visual-effect requests so each one
//! finalizes exactly once, batches narrative requests per round, and drives
//! an autonomous opponent. Rendering, prose generation and persistence are
//! collaborators reached through traits and channels.

pub mod battle;
pub mod core;
pub mod dice;
pub mod error;
pub mod loader;
pub mod simulate;

pub use error::{DuelError, Result};
