//! Error types for the duel engine

use crate::battle::BattleError;
use crate::dice::DiceError;
use crate::loader::CatalogError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DuelError {
    #[error("Dice error: {0}")]
    Dice(#[from] DiceError),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Battle error: {0}")]
    Battle(#[from] BattleError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<serde_json::Error> for DuelError {
    fn from(err: serde_json::Error) -> Self {
        DuelError::SerializationError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DuelError>;
