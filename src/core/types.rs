//! Strongly-typed wrappers for battle concepts
//!
//! Newtypes keep combatant names and narrative conversation handles from
//! being mixed up with other strings.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Display name of a combatant
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CombatantName(String);

impl CombatantName {
    pub fn new(s: impl Into<String>) -> Self {
        CombatantName(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CombatantName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for CombatantName {
    fn from(s: String) -> Self {
        CombatantName(s)
    }
}

impl From<&str> for CombatantName {
    fn from(s: &str) -> Self {
        CombatantName(s.to_string())
    }
}

/// Opaque handle returned by the narrative collaborator
///
/// Passed back on the next request so the narration continues the same
/// conversation. The engine never inspects its contents.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(String);

impl ConversationId {
    pub fn new(s: impl Into<String>) -> Self {
        ConversationId(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ConversationId {
    fn from(s: &str) -> Self {
        ConversationId(s.to_string())
    }
}
