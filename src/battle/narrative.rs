//! Narrative batching
//!
//! Resolved actions append their event text to a [`NarrativeQueue`]. The
//! queue is flushed into one [`NarrativeRequest`] per completed round, or
//! replaced by a victory request the moment a combatant falls. Requests are
//! answered by a [`NarrativeService`]; any failure or timeout degrades to the
//! raw event text.

use crate::core::{Combatant, ConversationId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Combatant state as seen by the narrative collaborator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombatantBrief {
    pub name: String,
    pub class_label: String,
    pub hit_points: u32,
    pub max_hit_points: u32,
    pub flavor: String,
}

impl From<&Combatant> for CombatantBrief {
    fn from(c: &Combatant) -> Self {
        CombatantBrief {
            name: c.name.to_string(),
            class_label: c.class_label.clone(),
            hit_points: c.hit_points(),
            max_hit_points: c.max_hit_points(),
            flavor: c.flavor().to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NarrativeKind {
    Opening,
    Round,
    Victory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NarrativeRequestId(pub u64);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NarrativeRequest {
    pub id: NarrativeRequestId,
    pub kind: NarrativeKind,
    /// Structured event text to be turned into prose
    pub text: String,
    pub attacker: CombatantBrief,
    pub defender: CombatantBrief,
    /// Handle from the previous reply, if any
    pub conversation: Option<ConversationId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NarrativeReply {
    pub narrative: String,
    pub conversation: Option<ConversationId>,
}

impl NarrativeReply {
    /// Raw event text with the conversation handle left unchanged
    pub fn fallback(request: &NarrativeRequest) -> Self {
        NarrativeReply {
            narrative: request.text.clone(),
            conversation: request.conversation.clone(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NarrativeError {
    #[error("Narrative service unavailable: {0}")]
    Unavailable(String),

    #[error("Narrative request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Narrative service rejected the request: {0}")]
    Rejected(String),
}

/// External text-generation collaborator
#[async_trait]
pub trait NarrativeService: Send + Sync {
    async fn describe_battle_event(
        &self,
        request: &NarrativeRequest,
    ) -> Result<NarrativeReply, NarrativeError>;
}

/// Offline narrator that hands the event text straight back
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoNarrator;

impl EchoNarrator {
    pub fn reply_to(&self, request: &NarrativeRequest) -> NarrativeReply {
        NarrativeReply::fallback(request)
    }
}

#[async_trait]
impl NarrativeService for EchoNarrator {
    async fn describe_battle_event(
        &self,
        request: &NarrativeRequest,
    ) -> Result<NarrativeReply, NarrativeError> {
        Ok(self.reply_to(request))
    }
}

/// Ask the service, falling back to the raw text on error or timeout
pub async fn narrate_with_timeout(
    service: &dyn NarrativeService,
    request: &NarrativeRequest,
    timeout: Duration,
) -> NarrativeReply {
    match tokio::time::timeout(timeout, service.describe_battle_event(request)).await {
        Ok(Ok(reply)) => reply,
        Ok(Err(err)) => {
            warn!(
                request = request.id.0,
                error = %err,
                "narrative request failed, using event text"
            );
            NarrativeReply::fallback(request)
        }
        Err(_) => {
            warn!(
                request = request.id.0,
                timeout_ms = timeout.as_millis() as u64,
                "narrative request timed out, using event text"
            );
            NarrativeReply::fallback(request)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Outstanding {
    id: NarrativeRequestId,
    kind: NarrativeKind,
    superseded: bool,
}

/// Pending event text plus conversation continuity
#[derive(Debug, Clone, Default)]
pub struct NarrativeQueue {
    pending: Vec<String>,
    conversation: Option<ConversationId>,
    outstanding: Vec<Outstanding>,
    next_id: u64,
}

impl NarrativeQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, event_text: impl Into<String>) {
        self.pending.push(event_text.into());
    }

    pub fn pending(&self) -> &[String] {
        &self.pending
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn conversation(&self) -> Option<&ConversationId> {
        self.conversation.as_ref()
    }

    /// A request is out and not yet answered
    pub fn is_waiting(&self) -> bool {
        self.outstanding.iter().any(|o| !o.superseded)
    }

    fn issue(
        &mut self,
        kind: NarrativeKind,
        text: String,
        attacker: CombatantBrief,
        defender: CombatantBrief,
    ) -> NarrativeRequest {
        let id = NarrativeRequestId(self.next_id);
        self.next_id += 1;
        self.outstanding.push(Outstanding {
            id,
            kind,
            superseded: false,
        });
        debug!(request = id.0, ?kind, "narrative request issued");
        NarrativeRequest {
            id,
            kind,
            text,
            attacker,
            defender,
            conversation: self.conversation.clone(),
        }
    }

    /// Request for the battle's opening line
    pub fn opening(
        &mut self,
        text: impl Into<String>,
        attacker: CombatantBrief,
        defender: CombatantBrief,
    ) -> NarrativeRequest {
        self.issue(NarrativeKind::Opening, text.into(), attacker, defender)
    }

    /// Turn everything queued into one request, built from the combatants'
    /// state at flush time. Returns `None` if nothing is queued.
    pub fn flush(
        &mut self,
        attacker: CombatantBrief,
        defender: CombatantBrief,
    ) -> Option<NarrativeRequest> {
        if self.pending.is_empty() {
            return None;
        }
        let text = std::mem::take(&mut self.pending).join(" ");
        Some(self.issue(NarrativeKind::Round, text, attacker, defender))
    }

    /// Drop the queued batch and any unanswered round request in favour of
    /// a victory request
    pub fn supersede_with_victory(
        &mut self,
        text: impl Into<String>,
        victor: CombatantBrief,
        defeated: CombatantBrief,
    ) -> NarrativeRequest {
        self.pending.clear();
        for o in &mut self.outstanding {
            if o.kind == NarrativeKind::Round {
                o.superseded = true;
            }
        }
        self.issue(NarrativeKind::Victory, text.into(), victor, defeated)
    }

    /// Accept a reply
    ///
    /// Returns the kind of request answered, or `None` for unknown, stale or
    /// superseded requests (which are dropped). The reply's conversation
    /// handle is kept for the next request.
    pub fn complete(
        &mut self,
        id: NarrativeRequestId,
        reply: &NarrativeReply,
    ) -> Option<NarrativeKind> {
        let pos = self.outstanding.iter().position(|o| o.id == id)?;
        let outstanding = self.outstanding.remove(pos);
        if outstanding.superseded {
            debug!(request = id.0, "dropping superseded narrative reply");
            return None;
        }
        if let Some(conversation) = &reply.conversation {
            self.conversation = Some(conversation.clone());
        }
        Some(outstanding.kind)
    }

    /// Forget everything except the id counter, so old replies stay stale
    pub fn reset(&mut self) {
        self.pending.clear();
        self.conversation = None;
        self.outstanding.clear();
    }
}
