//! Visual-effect sequencing
//!
//! The session never applies an action's result on its own schedule. It asks
//! the [`EffectScheduler`] for effects, hands them to the renderer, and waits
//! for the renderer to return the callback tokens. A [`PendingAction`] tracks
//! which tokens still gate the finalize step.

use crate::core::Slot;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Identifies one submitted action; never reused within a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActionId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EffectId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectKind {
    /// Weapon swing or shot
    Attack,
    /// Damaging ability
    Ability,
    Heal,
    /// Plays to a point short of the target
    Miss,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intensity {
    Light,
    Normal,
    Heavy,
}

impl Intensity {
    /// Damage at or above this is heavy
    pub const HEAVY_DAMAGE: u32 = 10;

    pub fn for_damage(damage: u32, killing_blow: bool) -> Self {
        if killing_blow || damage >= Self::HEAVY_DAMAGE {
            Intensity::Heavy
        } else {
            Intensity::Normal
        }
    }
}

/// Dedup identity: the same source, target and stagger delay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EffectKey {
    pub source: Slot,
    pub target: Slot,
    pub stagger_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallbackKind {
    /// The effect reached its target
    Impact,
    /// The effect finished playing
    Completion,
}

/// Token the renderer returns when an effect reaches a milestone
///
/// Not `Clone`: handing it back consumes it, so each token fires once.
#[derive(Debug, PartialEq, Eq)]
pub struct EffectCallback {
    action: ActionId,
    effect: EffectId,
    kind: CallbackKind,
}

impl EffectCallback {
    pub fn action(&self) -> ActionId {
        self.action
    }

    pub fn effect(&self) -> EffectId {
        self.effect
    }

    pub fn kind(&self) -> CallbackKind {
        self.kind
    }
}

/// An accepted effect, ready for the renderer
#[derive(Debug)]
pub struct EffectRequest {
    pub id: EffectId,
    pub action: ActionId,
    pub kind: EffectKind,
    pub source: Slot,
    pub target: Slot,
    pub intensity: Intensity,
    pub key: EffectKey,
    /// Delay before the effect starts
    pub stagger: Duration,
    /// Strike index for multi-strike abilities
    pub strike: Option<u32>,
    /// Present for hits and heals
    pub impact: Option<EffectCallback>,
    pub completion: EffectCallback,
}

impl EffectRequest {
    /// Split off the callback tokens, impact first
    pub fn into_callbacks(self) -> Vec<EffectCallback> {
        let mut callbacks = Vec::with_capacity(2);
        if let Some(impact) = self.impact {
            callbacks.push(impact);
        }
        callbacks.push(self.completion);
        callbacks
    }
}

/// What the session wants drawn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectDraft {
    pub kind: EffectKind,
    pub source: Slot,
    pub target: Slot,
    pub intensity: Intensity,
    pub stagger: Duration,
    pub strike: Option<u32>,
}

impl EffectDraft {
    pub fn key(&self) -> EffectKey {
        EffectKey {
            source: self.source,
            target: self.target,
            stagger_ms: self.stagger.as_millis() as u64,
        }
    }

    fn has_impact(&self) -> bool {
        self.kind != EffectKind::Miss
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    Accepted(EffectId),
    /// Dropped as a duplicate; its callbacks will never exist
    Deduplicated,
}

impl RequestOutcome {
    pub fn accepted(self) -> Option<EffectId> {
        match self {
            RequestOutcome::Accepted(id) => Some(id),
            RequestOutcome::Deduplicated => None,
        }
    }
}

#[derive(Debug)]
pub struct EffectScheduler {
    window: Duration,
    last_fired: FxHashMap<EffectKey, Instant>,
    outbox: Vec<EffectRequest>,
    next_id: u64,
}

impl EffectScheduler {
    pub fn new(window: Duration) -> Self {
        EffectScheduler {
            window,
            last_fired: FxHashMap::default(),
            outbox: Vec::new(),
            next_id: 0,
        }
    }

    /// Accept or drop an effect for `action`
    pub fn request(
        &mut self,
        action: ActionId,
        draft: EffectDraft,
        now: Instant,
    ) -> RequestOutcome {
        let key = draft.key();
        if let Some(last) = self.last_fired.get(&key) {
            if now.saturating_duration_since(*last) < self.window {
                debug!(?key, "dropping duplicate effect");
                return RequestOutcome::Deduplicated;
            }
        }
        self.last_fired.insert(key, now);

        let id = EffectId(self.next_id);
        self.next_id += 1;
        let impact = draft.has_impact().then_some(EffectCallback {
            action,
            effect: id,
            kind: CallbackKind::Impact,
        });
        self.outbox.push(EffectRequest {
            id,
            action,
            kind: draft.kind,
            source: draft.source,
            target: draft.target,
            intensity: draft.intensity,
            key,
            stagger: draft.stagger,
            strike: draft.strike,
            impact,
            completion: EffectCallback {
                action,
                effect: id,
                kind: CallbackKind::Completion,
            },
        });
        RequestOutcome::Accepted(id)
    }

    /// Take every accepted effect not yet handed out
    pub fn drain(&mut self) -> Vec<EffectRequest> {
        std::mem::take(&mut self.outbox)
    }

    /// Forget dedup history (after every finalize)
    pub fn clear_dedup(&mut self) {
        self.last_fired.clear();
    }

    /// Forget history and undelivered effects
    pub fn clear(&mut self) {
        self.last_fired.clear();
        self.outbox.clear();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionPhase {
    Requested,
    Impacted,
    Finalized,
}

/// What must happen before an action may finalize
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateProgress {
    /// Count of impact callbacks still owed
    Impacts { expected: u32, seen: u32 },
    /// A specific effect must complete
    Completion { effect: EffectId },
}

impl GateProgress {
    pub fn is_satisfied(&self) -> bool {
        match self {
            GateProgress::Impacts { expected, seen } => seen >= expected,
            GateProgress::Completion { .. } => false,
        }
    }
}

/// Per-action state: requested → impacted → finalized
#[derive(Debug, Clone)]
pub struct PendingAction<T> {
    pub id: ActionId,
    pub payload: T,
    phase: ActionPhase,
    gate: GateProgress,
}

impl<T> PendingAction<T> {
    pub fn new(id: ActionId, payload: T, gate: GateProgress) -> Self {
        PendingAction {
            id,
            payload,
            phase: ActionPhase::Requested,
            gate,
        }
    }

    pub fn phase(&self) -> ActionPhase {
        self.phase
    }

    pub fn gate(&self) -> GateProgress {
        self.gate
    }

    /// The gate needs nothing more (e.g. every gating effect was deduplicated)
    pub fn is_ready(&self) -> bool {
        self.phase != ActionPhase::Finalized && self.gate.is_satisfied()
    }

    /// Record a returned token. Returns `true` once finalize may run.
    pub fn on_callback(&mut self, callback: &EffectCallback) -> bool {
        if callback.action != self.id || self.phase == ActionPhase::Finalized {
            return false;
        }
        match (&mut self.gate, callback.kind) {
            (GateProgress::Impacts { seen, expected }, CallbackKind::Impact) => {
                *seen += 1;
                self.phase = ActionPhase::Impacted;
                *seen >= *expected
            }
            (GateProgress::Completion { effect }, CallbackKind::Completion) => {
                *effect == callback.effect
            }
            _ => false,
        }
    }

    /// Mark finalized; returns `false` if it already was
    pub fn finalize(&mut self) -> bool {
        if self.phase == ActionPhase::Finalized {
            return false;
        }
        self.phase = ActionPhase::Finalized;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(stagger_ms: u64) -> EffectDraft {
        EffectDraft {
            kind: EffectKind::Attack,
            source: Slot::Primary,
            target: Slot::Opponent,
            intensity: Intensity::Normal,
            stagger: Duration::from_millis(stagger_ms),
            strike: None,
        }
    }

    #[test]
    fn test_duplicate_within_window_dropped() {
        let start = Instant::now();
        let mut scheduler = EffectScheduler::new(Duration::from_millis(200));
        let first = scheduler.request(ActionId(0), draft(0), start);
        let second = scheduler.request(ActionId(0), draft(0), start + Duration::from_millis(50));
        assert!(matches!(first, RequestOutcome::Accepted(_)));
        assert_eq!(second, RequestOutcome::Deduplicated);

        // Only the first effect (and its callbacks) reaches the renderer
        let delivered = scheduler.drain();
        assert_eq!(delivered.len(), 1);
        assert_eq!(Some(delivered[0].id), first.accepted());
    }

    #[test]
    fn test_duplicate_after_window_accepted() {
        let start = Instant::now();
        let mut scheduler = EffectScheduler::new(Duration::from_millis(200));
        scheduler.request(ActionId(0), draft(0), start);
        let later = scheduler.request(ActionId(1), draft(0), start + Duration::from_millis(200));
        assert!(later.accepted().is_some());
    }

    #[test]
    fn test_different_stagger_is_distinct() {
        let now = Instant::now();
        let mut scheduler = EffectScheduler::new(Duration::from_millis(200));
        for ms in [0, 100, 200] {
            assert!(scheduler.request(ActionId(0), draft(ms), now).accepted().is_some());
        }
        assert_eq!(scheduler.drain().len(), 3);
    }

    #[test]
    fn test_clear_dedup() {
        let now = Instant::now();
        let mut scheduler = EffectScheduler::new(Duration::from_millis(200));
        scheduler.request(ActionId(0), draft(0), now);
        scheduler.clear_dedup();
        assert!(scheduler.request(ActionId(1), draft(0), now).accepted().is_some());
    }

    #[test]
    fn test_miss_has_no_impact_token() {
        let mut scheduler = EffectScheduler::new(Duration::from_millis(200));
        let miss = EffectDraft {
            kind: EffectKind::Miss,
            ..draft(0)
        };
        scheduler.request(ActionId(3), miss, Instant::now());
        let request = scheduler.drain().pop().unwrap();
        assert!(request.impact.is_none());
        assert_eq!(request.completion.kind(), CallbackKind::Completion);
        assert_eq!(request.into_callbacks().len(), 1);
    }

    #[test]
    fn test_impact_gate_counts() {
        let now = Instant::now();
        let mut scheduler = EffectScheduler::new(Duration::from_millis(200));
        scheduler.request(ActionId(7), draft(0), now);
        scheduler.request(ActionId(7), draft(100), now);
        let mut pending = PendingAction::new(
            ActionId(7),
            (),
            GateProgress::Impacts {
                expected: 2,
                seen: 0,
            },
        );

        let mut callbacks: Vec<EffectCallback> = scheduler
            .drain()
            .into_iter()
            .flat_map(EffectRequest::into_callbacks)
            .collect();
        // impact0, completion0, impact1, completion1
        assert!(!pending.on_callback(&callbacks.remove(0)));
        assert_eq!(pending.phase(), ActionPhase::Impacted);
        assert!(!pending.on_callback(&callbacks.remove(0)));
        assert!(pending.on_callback(&callbacks.remove(0)));
        assert!(pending.finalize());
        assert!(!pending.finalize());
    }

    #[test]
    fn test_completion_gate_waits_for_its_effect() {
        let now = Instant::now();
        let mut scheduler = EffectScheduler::new(Duration::from_millis(200));
        let miss = EffectDraft {
            kind: EffectKind::Miss,
            ..draft(0)
        };
        let effect = scheduler.request(ActionId(1), miss, now).accepted().unwrap();
        let mut pending = PendingAction::new(ActionId(1), (), GateProgress::Completion { effect });
        let token = scheduler.drain().pop().unwrap().completion;
        assert!(pending.on_callback(&token));
    }

    #[test]
    fn test_tokens_from_other_actions_ignored() {
        let now = Instant::now();
        let mut scheduler = EffectScheduler::new(Duration::from_millis(200));
        scheduler.request(ActionId(1), draft(0), now);
        let stale = scheduler.drain().pop().unwrap().impact.unwrap();
        let mut pending = PendingAction::new(
            ActionId(2),
            (),
            GateProgress::Impacts {
                expected: 1,
                seen: 0,
            },
        );
        assert!(!pending.on_callback(&stale));
        assert_eq!(pending.phase(), ActionPhase::Requested);
    }

    #[test]
    fn test_intensity() {
        assert_eq!(Intensity::for_damage(3, false), Intensity::Normal);
        assert_eq!(Intensity::for_damage(10, false), Intensity::Heavy);
        assert_eq!(Intensity::for_damage(1, true), Intensity::Heavy);
    }
}
