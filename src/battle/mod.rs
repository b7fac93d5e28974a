//! Battle engine: turn order, resolution, effects, narration and the session
//! that coordinates them

pub mod config;
pub mod effects;
pub mod error;
pub mod headless;
pub mod log;
pub mod narrative;
pub mod opponent;
pub mod resolver;
pub mod runtime;
pub mod session;
pub mod turn;

pub use config::{BattleConfig, HealThreshold, PolicyTuning};
pub use effects::{
    ActionId, ActionPhase, CallbackKind, EffectCallback, EffectDraft, EffectId, EffectKey,
    EffectKind, EffectRequest, EffectScheduler, GateProgress, Intensity, PendingAction,
    RequestOutcome,
};
pub use error::BattleError;
pub use headless::HeadlessDriver;
pub use log::{BattleLog, LogEntry, LogKind, OutputFormat, OutputMode, VerbosityLevel};
pub use narrative::{
    narrate_with_timeout, CombatantBrief, EchoNarrator, NarrativeError, NarrativeKind,
    NarrativeQueue, NarrativeReply, NarrativeRequest, NarrativeRequestId, NarrativeService,
};
pub use opponent::{decide_action, OpponentPolicy, PolicyPoll, PolicyState};
pub use resolver::{
    resolve, Action, ActionKind, AttackRoll, Outcome, Participant, Resolution, ResolutionShape,
    Strike,
};
pub use runtime::{BattleCommand, BattleRuntime, RuntimeHandle};
pub use session::{
    BattlePhase, BattleSession, BattleSummary, Controller, SessionSnapshot, ShakeCue, SlotStats,
};
pub use turn::{TurnAdvance, TurnSequencer};
