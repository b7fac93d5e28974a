//! Battle session state machine
//!
//! The session owns every piece of mutable battle state. It is synchronous
//! and never reads a clock: callers pass `now` into each operation, which
//! keeps battles reproducible and lets drivers run on a virtual clock.
//!
//! Phases: `Setup` → `Opening` (waiting on the opening narration) →
//! `Active` → `Concluded`, and back to `Setup` on reset.
//!
//! At most one action is in flight. The gate is set in [`BattleSession::submit`]
//! after every check has passed, and cleared only by the finalize step, which
//! runs once the action's gating effect callbacks have come back.

use crate::battle::config::BattleConfig;
use crate::battle::effects::{
    ActionId, CallbackKind, EffectCallback, EffectDraft, EffectKind, EffectRequest,
    EffectScheduler, GateProgress, Intensity, PendingAction,
};
use crate::battle::log::{BattleLog, LogEntry, LogKind};
use crate::battle::narrative::{
    CombatantBrief, NarrativeKind, NarrativeQueue, NarrativeReply, NarrativeRequest,
    NarrativeRequestId,
};
use crate::battle::opponent::{decide_action, OpponentPolicy, PolicyPoll, PolicyState};
use crate::battle::resolver::{
    resolve, Action, ActionKind, Outcome, Participant, Resolution, ResolutionShape,
};
use crate::battle::turn::TurnSequencer;
use crate::battle::BattleError;
use crate::core::{Combatant, ConversationId, Side, Slot, SlotMap};
use crate::dice::{DiceRoller, RngDice};
use crate::loader::catalog::select_abilities;
use rand::SeedableRng;
use rand_chacha::ChaCha12Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BattlePhase {
    Setup,
    /// Started; waiting for the opening narration before the first turn
    Opening,
    Active,
    Concluded,
}

/// Who chooses a slot's moves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Controller {
    /// Moves arrive through [`BattleSession::submit`]
    Manual,
    /// Moves are chosen by an [`OpponentPolicy`]
    Autonomous,
}

/// Screen-shake request, emitted when a hit lands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShakeCue {
    pub action: ActionId,
    pub target: Slot,
    pub intensity: Intensity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SlotStats {
    pub actions: u32,
    pub hits: u32,
    pub misses: u32,
    pub damage_dealt: u32,
    pub damage_taken: u32,
    pub healing_done: u32,
}

/// Read-only view for renderers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub phase: BattlePhase,
    pub active: Slot,
    pub round: u32,
    pub move_in_flight: bool,
    pub waiting_for_narrative: bool,
    pub combatants: SlotMap<Combatant>,
    pub defeated: Option<Slot>,
    pub victor: Option<Slot>,
    pub log: Vec<LogEntry>,
}

/// Post-battle report, available once the battle has concluded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BattleSummary {
    pub victor: Slot,
    pub victor_name: String,
    pub defeated: Slot,
    pub defeated_name: String,
    pub rounds: u32,
    pub actions: u32,
    pub stats: SlotMap<SlotStats>,
    pub log: Vec<LogEntry>,
}

impl BattleSummary {
    /// The party (primary side) won
    pub fn party_won(&self) -> bool {
        self.victor.side() == Side::Party
    }
}

pub struct BattleSession {
    config: BattleConfig,
    phase: BattlePhase,
    /// Lineup as assigned, with each combatant's full ability pool
    roster: SlotMap<Combatant>,
    /// Live combatants for the current battle
    combatants: SlotMap<Combatant>,
    controllers: SlotMap<Controller>,
    policies: SlotMap<OpponentPolicy>,
    active: Slot,
    in_flight: bool,
    pending: Option<PendingAction<Resolution>>,
    defeated: Option<Slot>,
    victor: Option<Slot>,
    log: BattleLog,
    narrative: NarrativeQueue,
    narrative_outbox: Vec<NarrativeRequest>,
    scheduler: EffectScheduler,
    sequencer: TurnSequencer,
    shakes: Vec<ShakeCue>,
    stats: SlotMap<SlotStats>,
    actions_taken: u32,
    next_action_id: u64,
    dice: Box<dyn DiceRoller + Send>,
    rng: ChaCha12Rng,
}

impl BattleSession {
    /// Create an empty session whose dice and decisions derive from `seed`
    pub fn new(config: BattleConfig, seed: u64) -> Self {
        BattleSession {
            phase: BattlePhase::Setup,
            roster: SlotMap::new(),
            combatants: SlotMap::new(),
            controllers: SlotMap::new(),
            policies: SlotMap::new(),
            active: Slot::Primary,
            in_flight: false,
            pending: None,
            defeated: None,
            victor: None,
            log: BattleLog::new(),
            narrative: NarrativeQueue::new(),
            narrative_outbox: Vec::new(),
            scheduler: EffectScheduler::new(config.dedup_window()),
            sequencer: TurnSequencer::new(config.turn_retries),
            shakes: Vec::new(),
            stats: SlotMap::new(),
            actions_taken: 0,
            next_action_id: 0,
            dice: Box::new(RngDice::seeded(seed.wrapping_add(1))),
            rng: ChaCha12Rng::seed_from_u64(seed),
            config,
        }
    }

    /// Replace the dice (scripted dice in tests and replays)
    pub fn with_dice(mut self, dice: impl DiceRoller + Send + 'static) -> Self {
        self.dice = Box::new(dice);
        self
    }

    /// Replace the battle log (e.g. one that echoes to stdout)
    pub fn with_log(mut self, log: BattleLog) -> Self {
        self.log = log;
        self
    }

    /// Put a combatant in a slot (setup only)
    ///
    /// The opponent slot defaults to autonomous control, party slots to
    /// manual control.
    pub fn assign(&mut self, slot: Slot, combatant: Combatant) -> Result<(), BattleError> {
        if self.phase != BattlePhase::Setup {
            return Err(BattleError::AlreadyStarted);
        }
        let controller = match slot.side() {
            Side::Enemy => Controller::Autonomous,
            Side::Party => Controller::Manual,
        };
        self.combatants.insert(slot, combatant.clone());
        self.roster.insert(slot, combatant);
        self.set_controller(slot, controller)
    }

    /// Empty a slot (setup only)
    pub fn unassign(&mut self, slot: Slot) -> Result<Option<Combatant>, BattleError> {
        if self.phase != BattlePhase::Setup {
            return Err(BattleError::AlreadyStarted);
        }
        self.combatants.remove(slot);
        self.controllers.remove(slot);
        self.policies.remove(slot);
        Ok(self.roster.remove(slot))
    }

    /// Choose who drives an occupied slot (setup only)
    pub fn set_controller(
        &mut self,
        slot: Slot,
        controller: Controller,
    ) -> Result<(), BattleError> {
        if self.phase != BattlePhase::Setup {
            return Err(BattleError::AlreadyStarted);
        }
        if !self.roster.contains(slot) {
            return Err(BattleError::EmptySlot(slot));
        }
        self.controllers.insert(slot, controller);
        match controller {
            Controller::Autonomous => {
                self.policies
                    .insert(slot, OpponentPolicy::new(slot, self.config.opponent_delay()));
            }
            Controller::Manual => {
                self.policies.remove(slot);
            }
        }
        Ok(())
    }

    /// Hand every occupied slot to an autonomous policy
    pub fn automate_all(&mut self) -> Result<(), BattleError> {
        let slots: Vec<Slot> = self.roster.occupied().collect();
        for slot in slots {
            self.set_controller(slot, Controller::Autonomous)?;
        }
        Ok(())
    }

    /// Begin the battle
    ///
    /// Every combatant is restored to full HP with a freshly drawn ability
    /// set, the turn goes to the primary slot, and the opening narration is
    /// requested. Turns start once that narration is completed.
    pub fn start(&mut self) -> Result<(), BattleError> {
        if self.phase != BattlePhase::Setup {
            return Err(BattleError::AlreadyStarted);
        }
        if !self.roster.contains(Slot::Primary) || !self.roster.contains(Slot::Opponent) {
            return Err(BattleError::MissingCombatant);
        }

        let limit = self.config.abilities_per_combatant;
        let rng = &mut self.rng;
        self.combatants = self.roster.map(|_, template| {
            let mut live = template.clone();
            live.reset_for_battle();
            live.abilities = select_abilities(template.abilities.clone(), limit, rng);
            live
        });

        self.log.clear();
        self.narrative.reset();
        self.narrative_outbox.clear();
        self.scheduler.clear();
        self.sequencer.reset();
        self.shakes.clear();
        self.stats = self.roster.map(|_, _| SlotStats::default());
        self.actions_taken = 0;
        self.active = Slot::Primary;
        self.defeated = None;
        self.victor = None;
        self.phase = BattlePhase::Opening;

        let text = self.opening_text();
        let request = self.narrative.opening(
            text,
            self.brief(Slot::Primary),
            self.brief(Slot::Opponent),
        );
        self.narrative_outbox.push(request);

        info!(
            combatants = self.combatants.len(),
            primary = %self.combatant_name(Slot::Primary),
            opponent = %self.combatant_name(Slot::Opponent),
            "battle started"
        );
        Ok(())
    }

    fn opening_text(&self) -> String {
        let describe = |slot: Slot| {
            self.combatants
                .get(slot)
                .map(|c| {
                    if c.class_label.is_empty() {
                        c.name.to_string()
                    } else {
                        format!("{} the {}", c.name, c.class_label)
                    }
                })
                .unwrap_or_default()
        };
        let mut text = format!(
            "{} squares off against {}.",
            describe(Slot::Primary),
            describe(Slot::Opponent)
        );
        let supports: Vec<String> = [Slot::Support1, Slot::Support2]
            .into_iter()
            .filter(|s| self.combatants.contains(*s))
            .map(describe)
            .collect();
        if !supports.is_empty() {
            text.push_str(&format!(" At their side: {}.", supports.join(" and ")));
        }
        text
    }

    /// Submit a move for `slot`
    ///
    /// Fails without touching any state if the battle is not active, another
    /// move is in flight, it is not `slot`'s turn, or the action or target
    /// is invalid. On success the in-flight gate is held until the action
    /// finalizes.
    pub fn submit(
        &mut self,
        slot: Slot,
        action: Action,
        now: Instant,
    ) -> Result<ActionId, BattleError> {
        if self.phase != BattlePhase::Active {
            return Err(BattleError::NotActive(self.phase));
        }
        if self.in_flight {
            return Err(BattleError::MoveInFlight);
        }
        if slot != self.active {
            return Err(BattleError::NotYourTurn {
                slot,
                active: self.active,
            });
        }
        let actor = self.combatants.get(slot).ok_or(BattleError::EmptySlot(slot))?;
        if actor.is_defeated() {
            return Err(BattleError::Defeated(slot));
        }
        let target = self.choose_target(slot, actor, action)?;
        let defender = self
            .combatants
            .get(target)
            .ok_or(BattleError::InvalidTarget { actor: slot, target })?;

        let resolution = resolve(
            Participant::new(slot, actor),
            Participant::new(target, defender),
            action.kind,
            &mut *self.dice,
        )?;

        let id = ActionId(self.next_action_id);
        self.next_action_id += 1;
        self.in_flight = true;
        debug!(
            action = id.0,
            actor = %slot,
            target = %resolution.target,
            ?action.kind,
            outcome = ?resolution.outcome,
            "action in flight"
        );

        let gate = self.request_effects(id, &resolution, now);
        let pending = PendingAction::new(id, resolution, gate);
        let ready = pending.is_ready();
        self.pending = Some(pending);
        if ready {
            // Every gating effect was dropped as a duplicate
            self.finalize(now);
        }
        Ok(id)
    }

    fn choose_target(
        &self,
        slot: Slot,
        actor: &Combatant,
        action: Action,
    ) -> Result<Slot, BattleError> {
        if let ActionKind::Ability(index) = action.kind {
            let ability = actor.ability(index).ok_or(BattleError::AbilityOutOfRange {
                slot,
                index,
                available: actor.abilities.len(),
            })?;
            if ability.is_healing() {
                return match action.target {
                    None => Ok(slot),
                    Some(t) if t == slot => Ok(slot),
                    Some(t) => Err(BattleError::InvalidTarget {
                        actor: slot,
                        target: t,
                    }),
                };
            }
        }

        match action.target {
            Some(target) => {
                if !slot.opposes(target) || !self.is_alive(target) {
                    return Err(BattleError::InvalidTarget {
                        actor: slot,
                        target,
                    });
                }
                Ok(target)
            }
            None => self.default_target(slot).ok_or(BattleError::InvalidTarget {
                actor: slot,
                target: Slot::Primary,
            }),
        }
    }

    /// Party slots strike the opponent; the opponent strikes the primary, or
    /// the first living support if the primary slot is empty
    pub fn default_target(&self, actor: Slot) -> Option<Slot> {
        match actor.side() {
            Side::Party => Some(Slot::Opponent).filter(|s| self.is_alive(*s)),
            Side::Enemy => [Slot::Primary, Slot::Support1, Slot::Support2]
                .into_iter()
                .find(|s| self.is_alive(*s)),
        }
    }

    fn is_alive(&self, slot: Slot) -> bool {
        self.combatants.get(slot).is_some_and(Combatant::is_alive)
    }

    fn request_effects(&mut self, id: ActionId, res: &Resolution, now: Instant) -> GateProgress {
        let stagger = self.config.strike_stagger();
        match res.outcome {
            Outcome::Heal => {
                let draft = EffectDraft {
                    kind: EffectKind::Heal,
                    source: res.actor,
                    target: res.target,
                    intensity: Intensity::Light,
                    stagger: Duration::ZERO,
                    strike: None,
                };
                let accepted = self.scheduler.request(id, draft, now).accepted().is_some();
                GateProgress::Impacts {
                    expected: accepted as u32,
                    seen: 0,
                }
            }
            Outcome::Miss => {
                let draft = EffectDraft {
                    kind: EffectKind::Miss,
                    source: res.actor,
                    target: res.target,
                    intensity: Intensity::Light,
                    stagger: Duration::ZERO,
                    strike: None,
                };
                match self.scheduler.request(id, draft, now).accepted() {
                    Some(effect) => GateProgress::Completion { effect },
                    None => GateProgress::Impacts {
                        expected: 0,
                        seen: 0,
                    },
                }
            }
            Outcome::Hit => {
                let kind = if res.shape == ResolutionShape::BasicAttack {
                    EffectKind::Attack
                } else {
                    EffectKind::Ability
                };
                let multi = res.shape == ResolutionShape::MultiStrike;
                let killing_strike = if res.defeats_target() {
                    res.strikes.iter().rposition(|s| s.hit)
                } else {
                    None
                };
                let mut expected = 0;
                for (pos, strike) in res.strikes.iter().enumerate() {
                    let draft = EffectDraft {
                        kind: if strike.hit { kind } else { EffectKind::Miss },
                        source: res.actor,
                        target: res.target,
                        intensity: if strike.hit {
                            Intensity::for_damage(strike.damage, killing_strike == Some(pos))
                        } else {
                            Intensity::Light
                        },
                        stagger: stagger * strike.index,
                        strike: multi.then_some(strike.index),
                    };
                    let accepted = self.scheduler.request(id, draft, now).accepted().is_some();
                    if strike.hit && accepted {
                        expected += 1;
                    }
                }
                GateProgress::Impacts { expected, seen: 0 }
            }
        }
    }

    /// Hand back a callback token from the renderer
    ///
    /// Returns `false` for tokens that belong to no pending action (an
    /// earlier action, or a battle since reset); those are ignored.
    pub fn fire_callback(&mut self, callback: EffectCallback, now: Instant) -> bool {
        let Some(pending) = self.pending.as_mut() else {
            debug!(
                action = callback.action().0,
                "ignoring callback with nothing in flight"
            );
            return false;
        };
        if callback.action() != pending.id {
            debug!(
                action = callback.action().0,
                pending = pending.id.0,
                "ignoring stale callback"
            );
            return false;
        }

        if callback.kind() == CallbackKind::Impact && pending.payload.outcome == Outcome::Hit {
            let res = &pending.payload;
            self.shakes.push(ShakeCue {
                action: pending.id,
                target: res.target,
                intensity: Intensity::for_damage(res.rolled, res.defeats_target()),
            });
        }

        if pending.on_callback(&callback) {
            self.finalize(now);
        }
        true
    }

    /// Apply the pending action: HP, log, then turn advance
    fn finalize(&mut self, now: Instant) {
        let Some(mut pending) = self.pending.take() else {
            return;
        };
        if !pending.finalize() {
            return;
        }
        let res = pending.payload;

        if let Some(target) = self.combatants.get_mut(res.target) {
            match res.outcome {
                Outcome::Hit => {
                    target.take_damage(res.rolled);
                }
                Outcome::Heal => {
                    target.heal(res.rolled);
                }
                Outcome::Miss => {}
            }
            debug_assert_eq!(target.hit_points(), res.hp_after);
        }

        if let Some(stats) = self.stats.get_mut(res.actor) {
            let misses = res.strikes.iter().filter(|s| !s.hit).count() as u32;
            stats.actions = stats.actions.saturating_add(1);
            stats.hits = stats.hits.saturating_add(res.hit_count() as u32);
            stats.misses = stats.misses.saturating_add(misses);
            stats.damage_dealt = stats.damage_dealt.saturating_add(res.damage_dealt());
            stats.healing_done = stats.healing_done.saturating_add(res.healing_done());
        }
        if let Some(stats) = self.stats.get_mut(res.target) {
            stats.damage_taken = stats.damage_taken.saturating_add(res.damage_dealt());
        }

        let kind = match res.outcome {
            Outcome::Hit => LogKind::Hit,
            Outcome::Miss => LogKind::Miss,
            Outcome::Heal => LogKind::Heal,
        };
        self.log.push(kind, Some(res.actor), res.event_text.clone());

        self.scheduler.clear_dedup();
        self.in_flight = false;
        self.actions_taken += 1;
        if let Some(policy) = self.policies.get_mut(res.actor) {
            policy.complete();
        }
        debug!(action = pending.id.0, hp_after = res.hp_after, "action finalized");

        if res.defeats_target() {
            self.conclude(&res);
        } else {
            self.narrative.enqueue(res.event_text.clone());
            self.advance_turn(&res, now);
        }
    }

    fn advance_turn(&mut self, res: &Resolution, now: Instant) {
        let liveness = self.combatants.map(|_, c| c.is_alive());
        match self.sequencer.advance(res.actor, &liveness) {
            Some(advance) => {
                if advance.round_complete {
                    let defender = if res.target != res.actor {
                        res.target
                    } else {
                        self.default_target(res.actor).unwrap_or(res.actor)
                    };
                    let (attacker, defender) = (self.brief(res.actor), self.brief(defender));
                    if let Some(request) = self.narrative.flush(attacker, defender) {
                        self.narrative_outbox.push(request);
                    }
                    self.log.push(
                        LogKind::System,
                        None,
                        format!("Round {} begins.", self.sequencer.round()),
                    );
                }
                self.active = advance.next;
            }
            None => {
                warn!(actor = %res.actor, "no living slot to take the turn, ending battle");
                self.phase = BattlePhase::Concluded;
                self.victor = Some(res.actor);
                self.cancel_policies();
                return;
            }
        }
        self.sync_policies(now);
    }

    fn conclude(&mut self, res: &Resolution) {
        let victor_name = self.combatant_name(res.actor);
        let defeated_name = self.combatant_name(res.target);
        self.phase = BattlePhase::Concluded;
        self.victor = Some(res.actor);
        self.defeated = Some(res.target);
        self.cancel_policies();

        self.log.push(
            LogKind::Defeat,
            Some(res.target),
            format!("{defeated_name} is defeated! {victor_name} is victorious."),
        );
        let request = self.narrative.supersede_with_victory(
            format!("{} {victor_name} has defeated {defeated_name}.", res.event_text),
            self.brief(res.actor),
            self.brief(res.target),
        );
        self.narrative_outbox.push(request);

        info!(
            victor = %victor_name,
            defeated = %defeated_name,
            rounds = self.sequencer.round(),
            actions = self.actions_taken,
            "battle concluded"
        );
    }

    /// Start delays for the slot whose turn it is, cancel the rest
    fn sync_policies(&mut self, now: Instant) {
        let running = self.phase == BattlePhase::Active && !self.in_flight;
        let active = self.active;
        let active_alive = self.is_alive(active);
        for (slot, policy) in self.policies.iter_mut() {
            if running && slot == active && active_alive {
                policy.activate(now);
            } else if matches!(policy.state(), PolicyState::DelayPending { .. }) {
                policy.cancel();
            }
        }
    }

    fn cancel_policies(&mut self) {
        for (_, policy) in self.policies.iter_mut() {
            policy.cancel();
        }
    }

    /// Fire any autonomous delay that has expired by `now`
    ///
    /// Returns the id of the action a policy committed to, if any.
    pub fn poll(&mut self, now: Instant) -> Option<ActionId> {
        if self.phase != BattlePhase::Active {
            return None;
        }
        let in_flight = self.in_flight;
        let mut committed = None;
        for (slot, policy) in self.policies.iter_mut() {
            match policy.poll(now, in_flight) {
                PolicyPoll::Commit => {
                    committed = Some(slot);
                    break;
                }
                PolicyPoll::Preempted | PolicyPoll::NotDue => {}
            }
        }

        let slot = committed?;
        let kind = {
            let actor = self.combatants.get(slot)?;
            decide_action(actor, &self.config.policy, &mut self.rng)
        };
        debug!(slot = %slot, ?kind, "policy committed");
        match self.submit(slot, Action { kind, target: None }, now) {
            Ok(id) => Some(id),
            Err(err) => {
                warn!(slot = %slot, error = %err, "policy move rejected");
                if let Some(policy) = self.policies.get_mut(slot) {
                    policy.cancel();
                }
                self.sync_policies(now);
                None
            }
        }
    }

    /// Earliest pending policy deadline
    pub fn next_deadline(&self) -> Option<Instant> {
        self.policies.iter().filter_map(|(_, p)| p.deadline()).min()
    }

    /// Deliver a narrative reply
    ///
    /// Returns `false` for stale or superseded requests. Completing the
    /// opening narration begins the first turn.
    pub fn complete_narrative(
        &mut self,
        id: NarrativeRequestId,
        reply: NarrativeReply,
        now: Instant,
    ) -> bool {
        let Some(kind) = self.narrative.complete(id, &reply) else {
            return false;
        };
        let log_kind = match kind {
            NarrativeKind::Opening => LogKind::Opening,
            NarrativeKind::Round => LogKind::Narrative,
            NarrativeKind::Victory => LogKind::Victory,
        };
        self.log.push(log_kind, None, reply.narrative);
        if kind == NarrativeKind::Opening && self.phase == BattlePhase::Opening {
            self.phase = BattlePhase::Active;
            self.sync_policies(now);
        }
        true
    }

    /// Back to setup with the same lineup
    ///
    /// Cancels pending delays and discards the log, queued narrative,
    /// undelivered effects and any in-flight action. Tokens and narrative
    /// replies issued before the reset are ignored afterwards.
    pub fn reset(&mut self) {
        self.cancel_policies();
        self.phase = BattlePhase::Setup;
        self.combatants = self.roster.clone();
        for (_, combatant) in self.combatants.iter_mut() {
            combatant.reset_for_battle();
        }
        self.active = Slot::Primary;
        self.in_flight = false;
        self.pending = None;
        self.defeated = None;
        self.victor = None;
        self.log.clear();
        self.narrative.reset();
        self.narrative_outbox.clear();
        self.scheduler.clear();
        self.sequencer.reset();
        self.shakes.clear();
        self.stats = SlotMap::new();
        self.actions_taken = 0;
        debug!("battle reset");
    }

    pub fn drain_effects(&mut self) -> Vec<EffectRequest> {
        self.scheduler.drain()
    }

    pub fn drain_narrative_requests(&mut self) -> Vec<NarrativeRequest> {
        std::mem::take(&mut self.narrative_outbox)
    }

    pub fn drain_shakes(&mut self) -> Vec<ShakeCue> {
        std::mem::take(&mut self.shakes)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            phase: self.phase,
            active: self.active,
            round: self.sequencer.round(),
            move_in_flight: self.in_flight,
            waiting_for_narrative: self.narrative.is_waiting(),
            combatants: self.combatants.clone(),
            defeated: self.defeated,
            victor: self.victor,
            log: self.log.entries().to_vec(),
        }
    }

    /// Report for a concluded battle
    pub fn summary(&self) -> Option<BattleSummary> {
        if self.phase != BattlePhase::Concluded {
            return None;
        }
        let victor = self.victor?;
        let defeated = self.defeated.or_else(|| self.default_target(victor)).unwrap_or(victor);
        Some(BattleSummary {
            victor,
            victor_name: self.combatant_name(victor),
            defeated,
            defeated_name: self.combatant_name(defeated),
            rounds: self.sequencer.round(),
            actions: self.actions_taken,
            stats: self.stats.clone(),
            log: self.log.entries().to_vec(),
        })
    }

    /// Check the state-machine invariants
    pub fn invariants_hold(&self) -> bool {
        let hp_in_bounds = self
            .combatants
            .iter()
            .all(|(_, c)| c.hit_points() <= c.max_hit_points());
        let gate_matches = self.in_flight == self.pending.is_some();
        let phase_ok = match self.phase {
            BattlePhase::Setup => !self.in_flight && self.log.is_empty(),
            BattlePhase::Opening => !self.in_flight,
            BattlePhase::Active => self.is_alive(self.active),
            BattlePhase::Concluded => !self.in_flight && self.victor.is_some(),
        };
        hp_in_bounds && gate_matches && phase_ok
    }

    fn brief(&self, slot: Slot) -> CombatantBrief {
        self.combatants
            .get(slot)
            .map(CombatantBrief::from)
            .unwrap_or_else(|| CombatantBrief {
                name: slot.label().to_string(),
                class_label: String::new(),
                hit_points: 0,
                max_hit_points: 0,
                flavor: String::new(),
            })
    }

    fn combatant_name(&self, slot: Slot) -> String {
        self.combatants
            .get(slot)
            .map(|c| c.name.to_string())
            .unwrap_or_else(|| slot.label().to_string())
    }

    pub fn phase(&self) -> BattlePhase {
        self.phase
    }

    pub fn active_slot(&self) -> Slot {
        self.active
    }

    pub fn is_move_in_flight(&self) -> bool {
        self.in_flight
    }

    /// Id of the action holding the gate
    pub fn pending_action(&self) -> Option<ActionId> {
        self.pending.as_ref().map(|p| p.id)
    }

    pub fn is_waiting_for_narrative(&self) -> bool {
        self.narrative.is_waiting()
    }

    /// Event text queued for the next round's narration
    pub fn queued_narrative(&self) -> &[String] {
        self.narrative.pending()
    }

    pub fn conversation(&self) -> Option<&ConversationId> {
        self.narrative.conversation()
    }

    pub fn combatant(&self, slot: Slot) -> Option<&Combatant> {
        self.combatants.get(slot)
    }

    pub fn combatants(&self) -> &SlotMap<Combatant> {
        &self.combatants
    }

    pub fn controller(&self, slot: Slot) -> Option<Controller> {
        self.controllers.get(slot).copied()
    }

    pub fn policy_state(&self, slot: Slot) -> Option<PolicyState> {
        self.policies.get(slot).map(OpponentPolicy::state)
    }

    pub fn defeated(&self) -> Option<Slot> {
        self.defeated
    }

    pub fn victor(&self) -> Option<Slot> {
        self.victor
    }

    pub fn log(&self) -> &BattleLog {
        &self.log
    }

    pub fn round(&self) -> u32 {
        self.sequencer.round()
    }

    pub fn actions_taken(&self) -> u32 {
        self.actions_taken
    }

    pub fn config(&self) -> &BattleConfig {
        &self.config
    }
}
