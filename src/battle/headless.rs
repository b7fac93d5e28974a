//! Synchronous driver on a virtual clock
//!
//! Plays the renderer's part by returning every effect callback as soon as
//! the effect is issued, answers narrative requests in-line, and jumps the
//! clock straight to the next policy deadline. Used by the CLI, parallel
//! simulation, benchmarks and tests.

use crate::battle::narrative::{EchoNarrator, NarrativeReply, NarrativeRequest};
use crate::battle::resolver::Action;
use crate::battle::session::{BattlePhase, BattleSession, BattleSummary};
use crate::battle::{ActionId, BattleError};
use crate::core::Slot;
use crate::Result;
use tokio::time::Instant;
use tracing::debug;

type Narrator = Box<dyn FnMut(&NarrativeRequest) -> NarrativeReply + Send>;

pub struct HeadlessDriver {
    session: BattleSession,
    narrator: Narrator,
    now: Instant,
    max_actions: u32,
    callbacks_fired: u64,
}

impl HeadlessDriver {
    pub fn new(session: BattleSession) -> Self {
        HeadlessDriver {
            session,
            narrator: Box::new(|request| EchoNarrator.reply_to(request)),
            now: Instant::now(),
            max_actions: 1000,
            callbacks_fired: 0,
        }
    }

    /// Set maximum actions before giving up on a battle
    pub fn with_max_actions(mut self, max_actions: u32) -> Self {
        self.max_actions = max_actions;
        self
    }

    /// Answer narrative requests with `narrator` instead of the raw text
    pub fn with_narrator(
        mut self,
        narrator: impl FnMut(&NarrativeRequest) -> NarrativeReply + Send + 'static,
    ) -> Self {
        self.narrator = Box::new(narrator);
        self
    }

    pub fn session(&self) -> &BattleSession {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut BattleSession {
        &mut self.session
    }

    pub fn into_session(self) -> BattleSession {
        self.session
    }

    /// Current virtual time
    pub fn now(&self) -> Instant {
        self.now
    }

    pub fn callbacks_fired(&self) -> u64 {
        self.callbacks_fired
    }

    /// Start the battle and deliver the opening narration
    pub fn start(&mut self) -> Result<()> {
        self.session.start()?;
        self.settle();
        Ok(())
    }

    /// Submit a move and play it out
    pub fn submit(&mut self, slot: Slot, action: Action) -> Result<ActionId> {
        let id = self.session.submit(slot, action, self.now)?;
        self.settle();
        Ok(id)
    }

    /// Deliver every outstanding effect callback and narrative reply,
    /// repeating until the session produces nothing new
    pub fn settle(&mut self) {
        loop {
            let narratives = self.session.drain_narrative_requests();
            let effects = self.session.drain_effects();
            if narratives.is_empty() && effects.is_empty() {
                break;
            }
            for request in narratives {
                let reply = (self.narrator)(&request);
                self.session.complete_narrative(request.id, reply, self.now);
            }
            for effect in effects {
                for callback in effect.into_callbacks() {
                    self.callbacks_fired += 1;
                    self.session.fire_callback(callback, self.now);
                }
            }
        }
        self.session.drain_shakes();
    }

    /// Advance the clock to the next policy deadline and let it fire
    ///
    /// Returns `Ok(false)` once the battle has concluded.
    pub fn step(&mut self) -> Result<bool> {
        match self.session.phase() {
            BattlePhase::Concluded => return Ok(false),
            BattlePhase::Setup => return Err(BattleError::NotActive(BattlePhase::Setup).into()),
            BattlePhase::Opening | BattlePhase::Active => {}
        }
        self.settle();
        if self.session.phase() == BattlePhase::Concluded {
            return Ok(false);
        }

        let deadline = self
            .session
            .next_deadline()
            .ok_or(BattleError::AwaitingManualMove(self.session.active_slot()))?;
        if deadline > self.now {
            self.now = deadline;
        }
        if let Some(id) = self.session.poll(self.now) {
            debug!(action = id.0, "policy action resolved");
        }
        self.settle();
        Ok(self.session.phase() != BattlePhase::Concluded)
    }

    /// Play the battle out, starting it if needed
    pub fn run_to_completion(&mut self) -> Result<BattleSummary> {
        if self.session.phase() == BattlePhase::Setup {
            self.start()?;
        }
        while self.step()? {
            if self.session.actions_taken() >= self.max_actions {
                return Err(BattleError::ActionLimit(self.max_actions).into());
            }
        }
        self.session
            .summary()
            .ok_or_else(|| BattleError::NotActive(self.session.phase()).into())
    }
}
