//! Real-time driver on tokio
//!
//! [`BattleRuntime`] owns a [`BattleSession`] and runs a single event loop
//! over three sources: commands from the front end, the next policy
//! deadline, and finished narrative requests. The session is only ever
//! touched from that loop, so timers racing each other cannot interleave
//! inside an action.
//!
//! Effects go out on an unbounded channel. If nobody is listening, the
//! runtime returns the callbacks itself so the in-flight gate cannot stick.

use crate::battle::effects::{EffectCallback, EffectRequest};
use crate::battle::narrative::{
    narrate_with_timeout, NarrativeReply, NarrativeRequestId, NarrativeService,
};
use crate::battle::resolver::Action;
use crate::battle::session::{BattleSession, SessionSnapshot, ShakeCue};
use crate::battle::{ActionId, BattleError};
use crate::core::Slot;
use crate::Result;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

/// Requests from the front end
#[derive(Debug)]
pub enum BattleCommand {
    Start {
        reply: oneshot::Sender<std::result::Result<(), BattleError>>,
    },
    Submit {
        slot: Slot,
        action: Action,
        reply: oneshot::Sender<std::result::Result<ActionId, BattleError>>,
    },
    /// A renderer handing back an effect token
    Callback(EffectCallback),
    Reset,
    Shutdown,
}

/// Front-end side of a running battle
pub struct RuntimeHandle {
    commands: mpsc::Sender<BattleCommand>,
    pub snapshots: watch::Receiver<SessionSnapshot>,
    pub effects: mpsc::UnboundedReceiver<EffectRequest>,
    pub shakes: mpsc::UnboundedReceiver<ShakeCue>,
}

impl RuntimeHandle {
    async fn send(&self, command: BattleCommand) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| runtime_gone("battle runtime stopped"))?;
        Ok(())
    }

    pub async fn start(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(BattleCommand::Start { reply }).await?;
        Ok(Self::await_reply(rx).await??)
    }

    pub async fn submit(&self, slot: Slot, action: Action) -> Result<ActionId> {
        let (reply, rx) = oneshot::channel();
        self.send(BattleCommand::Submit {
            slot,
            action,
            reply,
        })
        .await?;
        Ok(Self::await_reply(rx).await??)
    }

    pub async fn fire_callback(&self, callback: EffectCallback) -> Result<()> {
        self.send(BattleCommand::Callback(callback)).await
    }

    pub async fn reset(&self) -> Result<()> {
        self.send(BattleCommand::Reset).await
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.send(BattleCommand::Shutdown).await
    }

    /// Latest published state
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshots.borrow().clone()
    }

    async fn await_reply<T>(rx: oneshot::Receiver<T>) -> Result<T> {
        rx.await
            .map_err(|_| runtime_gone("battle runtime dropped reply").into())
    }
}

fn runtime_gone(message: &str) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::BrokenPipe, message.to_string())
}

pub struct BattleRuntime {
    session: BattleSession,
    narrator: Arc<dyn NarrativeService>,
    commands: mpsc::Receiver<BattleCommand>,
    snapshots: watch::Sender<SessionSnapshot>,
    effects: mpsc::UnboundedSender<EffectRequest>,
    shakes: mpsc::UnboundedSender<ShakeCue>,
    narrative_tx: mpsc::UnboundedSender<(NarrativeRequestId, NarrativeReply)>,
    narrative_rx: mpsc::UnboundedReceiver<(NarrativeRequestId, NarrativeReply)>,
}

impl BattleRuntime {
    /// Wrap a session; the handle is how the front end talks to it
    pub fn new(
        session: BattleSession,
        narrator: Arc<dyn NarrativeService>,
    ) -> (Self, RuntimeHandle) {
        let (command_tx, command_rx) = mpsc::channel(64);
        let (snapshot_tx, snapshot_rx) = watch::channel(session.snapshot());
        let (effect_tx, effect_rx) = mpsc::unbounded_channel();
        let (shake_tx, shake_rx) = mpsc::unbounded_channel();
        let (narrative_tx, narrative_rx) = mpsc::unbounded_channel();
        let runtime = BattleRuntime {
            session,
            narrator,
            commands: command_rx,
            snapshots: snapshot_tx,
            effects: effect_tx,
            shakes: shake_tx,
            narrative_tx,
            narrative_rx,
        };
        let handle = RuntimeHandle {
            commands: command_tx,
            snapshots: snapshot_rx,
            effects: effect_rx,
            shakes: shake_rx,
        };
        (runtime, handle)
    }

    /// Run until shutdown (or every handle is dropped), returning the session
    pub async fn run(mut self) -> BattleSession {
        info!("battle runtime started");
        loop {
            self.publish();
            let deadline = self.session.next_deadline();
            let timer = async move {
                match deadline {
                    Some(deadline) => sleep_until(deadline).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(BattleCommand::Shutdown) | None => break,
                    Some(command) => self.handle(command),
                },
                Some((id, reply)) = self.narrative_rx.recv() => {
                    self.session.complete_narrative(id, reply, Instant::now());
                }
                _ = timer => {
                    if let Some(id) = self.session.poll(Instant::now()) {
                        debug!(action = id.0, "policy action submitted");
                    }
                }
            }
        }
        self.publish();
        info!("battle runtime stopped");
        self.session
    }

    fn handle(&mut self, command: BattleCommand) {
        let now = Instant::now();
        match command {
            BattleCommand::Start { reply } => {
                let _ = reply.send(self.session.start());
            }
            BattleCommand::Submit {
                slot,
                action,
                reply,
            } => {
                let _ = reply.send(self.session.submit(slot, action, now));
            }
            BattleCommand::Callback(callback) => {
                self.session.fire_callback(callback, now);
            }
            BattleCommand::Reset => self.session.reset(),
            BattleCommand::Shutdown => {}
        }
    }

    /// Push effects and narrative requests out, then publish a snapshot
    fn publish(&mut self) {
        loop {
            let effects = self.session.drain_effects();
            if effects.is_empty() {
                break;
            }
            for effect in effects {
                if let Err(mpsc::error::SendError(effect)) = self.effects.send(effect) {
                    warn!(effect = effect.id.0, "no renderer attached, completing effect");
                    let now = Instant::now();
                    for callback in effect.into_callbacks() {
                        self.session.fire_callback(callback, now);
                    }
                }
            }
        }

        let timeout = self.session.config().narrative_timeout();
        for request in self.session.drain_narrative_requests() {
            let narrator = Arc::clone(&self.narrator);
            let tx = self.narrative_tx.clone();
            tokio::spawn(async move {
                let reply = narrate_with_timeout(narrator.as_ref(), &request, timeout).await;
                let _ = tx.send((request.id, reply));
            });
        }

        for shake in self.session.drain_shakes() {
            // Shakes are cosmetic; nobody listening is fine
            let _ = self.shakes.send(shake);
        }
        self.snapshots.send_replace(self.session.snapshot());
    }
}
