//! Simulation mode for running many headless battles in parallel
//!
//! Every slot is driven by the opponent policy, so a run measures how a
//! matchup plays out between the catalog entries rather than anything a
//! player does. Games are spread over the rayon thread pool; each one gets
//! its own seed derived from the master seed and its index, so a report is
//! reproducible regardless of scheduling.

use crate::{
    battle::{BattleConfig, BattleSession, BattleSummary, HeadlessDriver},
    core::Slot,
    loader::CombatantCatalog,
    Result,
};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Catalog ids for each slot of a simulated battle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Matchup {
    pub primary: String,
    pub opponent: String,
    #[serde(default)]
    pub support1: Option<String>,
    #[serde(default)]
    pub support2: Option<String>,
}

impl Matchup {
    pub fn new(primary: impl Into<String>, opponent: impl Into<String>) -> Self {
        Matchup {
            primary: primary.into(),
            opponent: opponent.into(),
            support1: None,
            support2: None,
        }
    }

    pub fn with_support1(mut self, id: impl Into<String>) -> Self {
        self.support1 = Some(id.into());
        self
    }

    pub fn with_support2(mut self, id: impl Into<String>) -> Self {
        self.support2 = Some(id.into());
        self
    }

    /// Occupied slots and their catalog ids, in turn order
    pub fn slots(&self) -> Vec<(Slot, &str)> {
        let mut slots = vec![(Slot::Primary, self.primary.as_str())];
        if let Some(id) = &self.support1 {
            slots.push((Slot::Support1, id.as_str()));
        }
        if let Some(id) = &self.support2 {
            slots.push((Slot::Support2, id.as_str()));
        }
        slots.push((Slot::Opponent, self.opponent.as_str()));
        slots
    }

    /// Build a session with every slot assigned and automated
    pub fn build_session<C>(
        &self,
        catalog: &C,
        config: &BattleConfig,
        seed: u64,
    ) -> Result<BattleSession>
    where
        C: CombatantCatalog + ?Sized,
    {
        let mut session = BattleSession::new(config.clone(), seed);
        for (slot, id) in self.slots() {
            let template = catalog.require(id)?;
            session.assign(slot, template.to_combatant())?;
        }
        session.automate_all()?;
        Ok(session)
    }
}

/// Aggregate results of a simulation run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimulationReport {
    pub games: usize,
    pub party_wins: usize,
    pub enemy_wins: usize,
    /// Games that errored or hit the action limit
    pub failed: usize,
    pub total_rounds: u64,
    pub total_actions: u64,
    pub elapsed: Duration,
}

impl SimulationReport {
    fn completed(&self) -> usize {
        self.party_wins + self.enemy_wins
    }

    pub fn average_rounds(&self) -> f64 {
        match self.completed() {
            0 => 0.0,
            n => self.total_rounds as f64 / n as f64,
        }
    }

    pub fn average_actions(&self) -> f64 {
        match self.completed() {
            0 => 0.0,
            n => self.total_actions as f64 / n as f64,
        }
    }

    pub fn party_win_rate(&self) -> f64 {
        match self.completed() {
            0 => 0.0,
            n => self.party_wins as f64 / n as f64,
        }
    }

    fn record(&mut self, summary: &BattleSummary) {
        if summary.party_won() {
            self.party_wins += 1;
        } else {
            self.enemy_wins += 1;
        }
        self.total_rounds += u64::from(summary.rounds);
        self.total_actions += u64::from(summary.actions);
    }

    fn merge(mut self, other: SimulationReport) -> SimulationReport {
        self.games += other.games;
        self.party_wins += other.party_wins;
        self.enemy_wins += other.enemy_wins;
        self.failed += other.failed;
        self.total_rounds += other.total_rounds;
        self.total_actions += other.total_actions;
        self
    }

    /// Print the report in the same shape as the CLI's other summaries
    pub fn print(&self, matchup: &Matchup) {
        println!("=== Simulation Complete ===");
        println!("Matchup: {}", describe(matchup));
        println!("Games played: {}", self.games);
        println!("Elapsed time: {:.2}s", self.elapsed.as_secs_f64());
        if self.elapsed.as_secs_f64() > 0.0 {
            println!(
                "Games per second: {:.2}",
                self.games as f64 / self.elapsed.as_secs_f64()
            );
        }
        println!();
        println!(
            "Party wins: {} ({:.1}%)",
            self.party_wins,
            self.party_win_rate() * 100.0
        );
        println!("Enemy wins: {}", self.enemy_wins);
        if self.failed > 0 {
            println!("Failed games: {}", self.failed);
        }
        println!("Average rounds: {:.2}", self.average_rounds());
        println!("Average actions: {:.2}", self.average_actions());
    }
}

fn describe(matchup: &Matchup) -> String {
    let party: Vec<&str> = matchup
        .slots()
        .into_iter()
        .filter(|(slot, _)| *slot != Slot::Opponent)
        .map(|(_, id)| id)
        .collect();
    format!("{} vs {}", party.join(" + "), matchup.opponent)
}

/// Seed for game `index` of a run seeded with `seed`
pub fn game_seed(seed: u64, index: usize) -> u64 {
    seed.wrapping_add((index as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15))
}

/// Play one all-autonomous battle to completion
pub fn run_game<C>(
    catalog: &C,
    matchup: &Matchup,
    config: &BattleConfig,
    seed: u64,
    max_actions: u32,
) -> Result<BattleSummary>
where
    C: CombatantCatalog + ?Sized,
{
    let session = matchup.build_session(catalog, config, seed)?;
    HeadlessDriver::new(session)
        .with_max_actions(max_actions)
        .run_to_completion()
}

/// Run `games` battles of `matchup` in parallel and collect statistics
pub fn run_simulation<C>(
    catalog: &C,
    matchup: &Matchup,
    games: usize,
    seed: u64,
) -> Result<SimulationReport>
where
    C: CombatantCatalog + Sync + ?Sized,
{
    run_simulation_with(catalog, matchup, &BattleConfig::default(), games, seed)
}

/// [`run_simulation`] with an explicit battle configuration
pub fn run_simulation_with<C>(
    catalog: &C,
    matchup: &Matchup,
    config: &BattleConfig,
    games: usize,
    seed: u64,
) -> Result<SimulationReport>
where
    C: CombatantCatalog + Sync + ?Sized,
{
    // Unknown ids fail the whole run up front
    for (_, id) in matchup.slots() {
        catalog.require(id)?;
    }

    info!(games, seed, matchup = %describe(matchup), "starting simulation");
    let start = Instant::now();

    let mut report = (0..games)
        .into_par_iter()
        .map(|index| {
            let mut report = SimulationReport {
                games: 1,
                ..SimulationReport::default()
            };
            match run_game(catalog, matchup, config, game_seed(seed, index), 1000) {
                Ok(summary) => {
                    debug!(
                        game = index,
                        rounds = summary.rounds,
                        victor = %summary.victor,
                        "game finished"
                    );
                    report.record(&summary);
                }
                Err(e) => {
                    warn!(game = index, error = %e, "game failed");
                    report.failed += 1;
                }
            }
            report
        })
        .reduce(SimulationReport::default, SimulationReport::merge);

    report.elapsed = start.elapsed();
    info!(
        party_wins = report.party_wins,
        enemy_wins = report.enemy_wins,
        failed = report.failed,
        "simulation finished"
    );
    Ok(report)
}
