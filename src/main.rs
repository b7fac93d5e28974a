//! Duel Engine - Main Binary
//!
//! Runs autonomous battles between catalog combatants, one at a time with
//! the full log or many in parallel for statistics.

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use duel_engine::{
    battle::{
        BattleConfig, BattlePhase, BattleLog, BattleRuntime, BattleSession, BattleSummary,
        EchoNarrator, HeadlessDriver, OutputFormat, VerbosityLevel,
    },
    core::Slot,
    loader::{Catalog, CombatantCatalog},
    simulate::{run_simulation_with, Matchup},
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Verbosity level for battle output (custom parser supporting both names and numbers)
#[derive(Debug, Clone, Copy)]
struct VerbosityArg(VerbosityLevel);

impl std::str::FromStr for VerbosityArg {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "silent" | "0" => Ok(VerbosityArg(VerbosityLevel::Silent)),
            "minimal" | "1" => Ok(VerbosityArg(VerbosityLevel::Minimal)),
            "normal" | "2" => Ok(VerbosityArg(VerbosityLevel::Normal)),
            "verbose" | "3" => Ok(VerbosityArg(VerbosityLevel::Verbose)),
            _ => Err(format!(
                "invalid verbosity level '{s}' (expected: silent/0, minimal/1, normal/2, verbose/3)"
            )),
        }
    }
}

impl From<VerbosityArg> for VerbosityLevel {
    fn from(arg: VerbosityArg) -> Self {
        arg.0
    }
}

#[derive(Parser)]
#[command(name = "duel")]
#[command(about = "Duel Engine - turn-based combat between catalog combatants", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Options shared by every subcommand
#[derive(Args, Debug)]
struct LineupArgs {
    /// Combatant catalog (.json); the built-in bestiary when omitted
    #[arg(long, value_name = "CATALOG")]
    catalog: Option<PathBuf>,

    /// Catalog id for the primary slot
    #[arg(long)]
    primary: String,

    /// Catalog id for the opponent slot
    #[arg(long)]
    opponent: String,

    /// Catalog id for the first support slot
    #[arg(long)]
    support1: Option<String>,

    /// Catalog id for the second support slot
    #[arg(long)]
    support2: Option<String>,

    /// Battle configuration (.json); missing fields take their defaults
    #[arg(long, value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Delay before an autonomous combatant acts, in milliseconds
    #[arg(long, value_name = "MS")]
    opponent_delay: Option<u64>,

    /// Abilities drawn per combatant at battle start
    #[arg(long, value_name = "N")]
    abilities: Option<usize>,
}

impl LineupArgs {
    fn matchup(&self) -> Matchup {
        Matchup {
            primary: self.primary.clone(),
            opponent: self.opponent.clone(),
            support1: self.support1.clone(),
            support2: self.support2.clone(),
        }
    }

    async fn load_catalog(&self) -> anyhow::Result<Catalog> {
        let catalog = match &self.catalog {
            Some(path) => Catalog::load_from_path_async(path)
                .await
                .with_context(|| format!("loading catalog {}", path.display()))?,
            None => Catalog::builtin().context("loading built-in bestiary")?,
        };
        if catalog.is_empty() {
            bail!("catalog has no combatants");
        }
        Ok(catalog)
    }

    /// Config file (if any) with command-line overrides applied
    fn load_config(&self) -> anyhow::Result<BattleConfig> {
        let mut config = match &self.config {
            Some(path) => BattleConfig::load_from_path(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => BattleConfig::default(),
        };
        if let Some(ms) = self.opponent_delay {
            config = config.with_opponent_delay(Duration::from_millis(ms));
        }
        if let Some(count) = self.abilities {
            config = config.with_abilities_per_combatant(count);
        }
        Ok(config)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run one autonomous battle and print its log
    Fight {
        #[command(flatten)]
        lineup: LineupArgs,

        /// Set random seed for deterministic battles
        #[arg(long)]
        seed: Option<u64>,

        /// Verbosity level for battle output (0=silent, 1=minimal, 2=normal, 3=verbose)
        #[arg(long, default_value = "normal", short = 'v')]
        verbosity: VerbosityArg,

        /// Print log entries as JSON lines
        #[arg(long)]
        json: bool,

        /// Play in real time on the async runtime instead of a virtual clock
        #[arg(long)]
        realtime: bool,
    },

    /// Run many battles in parallel and print statistics
    Simulate {
        #[command(flatten)]
        lineup: LineupArgs,

        /// Number of battles to run
        #[arg(long, short = 'g', default_value_t = 1000)]
        games: usize,

        /// Master seed; each battle derives its own from it
        #[arg(long, default_value_t = 42)]
        seed: u64,
    },

    /// List the ids in a catalog
    List {
        /// Combatant catalog (.json); the built-in bestiary when omitted
        #[arg(long, value_name = "CATALOG")]
        catalog: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Fight {
            lineup,
            seed,
            verbosity,
            json,
            realtime,
        } => run_fight(lineup, seed, verbosity.into(), json, realtime).await?,
        Commands::Simulate {
            lineup,
            games,
            seed,
        } => run_simulate(lineup, games, seed).await?,
        Commands::List { catalog } => {
            let catalog = match catalog {
                Some(path) => Catalog::load_from_path_async(&path).await?,
                None => Catalog::builtin()?,
            };
            for id in catalog.ids() {
                if let Some(template) = catalog.lookup(id) {
                    println!(
                        "{id:<12} {} ({} HP, AC {})",
                        template.name, template.max_hit_points, template.armor_class
                    );
                }
            }
        }
    }

    Ok(())
}

async fn run_fight(
    lineup: LineupArgs,
    seed: Option<u64>,
    verbosity: VerbosityLevel,
    json: bool,
    realtime: bool,
) -> anyhow::Result<()> {
    let catalog = lineup.load_catalog().await?;
    let config = lineup.load_config()?;
    let matchup = lineup.matchup();

    let seed = seed.unwrap_or_else(rand::random);
    if verbosity >= VerbosityLevel::Minimal && !json {
        println!("=== Duel Engine ===");
        println!("Using seed: {seed}\n");
    }

    let mut log = BattleLog::with_verbosity(verbosity);
    if json {
        log.set_output_format(OutputFormat::Json);
    }
    let session = matchup.build_session(&catalog, &config, seed)?.with_log(log);

    let summary = if realtime {
        run_realtime(session).await?
    } else {
        HeadlessDriver::new(session).run_to_completion()?
    };

    if verbosity >= VerbosityLevel::Minimal && !json {
        print_summary(&summary);
    }
    Ok(())
}

/// Drive a battle through the async runtime, acting as its renderer
async fn run_realtime(session: BattleSession) -> anyhow::Result<BattleSummary> {
    let (runtime, mut handle) = BattleRuntime::new(session, Arc::new(EchoNarrator));
    let task = tokio::spawn(runtime.run());
    handle.start().await?;

    loop {
        tokio::select! {
            Some(effect) = handle.effects.recv() => {
                tokio::time::sleep(effect.stagger).await;
                for callback in effect.into_callbacks() {
                    handle.fire_callback(callback).await?;
                }
            }
            changed = handle.snapshots.changed() => {
                changed.context("battle runtime stopped early")?;
                let snapshot = handle.snapshot();
                if snapshot.phase == BattlePhase::Concluded && !snapshot.waiting_for_narrative {
                    break;
                }
            }
        }
    }

    handle.shutdown().await?;
    let session = task.await?;
    session
        .summary()
        .context("battle ended without a victor")
}

fn print_summary(summary: &BattleSummary) {
    println!("\n=== Battle Complete ===");
    println!(
        "Winner: {} ({})",
        summary.victor_name,
        if summary.party_won() { "party" } else { "enemy" }
    );
    println!("Defeated: {}", summary.defeated_name);
    println!("Rounds: {}", summary.rounds);
    println!("Actions: {}", summary.actions);
    println!();
    println!(
        "{:<10} {:>7} {:>5} {:>6} {:>7} {:>6} {:>7}",
        "slot", "actions", "hits", "misses", "dealt", "taken", "healed"
    );
    for slot in Slot::ALL {
        if let Some(stats) = summary.stats.get(slot) {
            println!(
                "{:<10} {:>7} {:>5} {:>6} {:>7} {:>6} {:>7}",
                slot.label(),
                stats.actions,
                stats.hits,
                stats.misses,
                stats.damage_dealt,
                stats.damage_taken,
                stats.healing_done
            );
        }
    }
}

async fn run_simulate(lineup: LineupArgs, games: usize, seed: u64) -> anyhow::Result<()> {
    println!("=== Duel Engine - Simulation Mode ===\n");
    let catalog = lineup.load_catalog().await?;
    let config = lineup.load_config()?;
    let matchup = lineup.matchup();

    println!("Running {games} battles with seed {seed}\n");
    let report = tokio::task::spawn_blocking(move || {
        run_simulation_with(&catalog, &matchup, &config, games, seed).map(|r| (r, matchup))
    })
    .await??;
    let (report, matchup) = report;
    report.print(&matchup);
    Ok(())
}
