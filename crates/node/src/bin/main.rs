//! Lottery coordinator node.
//!
//! Runs the coordinator against an in-process signing oracle and treasury,
//! filling and settling a number of rounds with simulated players.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use lottery_core::{LotteryError, Notification};
use lottery_node::{FileStore, LotteryHandle, MemoryStore, NodeBuilder, RoundStore, ServiceConfig};
use lottery_payout::{GuardedPayout, InMemoryTreasury};
use lottery_randomness::{LocalOracle, RandomnessClient};
use lottery_types::{Amount, KeyPair, ParticipantId, RoundId, RoundPhase};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "lottery-node")]
#[command(about = "Lottery coordinator node")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    InitConfig {
        /// Where to write the file
        #[arg(short, long, default_value = "lottery.toml")]
        output: PathBuf,

        /// Lottery owner
        #[arg(long, default_value = "operator")]
        owner: String,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Run the coordinator with a local oracle and treasury
    Run {
        /// Configuration file
        #[arg(short, long, default_value = "lottery.toml")]
        config: PathBuf,

        /// Rounds to settle before exiting
        #[arg(long, default_value = "3")]
        rounds: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::InitConfig {
            output,
            owner,
            force,
        } => {
            if output.exists() && !force {
                bail!("{} already exists (use --force to overwrite)", output.display());
            }
            let config = ServiceConfig::new(ParticipantId::new(owner));
            std::fs::write(&output, config.to_toml()?)
                .with_context(|| format!("writing {}", output.display()))?;
            println!("Wrote {}", output.display());
        }

        Commands::Run { config, rounds } => {
            tracing_subscriber::fmt()
                .with_env_filter(
                    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
                )
                .init();

            let config = ServiceConfig::from_file(&config)?;
            tokio::select! {
                result = run(config, rounds) => result?,
                _ = tokio::signal::ctrl_c() => info!("Interrupted, shutting down"),
            }
        }
    }

    Ok(())
}

async fn run(config: ServiceConfig, rounds: u64) -> anyhow::Result<()> {
    let simulation = &config.simulation;
    if simulation.players.is_empty() {
        bail!("simulation.players must not be empty");
    }

    let mut seed = [0u8; 32];
    seed[..8].copy_from_slice(&simulation.seed.to_le_bytes());
    let (oracle, fulfillments) = LocalOracle::new(KeyPair::from_seed(&seed), simulation.seed);
    let oracle = oracle.with_delay(Duration::from_millis(simulation.oracle_delay_ms));

    let oracle_key = match config.oracle_key()? {
        Some(key) if key != oracle.public_key() => {
            warn!("Configured oracle key does not match the local oracle, fulfillments will be rejected");
            key
        }
        Some(key) => key,
        None => oracle.public_key(),
    };
    let randomness = RandomnessClient::new(Arc::new(oracle), oracle_key);

    let treasury = Arc::new(InMemoryTreasury::new(Amount(simulation.treasury_balance)));
    let payout = GuardedPayout::new(Arc::clone(&treasury), config.payout_config());

    let store: Arc<dyn RoundStore> = match &config.storage.path {
        Some(path) => Arc::new(FileStore::new(path)),
        None => Arc::new(MemoryStore::new()),
    };

    let (lottery, runner) = NodeBuilder::new(config.owner.clone(), config.lottery_config()?)
        .with_store(store)
        .spawn(randomness, Arc::new(payout))?;
    let forwarder = lottery.forward_fulfillments(fulfillments);

    let players: Vec<ParticipantId> = simulation
        .players
        .iter()
        .map(|name| ParticipantId::new(name.as_str()))
        .collect();

    for _ in 0..rounds {
        let outcome = drive_round(&lottery, &config.owner, &players).await?;
        info!(
            round = outcome.0,
            treasury = %treasury.balance(),
            "Simulated round complete"
        );
    }

    for outcome in lottery.history().await? {
        println!(
            "{}: winner {} prize {} (slot {})",
            outcome.round, outcome.winner, outcome.prize, outcome.winner_index
        );
    }
    println!("Treasury balance: {}", treasury.balance());

    forwarder.abort();
    drop(lottery);
    runner.await.context("runner task panicked")?;
    Ok(())
}

/// Fill, close and settle the live round. Returns the settled round.
async fn drive_round(
    lottery: &LotteryHandle,
    owner: &ParticipantId,
    players: &[ParticipantId],
) -> anyhow::Result<RoundId> {
    let mut notifications = lottery.subscribe();
    let state = lottery.state().await?;
    let round = state.round;

    if state.phase == RoundPhase::Open {
        for player in players.iter().cycle() {
            match lottery.enter(player.clone(), state.ticket_price).await {
                Ok(receipt) if receipt.closed => break,
                Ok(_) => {}
                Err(LotteryError::WrongPhase { .. }) => break,
                Err(e) => return Err(e.into()),
            }
        }
    }

    if lottery.state().await?.phase == RoundPhase::Closed {
        lottery.request_winner(owner.clone()).await?;
    }

    loop {
        match notifications.recv().await {
            Some(Notification::WinnerSettled { outcome }) if outcome.round == round => {
                return Ok(round);
            }
            Some(Notification::RandomnessExpired { round: expired, .. }) if expired == round => {
                warn!(round = round.0, "Randomness expired, requesting again");
                lottery.request_winner(owner.clone()).await?;
            }
            Some(Notification::PayoutFailed { error, .. }) => {
                bail!("payout for {round} failed: {error}");
            }
            Some(_) => {}
            None => bail!("lottery stopped"),
        }
    }
}
