//! Fairplay casino CLI
//!
//! Operator and player commands over the casino core. Every command prints
//! JSON on stdout; logs go to stderr.

use clap::{Parser, Subcommand};
use fairplay::{
    config::{CasinoConfig, ConfigLoader},
    errors::CasinoResult,
    games::{ProvablyFairVerifier, RouletteBet},
    Casino,
};
use serde::Serialize;
use serde_json::json;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// Fairplay casino CLI
#[derive(Parser)]
#[command(name = "fairplay")]
#[command(about = "Blackjack and roulette core with an atomic wallet ledger")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Data directory for the ledger database
    #[arg(short, long)]
    data_dir: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a sample configuration file
    InitConfig {
        /// Output path
        #[arg(short, long, default_value = "fairplay.toml")]
        output: PathBuf,

        /// Use production presets
        #[arg(long)]
        production: bool,
    },

    /// Create a zero-balance account
    OpenAccount {
        #[arg(short, long)]
        user: u64,
    },

    /// Credit funds to an account
    Deposit {
        #[arg(short, long)]
        user: u64,

        #[arg(short, long)]
        amount: u64,
    },

    /// Debit funds from an account
    Withdraw {
        #[arg(short, long)]
        user: u64,

        #[arg(short, long)]
        amount: u64,
    },

    /// Show an account
    Balance {
        #[arg(short, long)]
        user: u64,
    },

    /// Transaction history, newest first
    History {
        #[arg(short, long)]
        user: u64,

        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Play blackjack
    Blackjack {
        #[command(subcommand)]
        action: BlackjackCommand,
    },

    /// Play roulette
    Roulette {
        #[command(subcommand)]
        action: RouletteCommand,
    },

    /// Manage provably-fair seeds
    Seed {
        #[command(subcommand)]
        action: SeedCommand,
    },

    /// Check a result hash against a revealed server seed
    Verify {
        #[arg(long)]
        server_seed: String,

        #[arg(long)]
        client_seed: String,

        #[arg(long)]
        nonce: u64,

        /// Result hash recorded with the round
        #[arg(long)]
        hash: String,

        /// Hash published before play
        #[arg(long)]
        commitment: Option<String>,

        /// Range for the derived number (37 for roulette)
        #[arg(long, default_value = "37")]
        max: u32,
    },

    /// Run one reconciliation pass
    Reconcile,

    /// Run the reconciliation worker until Ctrl-C
    Watch,
}

#[derive(Subcommand)]
enum BlackjackCommand {
    /// Place a bet and deal
    Deal {
        #[arg(short, long)]
        user: u64,

        #[arg(short, long)]
        bet: u64,
    },

    /// Take one card
    Hit {
        #[arg(short, long)]
        user: u64,

        #[arg(short, long)]
        round: Uuid,
    },

    /// Stand and let the dealer play
    Stand {
        #[arg(short, long)]
        user: u64,

        #[arg(short, long)]
        round: Uuid,
    },

    /// Double the stake, take one card and stand
    Double {
        #[arg(short, long)]
        user: u64,

        #[arg(short, long)]
        round: Uuid,
    },
}

#[derive(Subcommand)]
enum RouletteCommand {
    /// Spin once with one or more bets, e.g. --bet red:100 --bet straight:17:10
    Spin {
        #[arg(short, long)]
        user: u64,

        #[arg(short, long = "bet", required = true)]
        bets: Vec<RouletteBet>,
    },
}

#[derive(Subcommand)]
enum SeedCommand {
    /// Current commitment (hash, client seed, nonce)
    Show {
        #[arg(short, long)]
        user: u64,
    },

    /// Reveal the current server seed and commit a new one
    Rotate {
        #[arg(short, long)]
        user: u64,
    },

    /// Set the client seed (rotates the server seed)
    Client {
        #[arg(short, long)]
        user: u64,

        #[arg(short, long)]
        seed: String,
    },

    /// Previously revealed seeds, newest first
    Revealed {
        #[arg(short, long)]
        user: u64,

        #[arg(short, long, default_value = "10")]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> CasinoResult<()> {
    let cli = Cli::parse();

    if let Commands::InitConfig { output, production } = &cli.command {
        let config = if *production {
            CasinoConfig::production()
        } else {
            CasinoConfig::default()
        };
        ConfigLoader::new().save(&config, &output.to_string_lossy())?;
        return print_json(&json!({ "written": output }));
    }

    // Load configuration
    let mut loader = ConfigLoader::new();
    if let Some(path) = &cli.config {
        loader = loader.with_path(path);
    }
    let mut config = loader.load()?;
    if let Some(data_dir) = cli.data_dir {
        config.storage.data_directory = data_dir;
    }

    // Initialize logging
    let default_level = if cli.verbose {
        "debug"
    } else {
        config.monitoring.log_level.as_filter()
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with_writer(std::io::stderr)
        .init();

    // Verification needs no state
    if let Commands::Verify {
        server_seed,
        client_seed,
        nonce,
        hash,
        commitment,
        max,
    } = &cli.command
    {
        return verify(server_seed, client_seed, *nonce, hash, commitment.as_deref(), *max);
    }

    let casino = Casino::from_config(config)?;

    // Execute command
    match cli.command {
        Commands::InitConfig { .. } | Commands::Verify { .. } => Ok(()),
        Commands::OpenAccount { user } => print_json(&casino.ledger().open_account(user)?),
        Commands::Deposit { user, amount } => {
            let balance = casino.ledger().add_funds(user, amount)?;
            print_json(&json!({ "user_id": user, "balance": balance }))
        }
        Commands::Withdraw { user, amount } => {
            let balance = casino.ledger().withdraw(user, amount)?;
            print_json(&json!({ "user_id": user, "balance": balance }))
        }
        Commands::Balance { user } => print_json(&casino.ledger().account(user)?),
        Commands::History { user, limit } => print_json(&casino.ledger().transactions(user, limit)?),
        Commands::Blackjack { action } => run_blackjack(&casino, action),
        Commands::Roulette {
            action: RouletteCommand::Spin { user, bets },
        } => print_json(&casino.spin(user, &bets)?),
        Commands::Seed { action } => run_seed(&casino, action),
        Commands::Reconcile => print_json(&casino.reconcile()?),
        Commands::Watch => run_watch(&casino).await,
    }
}

fn run_blackjack(casino: &Casino, action: BlackjackCommand) -> CasinoResult<()> {
    let state = match action {
        BlackjackCommand::Deal { user, bet } => casino.deal(user, bet)?,
        BlackjackCommand::Hit { user, round } => casino.hit(round, user)?,
        BlackjackCommand::Stand { user, round } => casino.stand(round, user)?,
        BlackjackCommand::Double { user, round } => casino.double_down(round, user)?,
    };
    print_json(&state)
}

fn run_seed(casino: &Casino, action: SeedCommand) -> CasinoResult<()> {
    let fairness = casino.fairness();
    match action {
        SeedCommand::Show { user } => print_json(&fairness.commitment(user)?),
        SeedCommand::Rotate { user } => print_json(&fairness.rotate(user)?),
        SeedCommand::Client { user, seed } => print_json(&fairness.set_client_seed(user, &seed)?),
        SeedCommand::Revealed { user, limit } => print_json(&fairness.revealed(user, limit)?),
    }
}

fn verify(
    server_seed: &str,
    client_seed: &str,
    nonce: u64,
    hash: &str,
    commitment: Option<&str>,
    max: u32,
) -> CasinoResult<()> {
    let recomputed = ProvablyFairVerifier::generate_result(server_seed, client_seed, nonce);
    let commitment_ok = commitment.map(|c| ProvablyFairVerifier::commitment_matches(server_seed, c));

    print_json(&json!({
        "valid": ProvablyFairVerifier::verify(server_seed, client_seed, nonce, hash),
        "commitment_matches": commitment_ok,
        "result_hash": recomputed,
        "number": ProvablyFairVerifier::hash_to_number(&recomputed, max),
    }))
}

async fn run_watch(casino: &Casino) -> CasinoResult<()> {
    let worker = casino.spawn_reconciliation_worker();
    tracing::info!(
        interval_secs = casino.config().reconciliation.scan_interval_secs,
        "Reconciliation worker running, Ctrl-C to stop"
    );

    tokio::signal::ctrl_c().await?;
    worker.stop();
    tracing::info!("Shutting down");
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> CasinoResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
