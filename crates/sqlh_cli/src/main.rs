//! CLI probe for sqlh databases.
//!
//! # Responsibility
//! - Check that a database can be opened and round-trips a transaction.
//! - Apply or revert migrations from the command line.
//! - Keep output deterministic for quick local sanity checks.

use clap::{Parser, Subcommand};
use sqlh_core::{
    current_version, default_log_level, init_logging, latest_version, Context, Helper,
    HelperOptions, LogSink,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "sqlh")]
#[command(version, about = "Inspect and migrate sqlh databases", long_about = None)]
struct Cli {
    /// Path to the database file
    #[arg(global = true, short, long, default_value = "app.db")]
    path: PathBuf,

    /// Write logs to this absolute directory
    #[arg(global = true, long)]
    log_dir: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(global = true, long)]
    log_level: Option<String>,

    /// Give up on each command after this many seconds
    #[arg(global = true, long, default_value_t = 30)]
    timeout_secs: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run `select 1` inside a transaction
    Ping,
    /// Apply or revert migrations
    Migrate {
        #[command(subcommand)]
        direction: MigrateDirection,
    },
    /// Print the applied and latest migration versions
    Version,
}

#[derive(Subcommand)]
enum MigrateDirection {
    /// Apply all pending migrations
    Up,
    /// Revert all applied migrations
    Down,
    /// Migrate to a specific version ("" for none)
    To { version: String },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("error: {message}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), String> {
    let log = match &cli.log_dir {
        Some(log_dir) => {
            let level = cli.log_level.as_deref().unwrap_or(default_log_level());
            init_logging(level, log_dir)?;
            LogSink::global()
        }
        None => LogSink::discard(),
    };

    let mut helper = Helper::new(HelperOptions::new(&cli.path).with_log(log));
    helper.connect().map_err(|err| err.to_string())?;

    let ctx = Context::background().with_timeout(Duration::from_secs(cli.timeout_secs));
    let result = match cli.command {
        Commands::Ping => helper.ping(&ctx).map(|()| println!("ping=ok")),
        Commands::Migrate { direction } => {
            let result = match direction {
                MigrateDirection::Up => helper.migrate_up(&ctx),
                MigrateDirection::Down => helper.migrate_down(&ctx),
                MigrateDirection::To { version } => helper.migrate_to(&ctx, &version),
            };
            result
                .and_then(|()| current_version(&helper, &ctx))
                .map(|version| println!("migrated version={version}"))
        }
        Commands::Version => current_version(&helper, &ctx).map(|version| {
            println!("sqlh_core version={}", sqlh_core::core_version());
            println!("schema version={version} latest={}", latest_version());
        }),
    };

    helper.close();
    result.map_err(|err| err.to_string())
}
