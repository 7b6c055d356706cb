//! oxide-delta CLI
//!
//! Command-line tool for compiling and applying schema deltas.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use sqlx::sqlite::SqlitePoolOptions;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use oxide_delta::prelude::*;

/// Compile and apply structured schema deltas.
#[derive(Parser)]
#[command(name = "oxide-delta")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// JSON configuration file.
    #[arg(short, long, env = "OXIDE_DELTA_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long)]
    verbose: bool,

    #[command(flatten)]
    overrides: Overrides,

    #[command(subcommand)]
    command: Commands,
}

/// Flags overriding the configuration file.
#[derive(Args)]
struct Overrides {
    /// Group a table's changes into one `change_table` block.
    #[arg(long)]
    bulk_change: bool,

    /// Emit foreign key statements.
    #[arg(long)]
    enable_foreigner: bool,

    /// Limit for integer columns that declare none.
    #[arg(long)]
    default_int_limit: Option<u32>,

    /// Options appended to every CREATE TABLE.
    #[arg(long)]
    table_options: Option<String>,

    /// Statement run before the script.
    #[arg(long)]
    pre_query: Option<String>,

    /// Statement run after the script.
    #[arg(long)]
    post_query: Option<String>,

    /// Include cause chains when a directive is skipped.
    #[arg(long)]
    debug: bool,

    /// Write a JSON report of the run to this file.
    #[arg(long)]
    log_file: Option<PathBuf>,
}

impl Overrides {
    fn apply(self, mut config: Config) -> Config {
        config.bulk_change |= self.bulk_change;
        config.enable_foreigner |= self.enable_foreigner;
        config.debug |= self.debug;
        if let Some(limit) = self.default_int_limit {
            config.default_int_limit = Some(limit);
        }
        if let Some(options) = self.table_options {
            config.table_options = Some(options);
        }
        if let Some(sql) = self.pre_query {
            config.pre_query = Some(sql);
        }
        if let Some(sql) = self.post_query {
            config.post_query = Some(sql);
        }
        if let Some(path) = self.log_file {
            config.log_file = Some(path);
        }
        config
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Print the compiled script.
    Script {
        /// Delta JSON file.
        delta: PathBuf,
    },

    /// Report whether the delta would change anything.
    Differ {
        /// Delta JSON file.
        delta: PathBuf,
    },

    /// Apply the delta to a database.
    Apply {
        /// Delta JSON file.
        delta: PathBuf,

        /// Database URL (SQLite path or connection string).
        #[arg(short, long, env = "DATABASE_URL", default_value = "sqlite:db.sqlite3")]
        database: String,

        /// Show SQL without executing (dry run).
        #[arg(long)]
        dry_run: bool,
    },
}

fn load_delta(path: &Path) -> anyhow::Result<Delta> {
    Delta::from_file(path).with_context(|| format!("failed to read delta {}", path.display()))
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    // Setup logging
    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = match cli.config {
        Some(ref path) => Config::from_file(path)?,
        None => Config::new(),
    };
    let config = cli.overrides.apply(config);

    match cli.command {
        Commands::Script { delta } => {
            let delta = load_delta(&delta)?;
            let script = compile(&delta, &config)?;
            println!("{script}");
        }

        Commands::Differ { delta } => {
            let delta = load_delta(&delta)?;
            let changed = differ(&delta, &config)?;
            println!("{changed}");
            if !changed {
                return Ok(ExitCode::FAILURE);
            }
        }

        Commands::Apply {
            delta,
            database,
            dry_run,
        } => {
            let delta = load_delta(&delta)?;

            let pool = SqlitePoolOptions::new()
                .max_connections(1)
                .connect(&database)
                .await?;
            // One session for the whole run, so pre_query settings stick.
            let conn = pool.acquire().await?;

            let mode = if dry_run {
                info!("Dry run mode - SQL will be printed but not executed.");
                Mode::DryRun
            } else {
                Mode::Apply
            };

            let mut executor = DeltaExecutor::new(conn, SqliteDialect::new(), config);
            let result = executor.migrate(&delta, mode).await?;

            if let Some(output) = result.rendered_output {
                if !output.is_empty() {
                    println!("{output}");
                }
            }

            if result.migrated {
                info!("Delta applied successfully.");
            } else {
                info!("No change.");
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}
