use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use cistern_pool::PoolConfig;
use clap::{ArgAction, Parser, Subcommand};
use log::LevelFilter;

mod bench;
mod sim;

/// Cistern Command Line Interface
///
/// Inspect pool configuration files and measure what pooling buys over
/// opening a session per statement.
#[derive(Parser)]
#[clap(author, version, about)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace). RUST_LOG overrides.
    #[clap(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load and validate a pool configuration file
    #[clap(name = "check-config")]
    CheckConfig {
        /// Path to a .toml file or a key=value file
        #[clap(long)]
        config: PathBuf,
    },

    /// Compare inserts through the pool with a fresh session per insert
    Bench {
        /// Pool configuration file; defaults are used when omitted
        #[clap(long)]
        config: Option<PathBuf>,

        /// Worker threads (defaults to the number of CPUs)
        #[clap(long)]
        threads: Option<usize>,

        /// Inserts per worker thread
        #[clap(long, default_value_t = 1000)]
        iterations: usize,

        /// Simulated cost of opening a session, in milliseconds
        #[clap(long, default_value_t = 5)]
        connect_latency_ms: u64,

        /// Simulated cost of one statement, in microseconds
        #[clap(long, default_value_t = 50)]
        statement_latency_us: u64,
    },
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(level)
        .parse_env("RUST_LOG")
        .init();
}

fn load_config(path: &PathBuf) -> Result<PoolConfig> {
    PoolConfig::from_file(path)
        .with_context(|| format!("failed to load configuration from {}", path.display()))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::CheckConfig { config } => {
            let pool_config = load_config(&config)?;
            println!("{:#?}", pool_config);
            println!("✅ Configuration OK: {}", config.display());
        }
        Commands::Bench {
            config,
            threads,
            iterations,
            connect_latency_ms,
            statement_latency_us,
        } => {
            let pool_config = match config {
                Some(path) => load_config(&path)?,
                None => PoolConfig::default(),
            };

            let options = bench::BenchOptions {
                threads: threads.unwrap_or_else(num_cpus::get).max(1),
                iterations,
                connect_latency: Duration::from_millis(connect_latency_ms),
                statement_latency: Duration::from_micros(statement_latency_us),
            };

            println!(
                "🔄 Running {} threads x {} inserts against {}:{}/{}",
                options.threads,
                options.iterations,
                pool_config.address,
                pool_config.port,
                pool_config.database
            );

            let report = bench::run(&pool_config, &options)?;

            println!(
                "not using pool: {:>10.2}ms ({} sessions opened)",
                report.unpooled.as_secs_f64() * 1000.0,
                report.unpooled_sessions
            );
            println!(
                "using pool:     {:>10.2}ms ({} sessions opened, {} inserts skipped)",
                report.pooled.as_secs_f64() * 1000.0,
                report.pooled_sessions,
                report.pooled_skipped
            );
            println!("rows written through the pool: {}", report.pooled_rows);
        }
    }

    Ok(())
}
