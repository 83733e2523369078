//! conncache — exercise connection reuse against a live endpoint.
//!
//! # Usage
//!
//! ```text
//! conncache probe --target db://127.0.0.1:1521/orcl --principal scott \
//!     --threads 4 --rounds 50 --hold-ms 20 --config session.toml
//! ```
//!
//! Each worker thread repeatedly obtains a connection, holds it for
//! `--hold-ms`, and relinquishes it. Cache statistics are logged at the end
//! and the cache is shut down explicitly before exit.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use conncache::{ConnectionProvider, SessionConfig, TcpDriver};

#[derive(Parser)]
#[command(
    name = "conncache",
    about = "Probe connection reuse against a live endpoint",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Obtain and relinquish connections from several threads.
    Probe {
        /// Connection target, e.g. db://host:1521/service
        #[arg(short, long)]
        target: String,
        /// Principal (user) to connect as.
        #[arg(short, long)]
        principal: Option<String>,
        /// Credential for the principal.
        #[arg(long, env = "CONNCACHE_CREDENTIAL", hide_env_values = true)]
        credential: Option<String>,
        /// Number of worker threads.
        #[arg(long, default_value = "4")]
        threads: usize,
        /// Obtain/relinquish cycles per thread.
        #[arg(long, default_value = "10")]
        rounds: usize,
        /// How long each worker holds a connection, in milliseconds.
        #[arg(long, default_value = "10")]
        hold_ms: u64,
        /// Session configuration file (TOML).
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,conncache=debug")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Probe {
            target,
            principal,
            credential,
            threads,
            rounds,
            hold_ms,
            config,
        } => {
            let session = match config {
                Some(path) => SessionConfig::from_file(&path)
                    .with_context(|| format!("loading {}", path.display()))?,
                None => SessionConfig::default(),
            };
            let endpoint = Endpoint {
                target,
                principal,
                credential,
            };
            probe(endpoint, session, threads, rounds, Duration::from_millis(hold_ms))
        }
    }
}

struct Endpoint {
    target: String,
    principal: Option<String>,
    credential: Option<String>,
}

fn probe(
    endpoint: Endpoint,
    session: SessionConfig,
    threads: usize,
    rounds: usize,
    hold: Duration,
) -> anyhow::Result<()> {
    anyhow::ensure!(threads > 0, "--threads must be at least 1");

    let driver = Arc::new(TcpDriver::from_config(&session));
    let provider = Arc::new(ConnectionProvider::new(driver, session));
    let endpoint = Arc::new(endpoint);
    let started = Instant::now();

    info!(
        endpoint = %endpoint.target,
        threads,
        rounds,
        "probe starting"
    );

    let workers: Vec<_> = (0..threads)
        .map(|worker| {
            let provider = Arc::clone(&provider);
            let endpoint = Arc::clone(&endpoint);
            thread::spawn(move || -> anyhow::Result<usize> {
                let mut failures = 0;
                for round in 0..rounds {
                    let obtained = provider.obtain(
                        &endpoint.target,
                        endpoint.principal.as_deref(),
                        endpoint.credential.as_deref(),
                    );
                    match obtained {
                        Ok(conn) => {
                            thread::sleep(hold);
                            provider.relinquish(
                                &endpoint.target,
                                endpoint.principal.as_deref(),
                                conn,
                            )?;
                        }
                        Err(e) => {
                            failures += 1;
                            warn!(worker, round, error = %e, "obtain failed");
                        }
                    }
                }
                Ok(failures)
            })
        })
        .collect();

    let mut failures = 0;
    for worker in workers {
        match worker.join() {
            Ok(result) => failures += result?,
            Err(_) => anyhow::bail!("worker thread panicked"),
        }
    }

    let cache = provider.cache();
    cache.log_stats();
    let stats = cache.stats();
    let closed = cache.shutdown();

    info!(
        elapsed_ms = started.elapsed().as_millis() as u64,
        hits = stats.hits,
        misses = stats.misses,
        failures,
        closed,
        "probe complete"
    );

    anyhow::ensure!(failures == 0, "{failures} obtain calls failed");
    Ok(())
}
