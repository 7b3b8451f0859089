//! `hypermc` - Monte Carlo integration of the Gaussian kernel over a hypercube
//!
//! # Commands
//!
//! - `hypermc run` - integrate with worker threads, or with worker processes started on this
//!   machine (`--backend processes`)
//! - `hypermc coordinate --size W` - act as rank 0 of `W` processes started elsewhere
//! - `hypermc worker --rank R --size W --coordinator ADDR` - act as one of the other ranks
//!
//! Logging goes to stderr and is controlled with `RUST_LOG`, results go to stdout: as text, as
//! JSON (`--json`) or as the single line `P T` with the number of workers and the elapsed
//! seconds (`--scaling`), for collecting scaling measurements.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use hypermc::config::{Backend, RunConfig};
use hypermc::reduce::{TcpReducer, ThreadReducer, DEFAULT_TIMEOUT};
use hypermc::{integrate, Gaussian, IntegrationRequest, Report};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::{Command, ExitStatus};
use std::time::Duration;
use std::{env, thread};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Parallel Monte Carlo integration over hypercubes
#[derive(Parser)]
#[command(name = "hypermc")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Integrate with the configured backend
    Run {
        #[command(flatten)]
        params: Params,

        #[command(flatten)]
        output: Output,
    },

    /// Act as the coordinator (rank 0) of processes started independently
    Coordinate {
        #[command(flatten)]
        params: Params,

        /// Number of processes, including this one
        #[arg(long)]
        size: u32,

        #[command(flatten)]
        output: Output,
    },

    /// Act as one of the non-coordinating processes
    Worker {
        #[command(flatten)]
        params: Params,

        /// Rank of this process, between 1 and `size - 1`
        #[arg(long)]
        rank: u32,

        /// Number of processes, including the coordinator
        #[arg(long)]
        size: u32,

        /// Address of the coordinator
        #[arg(long)]
        coordinator: String,
    },
}

/// Integration parameters; flags override the configuration file.
#[derive(Args)]
struct Params {
    /// Configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Lower bound of every coordinate
    #[arg(long, allow_hyphen_values = true)]
    lower: Option<f64>,

    /// Upper bound of every coordinate
    #[arg(long, allow_hyphen_values = true)]
    upper: Option<f64>,

    /// Number of dimensions
    #[arg(short, long)]
    dimensions: Option<u32>,

    /// Total number of samples
    #[arg(short = 'n', long)]
    samples: Option<u64>,

    /// Number of workers
    #[arg(short, long)]
    workers: Option<u32>,

    /// Global seed
    #[arg(long)]
    seed: Option<u64>,

    /// Execution backend (threads, processes)
    #[arg(short, long)]
    backend: Option<Backend>,

    /// Address the coordinator listens on
    #[arg(long)]
    bind: Option<String>,

    /// Seconds to wait for the coordinator or for all workers to connect
    #[arg(long)]
    timeout: Option<u64>,
}

/// How the report is printed.
#[derive(Args)]
struct Output {
    /// Print the report as JSON
    #[arg(long, conflicts_with = "scaling")]
    json: bool,

    /// Only print the number of workers and the elapsed seconds
    #[arg(long)]
    scaling: bool,
}

impl Params {
    fn config(&self) -> Result<RunConfig> {
        let mut config = match &self.config {
            Some(path) => RunConfig::load(path)
                .with_context(|| format!("failed to load configuration from {}", path.display()))?,
            None => RunConfig::default(),
        };

        if let Some(lower) = self.lower {
            config.lower = lower;
        }
        if let Some(upper) = self.upper {
            config.upper = upper;
        }
        if let Some(dimensions) = self.dimensions {
            config.dimensions = dimensions;
        }
        if let Some(samples) = self.samples {
            config.samples = samples;
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if let Some(backend) = self.backend {
            config.backend = backend;
        }
        if let Some(bind) = &self.bind {
            config.bind = bind.clone();
        }
        if let Some(timeout) = self.timeout {
            config.timeout = timeout;
        }

        Ok(config)
    }
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    match Cli::parse().command {
        Commands::Run { params, output } => {
            let config = params.config()?;
            let request = config.request()?;

            let report = match config.backend {
                Backend::Threads => {
                    let mut reducer = ThreadReducer::new(config.workers)?;
                    integrate(&request, &Gaussian, &mut reducer)?
                }
                Backend::Processes => launch(&config, &request)?,
            };

            print_report(&request, &report, &output)
        }
        Commands::Coordinate {
            params,
            size,
            output,
        } => {
            let config = params.config()?;
            let request = config.request()?;
            let mut reducer = TcpReducer::bind(config.bind.as_str(), size)
                .with_context(|| format!("failed to listen on {}", config.bind))?
                .with_timeout(Duration::from_secs(config.timeout));

            if let Some(address) = reducer.local_addr() {
                info!(%address, size, "waiting for workers");
            }

            let report = integrate(&request, &Gaussian, &mut reducer)?;
            print_report(&request, &report, &output)
        }
        Commands::Worker {
            params,
            rank,
            size,
            coordinator,
        } => {
            let config = params.config();
            let timeout = config
                .as_ref()
                .map_or(DEFAULT_TIMEOUT, |config| Duration::from_secs(config.timeout));

            let reducer = config.and_then(|config| {
                let request = config.request()?;
                let reducer = TcpReducer::peer(coordinator.as_str(), rank, size)?;
                Ok((request, reducer.with_timeout(timeout)))
            });

            let (request, mut reducer) = match reducer {
                Ok(setup) => setup,
                Err(err) => {
                    // the coordinator would otherwise wait for this rank until it times out
                    let reason = format!("{:#}", err);
                    if let Err(abort) =
                        TcpReducer::abort(coordinator.as_str(), rank, &reason, timeout)
                    {
                        warn!(rank, %abort, "could not tell the coordinator");
                    }
                    return Err(err.context(format!("worker {} failed", rank)));
                }
            };

            let report = integrate(&request, &Gaussian, &mut reducer)
                .with_context(|| format!("worker {} failed", rank))?;
            info!(rank, integral = report.result().integral(), "worker finished");

            Ok(())
        }
    }
}

/// Start `config.workers - 1` copies of this executable in worker mode and act as their
/// coordinator.
fn launch(config: &RunConfig, request: &IntegrationRequest) -> Result<Report> {
    let mut reducer = TcpReducer::bind(config.bind.as_str(), config.workers)
        .with_context(|| format!("failed to listen on {}", config.bind))?
        .with_timeout(Duration::from_secs(config.timeout));
    let address = reducer
        .local_addr()
        .context("the coordinator has no local address")?;
    let exe = env::current_exe().context("failed to locate the current executable")?;

    let mut watchers = Vec::with_capacity(config.workers as usize);

    for rank in 1..config.workers {
        let mut child = Command::new(&exe)
            .arg("worker")
            .arg(format!("--rank={}", rank))
            .arg(format!("--size={}", config.workers))
            .arg(format!("--coordinator={}", address))
            .arg(format!("--lower={}", request.lower()))
            .arg(format!("--upper={}", request.upper()))
            .arg(format!("--dimensions={}", request.dimensions()))
            .arg(format!("--samples={}", request.samples()))
            .arg(format!("--seed={}", request.seed()))
            .arg(format!("--timeout={}", config.timeout))
            .spawn()
            .with_context(|| format!("failed to start worker {}", rank))?;

        watchers.push(thread::spawn(move || watch(rank, address, child.wait())));
    }

    info!(%address, workers = config.workers, "started worker processes");

    let report = integrate(request, &Gaussian, &mut reducer);

    // close all connections, so that workers waiting for the total fail
    drop(reducer);

    let statuses = watchers
        .into_iter()
        .map(|watcher| watcher.join())
        .collect::<Vec<_>>();

    let report = report?;

    for status in statuses {
        match status {
            Ok(Ok(_)) => {}
            Ok(Err(err)) => return Err(err),
            Err(_) => bail!("a worker watcher panicked"),
        }
    }

    Ok(report)
}

/// Wait for worker `rank` and, should it fail, abort the reduction on its behalf.
fn watch(rank: u32, coordinator: SocketAddr, status: std::io::Result<ExitStatus>) -> Result<()> {
    let reason = match status {
        Ok(status) if status.success() => return Ok(()),
        Ok(status) => format!("worker process exited with {}", status),
        Err(err) => format!("failed to wait for worker process: {}", err),
    };

    error!(rank, %reason, "worker failed");

    // the coordinator listens for as long as it waits for workers, so one attempt suffices
    if let Err(err) = TcpReducer::abort(coordinator, rank, &reason, Duration::ZERO) {
        warn!(rank, %err, "coordinator no longer listens");
    }

    bail!("worker {}: {}", rank, reason)
}

fn print_report(request: &IntegrationRequest, report: &Report, output: &Output) -> Result<()> {
    if output.scaling {
        println!("{} {}", report.workers(), report.elapsed().as_secs_f64());
        return Ok(());
    }

    if output.json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    let result = report.result();

    println!("dimensions: {}", request.dimensions());
    println!("samples: {}", request.samples());
    println!("bounds: [{}, {})", request.lower(), request.upper());
    println!(
        "integral: E={} \u{b1} {}",
        result.integral(),
        result.standard_error()
    );
    println!("variance: {}", result.variance());
    println!("workers: {}", report.workers());
    println!("time: {:.6} s", report.elapsed().as_secs_f64());

    Ok(())
}
