use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use rand::Rng;
use tokio::signal;
use tokio::time::Instant;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use callgate::{Governor, GovernorConfig};

/// Drive simulated callers through a shared call-rate governor.
#[derive(Debug, Parser)]
#[command(name = "callgate", version, about)]
struct Args {
    /// YAML settings file; `RATE_LIMIT_*` environment variables override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of concurrent callers
    #[arg(long, default_value_t = 10)]
    callers: usize,

    /// Probability that a simulated call fails and is retried
    #[arg(long, default_value_t = 0.0)]
    failure_rate: f64,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match args.log_format {
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(true)
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_thread_ids(true)
            .init(),
    }

    if !(0.0..=1.0).contains(&args.failure_rate) {
        anyhow::bail!("--failure-rate must be between 0 and 1");
    }

    info!("Starting callgate");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = GovernorConfig::load(args.config.as_deref())?;
    info!(
        max_calls = config.max_calls,
        period = config.period,
        "Configuration loaded"
    );

    let governor = Governor::new(&config)?;

    tokio::select! {
        _ = run_callers(governor, args.callers, args.failure_rate) => {
            info!("All callers finished");
        }
        _ = shutdown_signal() => {}
    }

    Ok(())
}

/// Spawn `callers` tasks that each make one governed call.
async fn run_callers(governor: Governor, callers: usize, failure_rate: f64) {
    let start = Instant::now();

    let handles: Vec<_> = (0..callers)
        .map(|id| {
            let governor = governor.clone();
            tokio::spawn(async move {
                let result = governor
                    .run_with_retries(|| simulated_call(id, failure_rate))
                    .await;
                let elapsed_ms = start.elapsed().as_millis() as u64;
                match result {
                    Ok(()) => info!(caller = id, elapsed_ms, "Call completed"),
                    Err(e) => error!(caller = id, elapsed_ms, error = %e, "Call gave up"),
                }
            })
        })
        .collect();

    for result in futures::future::join_all(handles).await {
        if let Err(e) = result {
            error!(error = %e, "Caller task panicked");
        }
    }
}

/// Stand-in for a throttled downstream call.
async fn simulated_call(id: usize, failure_rate: f64) -> Result<(), String> {
    let (failed, work_ms) = {
        let mut rng = rand::thread_rng();
        (rng.gen_bool(failure_rate), rng.gen_range(5..50))
    };
    tokio::time::sleep(Duration::from_millis(work_ms)).await;

    if failed {
        Err(format!("caller {} throttled by downstream", id))
    } else {
        Ok(())
    }
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down");
        }
    }
}
