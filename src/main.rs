use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use turnstile::config::TurnstileConfig;
use turnstile::driver::Driver;
use turnstile::{CancelToken, Limiter, Strategy, WindowSize};

#[derive(Parser)]
#[command(name = "turnstile", version, about = "Drive concurrent load through a blocking rate limiter")]
struct Args {
    /// YAML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Admission strategy (sliding or fixed)
    #[arg(long)]
    strategy: Option<Strategy>,

    /// Maximum admissions per window
    #[arg(long)]
    capacity: Option<usize>,

    /// Window length (e.g. "250ms", "2s", "1m")
    #[arg(long)]
    window: Option<WindowSize>,

    /// Number of concurrent callers
    #[arg(long)]
    callers: Option<usize>,

    /// Acquisitions per caller
    #[arg(long)]
    acquisitions: Option<usize>,

    /// Simulated work after each admission, in milliseconds
    #[arg(long)]
    work_ms: Option<u64>,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,
}

impl Args {
    /// Command line flags take precedence over the configuration file.
    fn apply(&self, config: &mut TurnstileConfig) {
        if let Some(strategy) = self.strategy {
            config.limiter.strategy = strategy;
        }
        if let Some(capacity) = self.capacity {
            config.limiter.capacity = capacity;
        }
        if let Some(window) = self.window {
            config.limiter.window = window;
        }
        if let Some(callers) = self.callers {
            config.driver.callers = callers;
        }
        if let Some(acquisitions) = self.acquisitions {
            config.driver.acquisitions_per_caller = acquisitions;
        }
        if let Some(work_ms) = self.work_ms {
            config.driver.work_ms = work_ms;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Logs go to stderr so a JSON report on stdout stays parseable
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if args.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(true)
            .with_writer(std::io::stderr)
            .init();
    }

    info!("Starting Turnstile");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut config = match &args.config {
        Some(path) => TurnstileConfig::from_file(path)?,
        None => TurnstileConfig::default(),
    };
    args.apply(&mut config);
    config.validate()?;

    let limiter = Arc::new(Limiter::from_config(&config.limiter)?);
    info!(
        strategy = %limiter.strategy(),
        capacity = config.limiter.capacity,
        window = %config.limiter.window,
        "Limiter initialized"
    );

    let cancel = CancelToken::new();
    let driver = Driver::new(limiter, config.driver.clone(), cancel.clone());
    let run = tokio::task::spawn_blocking(move || driver.run());

    tokio::spawn(async move {
        shutdown_signal().await;
        cancel.cancel();
    });

    let report = run.await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", report);
    }

    info!("Turnstile stopped");
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, cancelling waiting callers");
        }
        _ = terminate => {
            info!("Received SIGTERM, cancelling waiting callers");
        }
    }
}
