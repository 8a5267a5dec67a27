//! # Industry - Factory Simulation Entry Point
//!
//! `run` lays out the floor, launches every agent, forwards telemetry to the
//! log and stops after the requested duration (or earlier if the scheduler
//! halts). `config` prints the effective configuration.

#![forbid(unsafe_code)]
#![forbid(clippy::unwrap_used)]
#![forbid(clippy::panic)]
#![deny(clippy::expect_used)]

mod cli;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use industry_events::{EventBus, spawn_log_sink};
use industry_orchestrator::FactoryConfig;
use industry_orchestrator::bootstrap::{Factory, LaunchOptions, RunOutcome};

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run {
            config,
            orders,
            duration_secs,
            seed,
        } => {
            let mut config = load_config(config.as_deref())?;
            if orders.is_some() {
                config.orders.limit = orders;
            }
            if seed.is_some() {
                config.layout.seed = seed;
            }
            run(&config, Duration::from_secs(duration_secs)).await
        }
        Commands::Config { config } => {
            let config = load_config(config.as_deref())?;
            let text = config
                .to_toml_string()
                .context("Failed to render configuration")?;
            println!("{text}");
            Ok(())
        }
    }
}

/// Initialize tracing subscriber with environment filter.
fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn load_config(path: Option<&Path>) -> Result<FactoryConfig> {
    let config = match path {
        Some(path) => FactoryConfig::load(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => FactoryConfig::default(),
    };
    config
        .validate()
        .map_err(anyhow::Error::msg)
        .context("Invalid configuration")?;
    Ok(config)
}

async fn run(config: &FactoryConfig, duration: Duration) -> Result<()> {
    let telemetry = Arc::new(EventBus::new());
    let sink = spawn_log_sink(telemetry.subscribe());

    let mut factory = Factory::launch(
        config,
        Arc::clone(&telemetry),
        LaunchOptions::default().with_name_prefix("industry/"),
    )
    .await
    .context("Failed to launch factory")?;

    info!(
        cells = factory.layout.cells.len(),
        robots = factory.layout.robots.len(),
        ?duration,
        "Factory running"
    );

    let outcome = tokio::select! {
        outcome = factory.run_for(duration) => outcome,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, stopping");
            RunOutcome::Elapsed
        }
    };
    if outcome == RunOutcome::SchedulerStopped {
        warn!("Scheduler stopped before the run ended");
    }

    match factory.scheduler_stats().await {
        Ok(stats) => info!(
            completed = stats.completed,
            queued = stats.queued,
            in_flight = stats.in_flight,
            halted = ?stats.halted,
            "Scheduler summary"
        ),
        Err(e) => warn!(error = %e, "Scheduler summary unavailable"),
    }
    match factory.source_stats().await {
        Ok(stats) => info!(
            submitted = stats.submitted,
            accepted = stats.accepted.len(),
            rejected = stats.rejected.len(),
            completed = stats.completed.len(),
            "Order source summary"
        ),
        Err(e) => warn!(error = %e, "Order source summary unavailable"),
    }

    factory.shutdown().await;
    drop(telemetry);
    sink.abort();
    Ok(())
}
