//! Ember: an autonomous agent on a budget.
//!
//! Main binary with subcommands:
//! - `daemon`: run the schedule until interrupted
//! - `status`: print the runway and metrics snapshot as JSON
//! - `run-task`: run one task now and exit
//! - `set-runway`: overwrite the remaining runway
//! - `ship`, `record-revenue`, `set-metric`: operator updates to the metrics

use clap::{Parser, Subcommand};
use ember_agent::{Agent, TaskKind};
use ember_state::MetricsStore;
use miette::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod daemon;
mod tasks;

use config::{ServiceArgs, StateArgs, build_services, parse_metric_value};

#[derive(Parser)]
#[command(name = "ember")]
#[command(about = "Autonomous agent that has to earn its keep", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scheduled tasks until Ctrl-C
    Daemon {
        #[command(flatten)]
        service: ServiceArgs,

        #[command(flatten)]
        state: StateArgs,
    },

    /// Print runway and metrics as JSON
    Status {
        #[command(flatten)]
        state: StateArgs,
    },

    /// Run a single task immediately
    RunTask {
        /// Task name (e.g. hourly-update, runway-check)
        #[arg(value_name = "TASK")]
        name: String,

        #[command(flatten)]
        service: ServiceArgs,

        #[command(flatten)]
        state: StateArgs,
    },

    /// Overwrite the remaining runway in days
    SetRunway {
        #[arg(value_name = "DAYS")]
        days: f64,

        #[command(flatten)]
        state: StateArgs,
    },

    /// Count one more thing shipped
    Ship {
        #[command(flatten)]
        state: StateArgs,
    },

    /// Add an amount to the revenue total
    RecordRevenue {
        #[arg(value_name = "AMOUNT")]
        amount: f64,

        #[command(flatten)]
        state: StateArgs,
    },

    /// Set a key metric (numbers and booleans are stored as such)
    SetMetric {
        #[arg(value_name = "KEY")]
        key: String,

        #[arg(value_name = "VALUE")]
        value: String,

        #[command(flatten)]
        state: StateArgs,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "ember=info".to_string()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Daemon { service, state } => {
            let services = build_services(&service, &state)?;
            daemon::run(services).await
        }

        Commands::Status { state } => print_status(&state).await,

        Commands::RunTask {
            name,
            service,
            state,
        } => {
            let kind: TaskKind = name.parse().map_err(|e| miette::miette!("{}", e))?;
            let agent = Agent::new(build_services(&service, &state)?);
            agent
                .run(kind)
                .await
                .map_err(|e| miette::miette!("{}", e))?;
            tracing::info!(task = %kind, "task finished");
            Ok(())
        }

        Commands::SetRunway { days, state } => {
            let tracker = state.runway_tracker()?;
            let record = tracker
                .update_runway_days(days)
                .await
                .map_err(|e| miette::miette!("{}", e))?;
            println!(
                "runway set to {} days ({})",
                record.runway_days,
                ember_state::UrgencyLevel::from_runway_days(record.runway_days)
            );
            Ok(())
        }

        Commands::Ship { state } => {
            let metrics = metrics_store(&state)?
                .increment_shipped()
                .await
                .map_err(|e| miette::miette!("{}", e))?;
            println!("things shipped: {}", metrics.things_shipped);
            Ok(())
        }

        Commands::RecordRevenue { amount, state } => {
            let metrics = metrics_store(&state)?
                .record_revenue(amount)
                .await
                .map_err(|e| miette::miette!("{}", e))?;
            println!("revenue total: ${:.2}", metrics.revenue_total);
            Ok(())
        }

        Commands::SetMetric { key, value, state } => {
            metrics_store(&state)?
                .set_key_metric(&key, parse_metric_value(&value))
                .await
                .map_err(|e| miette::miette!("{}", e))?;
            println!("{} = {}", key, value);
            Ok(())
        }
    }
}

fn metrics_store(state: &StateArgs) -> Result<MetricsStore> {
    Ok(MetricsStore::new(&state.data_dir()?))
}

async fn print_status(state: &StateArgs) -> Result<()> {
    let runway = state
        .runway_tracker()?
        .get_runway_status()
        .await
        .map_err(|e| miette::miette!("{}", e))?;
    let metrics = metrics_store(state)?
        .get_metrics()
        .await
        .map_err(|e| miette::miette!("{}", e))?;

    let snapshot = serde_json::json!({
        "runway": runway,
        "metrics": metrics,
    });
    let rendered = serde_json::to_string_pretty(&snapshot).map_err(|e| miette::miette!("{}", e))?;
    println!("{}", rendered);
    Ok(())
}
