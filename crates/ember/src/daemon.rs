//! Daemon command: run the schedule until interrupted.

use ember_agent::{Agent, Services};
use ember_scheduler::Scheduler;
use miette::Result;
use tokio::sync::watch;
use tracing::{error, info};

use crate::tasks;

pub async fn run(services: Services) -> Result<()> {
    let health = services.health.clone();
    health
        .mark_started()
        .await
        .map_err(|e| miette::miette!("failed to write health record: {}", e))?;

    let status = services
        .runway
        .get_runway_status()
        .await
        .map_err(|e| miette::miette!("failed to read runway: {}", e))?;
    info!(
        day = status.current_day,
        runway_days = status.runway_days,
        urgency = %status.urgency,
        fresh_start = status.fresh_start,
        "starting ember daemon"
    );

    let agent = Agent::new(services);
    let scheduler = Scheduler::new();
    tasks::register_all(&scheduler, &agent).await?;
    scheduler.start().await;

    // Create shutdown channel
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

    // Handle shutdown signals
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("received shutdown signal");
        let _ = shutdown_tx.send(true);
    });

    while !*shutdown_rx.borrow() {
        if shutdown_rx.changed().await.is_err() {
            break;
        }
    }

    scheduler.stop().await;
    if let Err(e) = health.mark_shutdown().await {
        error!(error = %e, "failed to record shutdown");
    }
    info!("ember daemon stopped");
    Ok(())
}
