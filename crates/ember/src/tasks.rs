//! The schedule table and its handlers.

use ember_agent::{Agent, TaskKind};
use ember_scheduler::{Scheduler, task_handler};
use miette::Result;

/// When each task fires, on the UTC grid.
pub const SCHEDULE: [(TaskKind, &str); 7] = [
    (TaskKind::HourlyUpdate, "50 * * * *"),
    (TaskKind::ActivityDecision, "55 * * * *"),
    (TaskKind::DailyJournal, "0 23 * * *"),
    (TaskKind::RunwayCheck, "0 */6 * * *"),
    (TaskKind::GoalReview, "0 6 * * *"),
    (TaskKind::WeeklyReview, "0 18 * * 0"),
    (TaskKind::HealthCheck, "*/5 * * * *"),
];

/// Register every task in [`SCHEDULE`] against `agent`.
pub async fn register_all(scheduler: &Scheduler, agent: &Agent) -> Result<()> {
    for (kind, expr) in SCHEDULE {
        let agent = agent.clone();
        let handler = task_handler(move || {
            let agent = agent.clone();
            async move { agent.run(kind).await.map_err(|e| e.to_string()) }
        });

        scheduler
            .register_expr(kind.name(), expr, handler)
            .await
            .map_err(|e| miette::miette!("failed to register {}: {}", kind, e))?;
    }
    Ok(())
}
