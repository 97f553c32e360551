//! Task runner.

use std::fmt;
use std::str::FromStr;

use chrono::Utc;
use ember_remote::MemoryFilter;
use ember_state::ReviewKind;
use tracing::{info, warn};

use crate::{AgentError, PromptBuilder, PromptContext, Services};

/// How many strategic learnings to pull into a decision prompt.
const LEARNING_LIMIT: usize = 5;

/// Every task the daemon knows how to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    HourlyUpdate,
    ActivityDecision,
    DailyJournal,
    RunwayCheck,
    GoalReview,
    WeeklyReview,
    HealthCheck,
}

impl TaskKind {
    pub const ALL: [TaskKind; 7] = [
        TaskKind::HourlyUpdate,
        TaskKind::ActivityDecision,
        TaskKind::DailyJournal,
        TaskKind::RunwayCheck,
        TaskKind::GoalReview,
        TaskKind::WeeklyReview,
        TaskKind::HealthCheck,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            TaskKind::HourlyUpdate => "hourly-update",
            TaskKind::ActivityDecision => "activity-decision",
            TaskKind::DailyJournal => "daily-journal",
            TaskKind::RunwayCheck => "runway-check",
            TaskKind::GoalReview => "goal-review",
            TaskKind::WeeklyReview => "weekly-review",
            TaskKind::HealthCheck => "health-check",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TaskKind {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskKind::ALL
            .into_iter()
            .find(|k| k.name() == s)
            .ok_or_else(|| AgentError::UnknownTask(s.to_string()))
    }
}

/// Runs tasks against a shared [`Services`].
#[derive(Clone)]
pub struct Agent {
    services: Services,
}

impl Agent {
    pub fn new(services: Services) -> Self {
        Self { services }
    }

    /// Run one task to completion.
    ///
    /// Content tasks fail only when the completion call fails or the
    /// critical local save does not happen.
    pub async fn run(&self, kind: TaskKind) -> Result<(), AgentError> {
        match kind {
            TaskKind::RunwayCheck => {
                let burn = self.services.runway.burn_elapsed(Utc::now()).await?;
                info!(
                    runway_days = burn.current_days,
                    urgency = %burn.urgency,
                    "runway checked"
                );
                Ok(())
            }
            TaskKind::HealthCheck => {
                self.services.health.heartbeat().await?;
                Ok(())
            }
            TaskKind::ActivityDecision => {
                let context = self.context(true).await?;
                let content = self.generate(kind, &context).await?;
                let result = self.services.processor().process_activity(&content).await;
                check(kind, result.success, result.errors)
            }
            TaskKind::HourlyUpdate
            | TaskKind::DailyJournal
            | TaskKind::GoalReview
            | TaskKind::WeeklyReview => {
                let context = self.context(kind == TaskKind::WeeklyReview).await?;
                let content = self.generate(kind, &context).await?;
                let processor = self.services.processor();
                let day = context.runway.current_day;

                let result = match kind {
                    TaskKind::HourlyUpdate => {
                        processor.process_hourly(day, context.hour, &content).await
                    }
                    TaskKind::DailyJournal => processor.process_journal(day, &content).await,
                    TaskKind::GoalReview => {
                        processor
                            .process_review(ReviewKind::Goals, day, &content)
                            .await
                    }
                    _ => {
                        processor
                            .process_review(ReviewKind::Weekly, context.week(), &content)
                            .await
                    }
                };
                check(kind, result.success, result.errors)
            }
        }
    }

    async fn context(&self, with_learnings: bool) -> Result<PromptContext, AgentError> {
        let runway = self.services.runway.get_runway_status().await?;
        let metrics = self.services.metrics.get_metrics().await?;
        let hour = self.services.runway.local_hour_at(Utc::now());

        let context = PromptContext::new(runway, metrics, hour);
        if !with_learnings {
            return Ok(context);
        }
        Ok(context.with_learnings(self.recent_learnings().await))
    }

    /// Recent strategic learnings. Empty when the memory store is unavailable.
    async fn recent_learnings(&self) -> Vec<String> {
        let filters = [MemoryFilter::eq("type", "strategic_learning")];
        match self
            .services
            .memory
            .search("strategic learning", &filters, LEARNING_LIMIT)
            .await
        {
            Ok(hits) => hits.into_iter().map(|h| h.content).collect(),
            Err(e) => {
                warn!(error = %e, "could not load strategic learnings");
                Vec::new()
            }
        }
    }

    async fn generate(&self, kind: TaskKind, context: &PromptContext) -> Result<String, AgentError> {
        let system = PromptBuilder::system(context);
        let user = PromptBuilder::user(kind, context).unwrap_or_default();
        let response = self.services.llm.generate_content(&system, &user).await?;
        Ok(response.content)
    }
}

fn check(kind: TaskKind, success: bool, errors: Vec<String>) -> Result<(), AgentError> {
    if success {
        if !errors.is_empty() {
            warn!(task = %kind, errors = ?errors, "completed with best-effort failures");
        }
        Ok(())
    } else {
        Err(AgentError::Pipeline {
            task: kind.name().to_string(),
            errors,
        })
    }
}
