//! Output processor: persists completion results.
//!
//! Content tasks (hourly update, daily journal, reviews) run the same stages:
//!
//! 1. reject empty content before touching any dependency
//! 2. gather runway and metrics concurrently; failure aborts
//! 3. save locally (critical: decides `success`)
//! 4. mirror to the memory store (best-effort)
//! 5. rewrite the landing record (best-effort, not for reviews)
//! 6. trigger a deploy (best-effort, not for reviews)
//!
//! A failed local save is recorded and the remaining stages still run.

use std::sync::Arc;

use chrono::Utc;
use ember_remote::{Deployer, MemoryMetadata, MemoryStore};
use ember_state::{
    ContentMetadata, ContentStore, HourlyRecord, JournalRecord, LandingRecord, Metrics,
    MetricsSource, ReviewKind, ReviewRecord, RunwaySource, RunwayStatus,
};
use serde::Serialize;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::{ActivityDecision, mentions_strategy_change, parse_decision};

const EMPTY_RESPONSE: &str = "Empty response from completion service";

/// Confidence below which strategy notes are kept as a learning.
const LEARNING_CONFIDENCE: f64 = 0.5;
/// Confidence below which a suggested strategy change is applied.
const STRATEGY_CHANGE_CONFIDENCE: f64 = 0.4;
/// Longest strategy string taken from notes.
const MAX_STRATEGY_CHARS: usize = 200;

/// Outcome of a content pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessResult {
    /// Always equal to `local_saved`.
    pub success: bool,
    pub local_saved: bool,
    pub memory_saved: bool,
    pub deployed: bool,
    /// The landing record was rewritten.
    pub metrics_updated: bool,
    pub errors: Vec<String>,
}

impl ProcessResult {
    fn failed(error: impl Into<String>) -> Self {
        Self {
            errors: vec![error.into()],
            ..Default::default()
        }
    }
}

/// Outcome of a decision pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityResult {
    /// The response parsed and validated.
    pub success: bool,
    pub decision: Option<ActivityDecision>,
    pub learning_saved: bool,
    pub strategy_updated: bool,
    pub errors: Vec<String>,
}

/// What to write locally once status is known.
enum LocalRecord {
    Hourly { day: u32, hour: u32 },
    Journal { day: u32 },
    Review { kind: ReviewKind, period: u32 },
}

impl LocalRecord {
    fn label(&self) -> &'static str {
        match self {
            LocalRecord::Hourly { .. } => "hourly_update",
            LocalRecord::Journal { .. } => "daily_journal",
            LocalRecord::Review { kind, .. } => kind.memory_type(),
        }
    }

    fn publishes(&self) -> bool {
        !matches!(self, LocalRecord::Review { .. })
    }
}

pub struct OutputProcessor {
    content: Arc<dyn ContentStore>,
    memory: Arc<dyn MemoryStore>,
    deployer: Arc<dyn Deployer>,
    runway: Arc<dyn RunwaySource>,
    metrics: Arc<dyn MetricsSource>,
}

impl OutputProcessor {
    pub fn new(
        content: Arc<dyn ContentStore>,
        memory: Arc<dyn MemoryStore>,
        deployer: Arc<dyn Deployer>,
        runway: Arc<dyn RunwaySource>,
        metrics: Arc<dyn MetricsSource>,
    ) -> Self {
        Self {
            content,
            memory,
            deployer,
            runway,
            metrics,
        }
    }

    /// Persist an hourly update.
    #[tracing::instrument(skip(self, content), fields(len = content.len()))]
    pub async fn process_hourly(&self, day: u32, hour: u32, content: &str) -> ProcessResult {
        self.process_content(LocalRecord::Hourly { day, hour }, content)
            .await
    }

    /// Persist a daily journal.
    #[tracing::instrument(skip(self, content), fields(len = content.len()))]
    pub async fn process_journal(&self, day: u32, content: &str) -> ProcessResult {
        self.process_content(LocalRecord::Journal { day }, content)
            .await
    }

    /// Persist a goal or weekly review. Reviews are not published.
    #[tracing::instrument(skip(self, content), fields(len = content.len()))]
    pub async fn process_review(
        &self,
        kind: ReviewKind,
        period: u32,
        content: &str,
    ) -> ProcessResult {
        self.process_content(LocalRecord::Review { kind, period }, content)
            .await
    }

    async fn gather_status(&self) -> Result<(RunwayStatus, Metrics), String> {
        tokio::try_join!(self.runway.runway_status(), self.metrics.metrics())
            .map_err(|e| format!("Failed to gather status: {}", e))
    }

    async fn process_content(&self, target: LocalRecord, raw: &str) -> ProcessResult {
        let content = raw.trim();
        if content.is_empty() {
            warn!(record = target.label(), "empty response, nothing to persist");
            return ProcessResult::failed(EMPTY_RESPONSE);
        }

        let (runway, metrics) = match self.gather_status().await {
            Ok(status) => status,
            Err(e) => {
                error!(error = %e, "cannot build metadata");
                return ProcessResult::failed(e);
            }
        };

        let mut result = ProcessResult::default();
        let now = Utc::now();

        let (metadata, saved) = match &target {
            LocalRecord::Hourly { day, hour } => {
                let metadata =
                    ContentMetadata::new(content, *day, Some(*hour), now, &runway, &metrics);
                let record = HourlyRecord {
                    content: content.to_string(),
                    metadata: metadata.clone(),
                };
                (metadata, self.content.save_hourly(&record).await)
            }
            LocalRecord::Journal { day } => {
                let metadata = ContentMetadata::new(content, *day, None, now, &runway, &metrics);
                let record = JournalRecord {
                    content: content.to_string(),
                    metadata: metadata.clone(),
                    things_shipped: metrics.things_shipped,
                    revenue_total: metrics.revenue_total,
                };
                (metadata, self.content.save_journal(&record).await)
            }
            LocalRecord::Review { kind, period } => {
                let metadata =
                    ContentMetadata::new(content, runway.current_day, None, now, &runway, &metrics);
                let record = ReviewRecord {
                    kind: *kind,
                    period: *period,
                    content: content.to_string(),
                    metadata: metadata.clone(),
                };
                (metadata, self.content.save_review(&record).await)
            }
        };

        match saved {
            Ok(()) => result.local_saved = true,
            Err(e) => {
                error!(record = target.label(), error = %e, "local save failed");
                result.errors.push(format!("Local save failed: {}", e));
            }
        }

        let memory_metadata = metadata.to_memory_metadata(target.label());
        match self.memory.create(content, &memory_metadata).await {
            Ok(id) => {
                result.memory_saved = true;
                info!(memory_id = %id, "mirrored to memory store");
            }
            Err(e) => {
                warn!(error = %e, "memory store write failed");
                result.errors.push(format!("Memory save failed: {}", e));
            }
        }

        if target.publishes() {
            match self.update_landing().await {
                Ok(()) => result.metrics_updated = true,
                Err(e) => {
                    warn!(error = %e, "landing update failed");
                    result.errors.push(format!("Landing update failed: {}", e));
                }
            }

            result.deployed = self.deployer.trigger().await;
            if !result.deployed {
                result.errors.push("Deploy trigger failed".to_string());
            }
        }

        result.success = result.local_saved;
        info!(
            record = target.label(),
            success = result.success,
            memory_saved = result.memory_saved,
            deployed = result.deployed,
            metrics_updated = result.metrics_updated,
            errors = result.errors.len(),
            "content processed"
        );
        result
    }

    async fn update_landing(&self) -> Result<(), String> {
        let (runway, metrics) = self.gather_status().await?;
        let landing = LandingRecord::new(&runway, &metrics, Utc::now());
        self.content
            .save_landing(&landing)
            .await
            .map_err(|e| e.to_string())
    }

    /// Validate an activity decision and act on its strategy notes.
    ///
    /// Never touches the content store or the deployer.
    #[tracing::instrument(skip(self, content), fields(len = content.len()))]
    pub async fn process_activity(&self, content: &str) -> ActivityResult {
        let decision = match parse_decision(content) {
            Ok(decision) => decision,
            Err(e) => {
                warn!(error = %e, "rejected activity decision");
                return ActivityResult {
                    errors: vec![e.to_string()],
                    ..Default::default()
                };
            }
        };

        let mut result = ActivityResult {
            success: true,
            ..Default::default()
        };
        let confidence = decision.confidence_in_strategy;

        if let Some(notes) = decision.notes().filter(|_| confidence < LEARNING_CONFIDENCE) {
            let mut metadata = MemoryMetadata::new();
            metadata.insert("type".to_string(), Value::from("strategic_learning"));
            metadata.insert("confidence".to_string(), Value::from(confidence));
            metadata.insert("timestamp".to_string(), Value::from(Utc::now().to_rfc3339()));

            match self.memory.create(notes, &metadata).await {
                Ok(_) => result.learning_saved = true,
                Err(e) => {
                    warn!(error = %e, "failed to save strategic learning");
                    result.errors.push(format!("Learning save failed: {}", e));
                }
            }

            if confidence < STRATEGY_CHANGE_CONFIDENCE && mentions_strategy_change(notes) {
                let strategy = strategy_from_notes(notes);
                match self.metrics.set_strategy(&strategy).await {
                    Ok(_) => {
                        result.strategy_updated = true;
                        info!(strategy = %strategy, confidence, "strategy changed");
                    }
                    Err(e) => {
                        warn!(error = %e, "failed to update strategy");
                        result.errors.push(format!("Strategy update failed: {}", e));
                    }
                }
            }
        }

        info!(
            activities = decision.activities.len(),
            confidence,
            learning_saved = result.learning_saved,
            strategy_updated = result.strategy_updated,
            "activity decision processed"
        );
        result.decision = Some(decision);
        result
    }
}

/// First line of the notes, capped in length.
fn strategy_from_notes(notes: &str) -> String {
    let first = notes.lines().next().unwrap_or(notes).trim();
    first.chars().take(MAX_STRATEGY_CHARS).collect()
}
