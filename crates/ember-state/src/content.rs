//! Local content records: hourly updates, journals, reviews, landing status.

use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ember_remote::MemoryMetadata;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::json_file::{read_json, write_json};
use crate::{Metrics, RunwayStatus, StateError, UrgencyLevel};

/// Whitespace-separated word count.
pub fn word_count(content: &str) -> usize {
    content.split_whitespace().count()
}

/// Metadata attached to every persisted content record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentMetadata {
    pub day: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hour: Option<u32>,
    pub timestamp: DateTime<Utc>,
    pub runway_days: f64,
    pub urgency: UrgencyLevel,
    pub current_strategy: String,
    #[serde(rename = "wordCount")]
    pub word_count: usize,
}

impl ContentMetadata {
    /// Build metadata for `content`. The word count is always derived here.
    pub fn new(
        content: &str,
        day: u32,
        hour: Option<u32>,
        timestamp: DateTime<Utc>,
        runway: &RunwayStatus,
        metrics: &Metrics,
    ) -> Self {
        Self {
            day,
            hour,
            timestamp,
            runway_days: runway.runway_days,
            urgency: runway.urgency,
            current_strategy: metrics.current_strategy.clone(),
            word_count: word_count(content),
        }
    }

    /// Flat metadata for the memory store, tagged with a record type.
    pub fn to_memory_metadata(&self, kind: &str) -> MemoryMetadata {
        let mut metadata = MemoryMetadata::new();
        metadata.insert("type".to_string(), Value::from(kind));
        metadata.insert("day".to_string(), Value::from(self.day));
        if let Some(hour) = self.hour {
            metadata.insert("hour".to_string(), Value::from(hour));
        }
        metadata.insert(
            "timestamp".to_string(),
            Value::from(self.timestamp.to_rfc3339()),
        );
        metadata.insert("runway_days".to_string(), Value::from(self.runway_days));
        metadata.insert("urgency".to_string(), Value::from(self.urgency.as_str()));
        metadata.insert(
            "current_strategy".to_string(),
            Value::from(self.current_strategy.clone()),
        );
        metadata.insert("wordCount".to_string(), Value::from(self.word_count));
        metadata
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyRecord {
    pub content: String,
    #[serde(flatten)]
    pub metadata: ContentMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalRecord {
    pub content: String,
    #[serde(flatten)]
    pub metadata: ContentMetadata,
    pub things_shipped: u64,
    pub revenue_total: f64,
}

/// Latest-wins aggregate consumed by the public site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LandingRecord {
    pub current_day: u32,
    pub days_remaining: u32,
    pub runway_days: f64,
    pub things_shipped: u64,
    pub revenue_total: f64,
    pub current_strategy: String,
    pub last_updated: DateTime<Utc>,
}

impl LandingRecord {
    pub fn new(runway: &RunwayStatus, metrics: &Metrics, now: DateTime<Utc>) -> Self {
        Self {
            current_day: runway.current_day,
            days_remaining: runway.days_remaining,
            runway_days: runway.runway_days,
            things_shipped: metrics.things_shipped,
            revenue_total: metrics.revenue_total,
            current_strategy: metrics.current_strategy.clone(),
            last_updated: now,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewKind {
    /// Daily goal review; period is the project day.
    Goals,
    /// Weekly review; period is the 1-indexed project week.
    Weekly,
}

impl ReviewKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewKind::Goals => "goals",
            ReviewKind::Weekly => "weekly",
        }
    }

    /// Memory-store record type.
    pub fn memory_type(&self) -> &'static str {
        match self {
            ReviewKind::Goals => "goal_review",
            ReviewKind::Weekly => "weekly_review",
        }
    }

    fn file_name(&self, period: u32) -> String {
        match self {
            ReviewKind::Goals => format!("goals-day-{:03}.json", period),
            ReviewKind::Weekly => format!("weekly-week-{:02}.json", period),
        }
    }
}

impl fmt::Display for ReviewKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewRecord {
    pub kind: ReviewKind,
    pub period: u32,
    pub content: String,
    #[serde(flatten)]
    pub metadata: ContentMetadata,
}

/// The authoritative local content store.
#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn save_hourly(&self, record: &HourlyRecord) -> Result<(), StateError>;
    async fn save_journal(&self, record: &JournalRecord) -> Result<(), StateError>;
    async fn save_review(&self, record: &ReviewRecord) -> Result<(), StateError>;
    async fn save_landing(&self, record: &LandingRecord) -> Result<(), StateError>;
}

/// JSON files under the data directory.
///
/// ```text
/// content/hourly/day-005-hour-10.json
/// content/journal/day-005.json
/// content/reviews/goals-day-005.json
/// content/reviews/weekly-week-02.json
/// landing.json
/// ```
///
/// Rewriting the same key replaces the previous record.
pub struct FileContentStore {
    root: PathBuf,
}

impl FileContentStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            root: data_dir.to_path_buf(),
        }
    }

    fn hourly_path(&self, day: u32, hour: u32) -> PathBuf {
        self.root
            .join("content/hourly")
            .join(format!("day-{:03}-hour-{:02}.json", day, hour))
    }

    fn journal_path(&self, day: u32) -> PathBuf {
        self.root
            .join("content/journal")
            .join(format!("day-{:03}.json", day))
    }

    fn review_path(&self, kind: ReviewKind, period: u32) -> PathBuf {
        self.root.join("content/reviews").join(kind.file_name(period))
    }

    fn landing_path(&self) -> PathBuf {
        self.root.join("landing.json")
    }

    pub async fn load_hourly(&self, day: u32, hour: u32) -> Result<Option<HourlyRecord>, StateError> {
        read_json(&self.hourly_path(day, hour)).await
    }

    pub async fn load_journal(&self, day: u32) -> Result<Option<JournalRecord>, StateError> {
        read_json(&self.journal_path(day)).await
    }

    pub async fn load_review(
        &self,
        kind: ReviewKind,
        period: u32,
    ) -> Result<Option<ReviewRecord>, StateError> {
        read_json(&self.review_path(kind, period)).await
    }

    pub async fn load_landing(&self) -> Result<Option<LandingRecord>, StateError> {
        read_json(&self.landing_path()).await
    }
}

#[async_trait]
impl ContentStore for FileContentStore {
    async fn save_hourly(&self, record: &HourlyRecord) -> Result<(), StateError> {
        let hour = record.metadata.hour.ok_or_else(|| {
            StateError::InvalidValue("hourly record is missing its hour".to_string())
        })?;
        let path = self.hourly_path(record.metadata.day, hour);
        write_json(&path, record).await?;
        debug!(path = %path.display(), "hourly record saved");
        Ok(())
    }

    async fn save_journal(&self, record: &JournalRecord) -> Result<(), StateError> {
        let path = self.journal_path(record.metadata.day);
        write_json(&path, record).await?;
        debug!(path = %path.display(), "journal record saved");
        Ok(())
    }

    async fn save_review(&self, record: &ReviewRecord) -> Result<(), StateError> {
        let path = self.review_path(record.kind, record.period);
        write_json(&path, record).await?;
        debug!(path = %path.display(), "review record saved");
        Ok(())
    }

    async fn save_landing(&self, record: &LandingRecord) -> Result<(), StateError> {
        write_json(&self.landing_path(), record).await
    }
}
