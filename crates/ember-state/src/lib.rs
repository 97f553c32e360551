//! Durable local state for Ember.
//!
//! Files under the data directory are the source of truth:
//!
//! - `runway.json` - remaining compute budget in days
//! - `metrics.json` - shipped count, revenue, current strategy
//! - `health.json` - process heartbeat and shutdown marker
//! - `landing.json` - latest aggregate status for the public site
//! - `content/` - hourly updates, daily journals and reviews
//!
//! Writes go through a temp file and rename, so readers never see a torn
//! file. There is no cross-process locking: two concurrent writers of the
//! same file can still lose an update.

mod content;
mod error;
mod health;
mod json_file;
mod metrics;
mod runway;

pub use content::{
    ContentMetadata, ContentStore, FileContentStore, HourlyRecord, JournalRecord, LandingRecord,
    ReviewKind, ReviewRecord, word_count,
};
pub use error::StateError;
pub use health::{HealthMonitor, HealthRecord};
pub use metrics::{DEFAULT_STRATEGY, Metrics, MetricsSource, MetricsStore, MetricsUpdate};
pub use runway::{
    RunwayBurn, RunwayConfig, RunwaySource, RunwayState, RunwayStatus, RunwayTracker,
    UrgencyLevel,
};
