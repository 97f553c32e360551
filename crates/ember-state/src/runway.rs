//! Runway tracking and urgency tiers.

use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, Timelike, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::StateError;
use crate::json_file::{read_json, write_json};

/// Runway strictly below this many days is critical.
pub const CRITICAL_BELOW_DAYS: f64 = 3.0;
/// Runway strictly below this many days is urgent.
pub const URGENT_BELOW_DAYS: f64 = 7.0;
/// Runway strictly below this many days is focused.
pub const FOCUSED_BELOW_DAYS: f64 = 14.0;

/// Persisted runway record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunwayState {
    pub runway_days: f64,
    pub last_updated: DateTime<Utc>,
}

/// How much pressure the remaining runway puts on the agent.
///
/// Ordered from most to least pressing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UrgencyLevel {
    Critical,
    Urgent,
    Focused,
    Comfortable,
}

impl UrgencyLevel {
    /// Map runway days to a tier. Boundaries are exclusive: exactly 3 days is
    /// urgent, not critical.
    pub fn from_runway_days(days: f64) -> Self {
        if days < CRITICAL_BELOW_DAYS {
            UrgencyLevel::Critical
        } else if days < URGENT_BELOW_DAYS {
            UrgencyLevel::Urgent
        } else if days < FOCUSED_BELOW_DAYS {
            UrgencyLevel::Focused
        } else {
            UrgencyLevel::Comfortable
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UrgencyLevel::Critical => "critical",
            UrgencyLevel::Urgent => "urgent",
            UrgencyLevel::Focused => "focused",
            UrgencyLevel::Comfortable => "comfortable",
        }
    }
}

impl fmt::Display for UrgencyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static runway configuration.
#[derive(Debug, Clone)]
pub struct RunwayConfig {
    /// Runway assumed when no record exists yet.
    pub initial_runway_days: f64,
    /// Local calendar date of day 1.
    pub start_date: NaiveDate,
    /// Length of the project in days.
    pub total_days: u32,
    /// Offset used to decide the local calendar day and hour.
    pub utc_offset: FixedOffset,
}

/// Point-in-time runway snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunwayStatus {
    /// 1-indexed day of the project.
    pub current_day: u32,
    pub days_remaining: u32,
    pub runway_days: f64,
    pub urgency: UrgencyLevel,
    /// No runway record exists yet.
    pub fresh_start: bool,
}

/// Result of charging elapsed time against the runway.
#[derive(Debug, Clone, PartialEq)]
pub struct RunwayBurn {
    pub previous_days: f64,
    pub current_days: f64,
    pub previous_urgency: UrgencyLevel,
    pub urgency: UrgencyLevel,
}

impl RunwayBurn {
    pub fn tier_changed(&self) -> bool {
        self.previous_urgency != self.urgency
    }
}

/// Anything that can produce a runway snapshot.
#[async_trait]
pub trait RunwaySource: Send + Sync {
    async fn runway_status(&self) -> Result<RunwayStatus, StateError>;
}

/// Reads and writes `runway.json`.
pub struct RunwayTracker {
    path: PathBuf,
    config: RunwayConfig,
}

impl RunwayTracker {
    pub fn new(data_dir: &Path, config: RunwayConfig) -> Self {
        Self {
            path: data_dir.join("runway.json"),
            config,
        }
    }

    /// Load the persisted record, if any.
    pub async fn load(&self) -> Result<Option<RunwayState>, StateError> {
        read_json(&self.path).await
    }

    /// Persisted runway, or the configured initial value on a fresh start.
    pub async fn get_runway_days(&self) -> Result<f64, StateError> {
        Ok(self
            .load()
            .await?
            .map(|s| s.runway_days)
            .unwrap_or(self.config.initial_runway_days))
    }

    /// Overwrite the runway and timestamp it.
    pub async fn update_runway_days(&self, days: f64) -> Result<RunwayState, StateError> {
        self.write_at(days, Utc::now()).await
    }

    async fn write_at(&self, days: f64, now: DateTime<Utc>) -> Result<RunwayState, StateError> {
        if !days.is_finite() || days < 0.0 {
            return Err(StateError::InvalidValue(format!(
                "runway days must be a non-negative number, got {}",
                days
            )));
        }

        let state = RunwayState {
            runway_days: days,
            last_updated: now,
        };
        write_json(&self.path, &state).await?;
        info!(runway_days = days, "runway updated");
        Ok(state)
    }

    /// 1-indexed project day for a moment in time. Never below 1.
    pub fn current_day_at(&self, now: DateTime<Utc>) -> u32 {
        let local_date = now.with_timezone(&self.config.utc_offset).date_naive();
        let elapsed = (local_date - self.config.start_date).num_days();
        (elapsed + 1).max(1) as u32
    }

    /// Local hour of day for a moment in time.
    pub fn local_hour_at(&self, now: DateTime<Utc>) -> u32 {
        now.with_timezone(&self.config.utc_offset).hour()
    }

    pub fn days_remaining(&self, current_day: u32) -> u32 {
        (self.config.total_days as i64 - current_day as i64 + 1).max(0) as u32
    }

    /// Runway snapshot at a given moment.
    pub async fn status_at(&self, now: DateTime<Utc>) -> Result<RunwayStatus, StateError> {
        let state = self.load().await?;
        let fresh_start = state.is_none();
        let runway_days = state
            .map(|s| s.runway_days)
            .unwrap_or(self.config.initial_runway_days);
        let current_day = self.current_day_at(now);

        Ok(RunwayStatus {
            current_day,
            days_remaining: self.days_remaining(current_day),
            runway_days,
            urgency: UrgencyLevel::from_runway_days(runway_days),
            fresh_start,
        })
    }

    /// Runway snapshot now.
    pub async fn get_runway_status(&self) -> Result<RunwayStatus, StateError> {
        self.status_at(Utc::now()).await
    }

    /// Charge wall-clock time since the last update against the runway.
    ///
    /// On a fresh start the initial runway is persisted and nothing is charged.
    pub async fn burn_elapsed(&self, now: DateTime<Utc>) -> Result<RunwayBurn, StateError> {
        let Some(state) = self.load().await? else {
            let initial = self.config.initial_runway_days;
            self.write_at(initial, now).await?;
            let urgency = UrgencyLevel::from_runway_days(initial);
            return Ok(RunwayBurn {
                previous_days: initial,
                current_days: initial,
                previous_urgency: urgency,
                urgency,
            });
        };

        let elapsed_days = ((now - state.last_updated).num_seconds().max(0)) as f64 / 86_400.0;
        let current = (state.runway_days - elapsed_days).max(0.0);
        self.write_at(current, now).await?;

        let burn = RunwayBurn {
            previous_days: state.runway_days,
            current_days: current,
            previous_urgency: UrgencyLevel::from_runway_days(state.runway_days),
            urgency: UrgencyLevel::from_runway_days(current),
        };
        if burn.tier_changed() {
            warn!(
                from = %burn.previous_urgency,
                to = %burn.urgency,
                runway_days = current,
                "urgency tier changed"
            );
        }
        Ok(burn)
    }
}

#[async_trait]
impl RunwaySource for RunwayTracker {
    async fn runway_status(&self) -> Result<RunwayStatus, StateError> {
        self.get_runway_status().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use proptest::prelude::*;
    use tempfile::tempdir;
    use test_case::test_case;

    fn config() -> RunwayConfig {
        RunwayConfig {
            initial_runway_days: 30.0,
            start_date: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
            total_days: 30,
            utc_offset: FixedOffset::east_opt(0).unwrap(),
        }
    }

    #[test_case(0.0, UrgencyLevel::Critical)]
    #[test_case(2.99, UrgencyLevel::Critical)]
    #[test_case(3.0, UrgencyLevel::Urgent)]
    #[test_case(6.99, UrgencyLevel::Urgent)]
    #[test_case(7.0, UrgencyLevel::Focused)]
    #[test_case(13.99, UrgencyLevel::Focused)]
    #[test_case(14.0, UrgencyLevel::Comfortable)]
    #[test_case(365.0, UrgencyLevel::Comfortable)]
    fn urgency_boundaries(days: f64, expected: UrgencyLevel) {
        assert_eq!(UrgencyLevel::from_runway_days(days), expected);
    }

    proptest! {
        // Less runway never means less urgency
        #[test]
        fn urgency_is_non_increasing_in_runway(a in 0.0f64..100.0, b in 0.0f64..100.0) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(UrgencyLevel::from_runway_days(lo) <= UrgencyLevel::from_runway_days(hi));
        }
    }

    #[tokio::test]
    async fn fresh_start_uses_initial_runway() {
        let dir = tempdir().unwrap();
        let tracker = RunwayTracker::new(dir.path(), config());

        assert_eq!(tracker.get_runway_days().await.unwrap(), 30.0);
        let status = tracker.get_runway_status().await.unwrap();
        assert!(status.fresh_start);
        assert_eq!(status.urgency, UrgencyLevel::Comfortable);
    }

    #[tokio::test]
    async fn update_persists_and_timestamps() {
        let dir = tempdir().unwrap();
        let tracker = RunwayTracker::new(dir.path(), config());

        let before = Utc::now();
        let state = tracker.update_runway_days(5.5).await.unwrap();
        assert!(state.last_updated >= before);

        let reloaded = RunwayTracker::new(dir.path(), config());
        assert_eq!(reloaded.get_runway_days().await.unwrap(), 5.5);
        let status = reloaded.get_runway_status().await.unwrap();
        assert!(!status.fresh_start);
        assert_eq!(status.urgency, UrgencyLevel::Urgent);
    }

    #[tokio::test]
    async fn update_rejects_negative_and_nan() {
        let dir = tempdir().unwrap();
        let tracker = RunwayTracker::new(dir.path(), config());

        assert!(tracker.update_runway_days(-1.0).await.is_err());
        assert!(tracker.update_runway_days(f64::NAN).await.is_err());
        assert!(tracker.load().await.unwrap().is_none());
    }

    #[test]
    fn current_day_is_one_indexed_and_clamped() {
        let dir = tempdir().unwrap();
        let tracker = RunwayTracker::new(dir.path(), config());

        let day1 = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        assert_eq!(tracker.current_day_at(day1), 1);
        assert_eq!(tracker.current_day_at(day1 + Duration::hours(23)), 1);
        assert_eq!(tracker.current_day_at(day1 + Duration::days(4)), 5);
        // Before the start date
        assert_eq!(tracker.current_day_at(day1 - Duration::days(3)), 1);
    }

    #[test]
    fn current_day_respects_utc_offset() {
        let dir = tempdir().unwrap();
        let mut cfg = config();
        cfg.utc_offset = FixedOffset::west_opt(5 * 3600).unwrap();
        let tracker = RunwayTracker::new(dir.path(), cfg);

        // 03:00 UTC on March 2 is still March 1 at UTC-5
        let t = Utc.with_ymd_and_hms(2026, 3, 2, 3, 0, 0).unwrap();
        assert_eq!(tracker.current_day_at(t), 1);
        assert_eq!(tracker.local_hour_at(t), 22);
    }

    #[test]
    fn days_remaining_never_negative() {
        let dir = tempdir().unwrap();
        let tracker = RunwayTracker::new(dir.path(), config());

        assert_eq!(tracker.days_remaining(1), 30);
        assert_eq!(tracker.days_remaining(30), 1);
        assert_eq!(tracker.days_remaining(31), 0);
        assert_eq!(tracker.days_remaining(90), 0);
    }

    #[tokio::test]
    async fn burn_charges_elapsed_time() {
        let dir = tempdir().unwrap();
        let tracker = RunwayTracker::new(dir.path(), config());

        let t0 = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        let first = tracker.burn_elapsed(t0).await.unwrap();
        assert_eq!(first.current_days, 30.0);

        let burn = tracker.burn_elapsed(t0 + Duration::hours(12)).await.unwrap();
        assert_eq!(burn.previous_days, 30.0);
        assert!((burn.current_days - 29.5).abs() < 1e-9);
        assert!(!burn.tier_changed());
    }

    #[tokio::test]
    async fn burn_never_goes_below_zero_and_reports_tier_change() {
        let dir = tempdir().unwrap();
        let tracker = RunwayTracker::new(dir.path(), config());

        let t0 = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        tracker.write_at(3.5, t0).await.unwrap();

        let burn = tracker.burn_elapsed(t0 + Duration::days(10)).await.unwrap();
        assert_eq!(burn.current_days, 0.0);
        assert_eq!(burn.previous_urgency, UrgencyLevel::Urgent);
        assert_eq!(burn.urgency, UrgencyLevel::Critical);
        assert!(burn.tier_changed());
    }
}
