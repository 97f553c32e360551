//! Process heartbeat record.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::StateError;
use crate::json_file::{read_json, write_json};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthRecord {
    pub pid: u32,
    pub started_at: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shutdown_at: Option<DateTime<Utc>>,
}

/// Writes `health.json` for external liveness checks.
pub struct HealthMonitor {
    path: PathBuf,
    pid: u32,
    started_at: DateTime<Utc>,
}

impl HealthMonitor {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join("health.json"),
            pid: std::process::id(),
            started_at: Utc::now(),
        }
    }

    fn record(&self, now: DateTime<Utc>, shutdown_at: Option<DateTime<Utc>>) -> HealthRecord {
        HealthRecord {
            pid: self.pid,
            started_at: self.started_at,
            last_update: now,
            shutdown_at,
        }
    }

    /// Write a fresh record, clearing any previous shutdown marker.
    pub async fn mark_started(&self) -> Result<HealthRecord, StateError> {
        let record = self.record(self.started_at, None);
        write_json(&self.path, &record).await?;
        info!(pid = self.pid, "health record initialised");
        Ok(record)
    }

    pub async fn heartbeat(&self) -> Result<HealthRecord, StateError> {
        let record = self.record(Utc::now(), None);
        write_json(&self.path, &record).await?;
        Ok(record)
    }

    pub async fn mark_shutdown(&self) -> Result<HealthRecord, StateError> {
        let now = Utc::now();
        let record = self.record(now, Some(now));
        write_json(&self.path, &record).await?;
        info!(pid = self.pid, "shutdown recorded");
        Ok(record)
    }

    pub async fn load(&self) -> Result<Option<HealthRecord>, StateError> {
        read_json(&self.path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn lifecycle() {
        let dir = tempdir().unwrap();
        let monitor = HealthMonitor::new(dir.path());

        assert!(monitor.load().await.unwrap().is_none());

        let started = monitor.mark_started().await.unwrap();
        assert_eq!(started.pid, std::process::id());
        assert!(started.shutdown_at.is_none());

        let beat = monitor.heartbeat().await.unwrap();
        assert_eq!(beat.started_at, started.started_at);
        assert!(beat.last_update >= started.last_update);

        monitor.mark_shutdown().await.unwrap();
        let stored = monitor.load().await.unwrap().unwrap();
        assert!(stored.shutdown_at.is_some());
    }

    #[tokio::test]
    async fn shutdown_marker_serialises_camel_case() {
        let dir = tempdir().unwrap();
        let monitor = HealthMonitor::new(dir.path());
        monitor.mark_shutdown().await.unwrap();

        let raw = std::fs::read_to_string(dir.path().join("health.json")).unwrap();
        assert!(raw.contains("\"shutdownAt\""));
        assert!(raw.contains("\"startedAt\""));
        assert!(raw.contains("\"lastUpdate\""));
    }
}
