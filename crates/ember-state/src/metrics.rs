//! Shipped/revenue/strategy counters.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use ember_remote::{MemoryMetadata, MemoryStore};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::StateError;
use crate::json_file::{read_json, write_json};

/// Strategy used until the agent picks one.
pub const DEFAULT_STRATEGY: &str = "Exploring opportunities";

/// The persisted metrics record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metrics {
    pub things_shipped: u64,
    pub revenue_total: f64,
    pub current_strategy: String,
    #[serde(default)]
    pub key_metrics: BTreeMap<String, Value>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self {
            things_shipped: 0,
            revenue_total: 0.0,
            current_strategy: DEFAULT_STRATEGY.to_string(),
            key_metrics: BTreeMap::new(),
        }
    }
}

/// Partial update. `None` fields are left alone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricsUpdate {
    pub things_shipped: Option<u64>,
    pub revenue_total: Option<f64>,
    pub current_strategy: Option<String>,
    /// Shallow-merged into the existing map.
    pub key_metrics: Option<BTreeMap<String, Value>>,
}

impl MetricsUpdate {
    pub fn strategy(strategy: impl Into<String>) -> Self {
        Self {
            current_strategy: Some(strategy.into()),
            ..Default::default()
        }
    }

    pub fn key_metric(key: impl Into<String>, value: impl Into<Value>) -> Self {
        let mut map = BTreeMap::new();
        map.insert(key.into(), value.into());
        Self {
            key_metrics: Some(map),
            ..Default::default()
        }
    }

    fn validate(&self) -> Result<(), StateError> {
        match self.revenue_total {
            Some(revenue) if !revenue.is_finite() || revenue < 0.0 => {
                Err(StateError::InvalidValue(format!(
                    "revenue total must be a non-negative number, got {}",
                    revenue
                )))
            }
            _ => Ok(()),
        }
    }
}

impl Metrics {
    /// Apply a partial update: scalars replace, key metrics merge.
    pub fn merge(&mut self, update: MetricsUpdate) {
        if let Some(shipped) = update.things_shipped {
            self.things_shipped = shipped;
        }
        if let Some(revenue) = update.revenue_total {
            self.revenue_total = revenue;
        }
        if let Some(strategy) = update.current_strategy {
            self.current_strategy = strategy;
        }
        if let Some(key_metrics) = update.key_metrics {
            self.key_metrics.extend(key_metrics);
        }
    }

    fn to_memory_metadata(&self) -> MemoryMetadata {
        let mut metadata = MemoryMetadata::new();
        metadata.insert("type".to_string(), Value::from("metrics"));
        metadata.insert("things_shipped".to_string(), Value::from(self.things_shipped));
        metadata.insert("revenue_total".to_string(), Value::from(self.revenue_total));
        metadata.insert(
            "current_strategy".to_string(),
            Value::from(self.current_strategy.clone()),
        );
        metadata
    }
}

/// Read access plus the one write the decision pipeline needs.
#[async_trait]
pub trait MetricsSource: Send + Sync {
    async fn metrics(&self) -> Result<Metrics, StateError>;
    async fn set_strategy(&self, strategy: &str) -> Result<Metrics, StateError>;
}

/// Write-through cache over `metrics.json`.
///
/// The first read loads from disk. The cache is dropped when the file's
/// modification time changes, so updates made by another process (the
/// operator subcommands) are picked up. Every update persists before
/// returning, then mirrors the full record to the memory store if one is
/// attached. Mirror failures are logged and otherwise ignored.
pub struct MetricsStore {
    path: PathBuf,
    cache: Mutex<Option<Cached>>,
    mirror: Option<Arc<dyn MemoryStore>>,
}

struct Cached {
    metrics: Metrics,
    modified: Option<SystemTime>,
}

impl MetricsStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join("metrics.json"),
            cache: Mutex::new(None),
            mirror: None,
        }
    }

    /// Mirror every update to a memory store.
    pub fn with_mirror(mut self, mirror: Arc<dyn MemoryStore>) -> Self {
        self.mirror = Some(mirror);
        self
    }

    async fn modified(&self) -> Option<SystemTime> {
        tokio::fs::metadata(&self.path)
            .await
            .and_then(|m| m.modified())
            .ok()
    }

    async fn load_into(&self, cache: &mut Option<Cached>) -> Result<Metrics, StateError> {
        let modified = self.modified().await;
        if let Some(cached) = cache.as_ref() {
            if cached.modified == modified {
                return Ok(cached.metrics.clone());
            }
        }
        let metrics = read_json::<Metrics>(&self.path).await?.unwrap_or_default();
        debug!(path = %self.path.display(), "metrics loaded");
        *cache = Some(Cached {
            metrics: metrics.clone(),
            modified,
        });
        Ok(metrics)
    }

    pub async fn get_metrics(&self) -> Result<Metrics, StateError> {
        let mut cache = self.cache.lock().await;
        self.load_into(&mut cache).await
    }

    pub async fn update_metrics(&self, update: MetricsUpdate) -> Result<Metrics, StateError> {
        self.update_with(|_| update).await
    }

    /// Read-modify-write under the cache lock.
    ///
    /// `build` sees the current record and returns the update to apply, so
    /// concurrent increments never lose a write.
    pub async fn update_with<F>(&self, build: F) -> Result<Metrics, StateError>
    where
        F: FnOnce(&Metrics) -> MetricsUpdate + Send,
    {
        let updated = {
            let mut cache = self.cache.lock().await;
            let mut metrics = self.load_into(&mut cache).await?;
            let update = build(&metrics);
            update.validate()?;
            metrics.merge(update);
            write_json(&self.path, &metrics).await?;
            *cache = Some(Cached {
                metrics: metrics.clone(),
                modified: self.modified().await,
            });
            metrics
        };

        info!(
            things_shipped = updated.things_shipped,
            revenue_total = updated.revenue_total,
            strategy = %updated.current_strategy,
            "metrics updated"
        );

        if let Some(mirror) = &self.mirror {
            let summary = format!(
                "Metrics: {} shipped, ${:.2} revenue, strategy: {}",
                updated.things_shipped, updated.revenue_total, updated.current_strategy
            );
            if let Err(e) = mirror.create(&summary, &updated.to_memory_metadata()).await {
                warn!(error = %e, "failed to mirror metrics to memory store");
            }
        }

        Ok(updated)
    }

    pub async fn increment_shipped(&self) -> Result<Metrics, StateError> {
        self.update_with(|current| MetricsUpdate {
            things_shipped: Some(current.things_shipped + 1),
            ..Default::default()
        })
        .await
    }

    pub async fn set_strategy(&self, strategy: &str) -> Result<Metrics, StateError> {
        self.update_metrics(MetricsUpdate::strategy(strategy)).await
    }

    /// Set one entry in the key metrics map.
    pub async fn set_key_metric(
        &self,
        key: &str,
        value: impl Into<Value>,
    ) -> Result<Metrics, StateError> {
        self.update_metrics(MetricsUpdate::key_metric(key, value)).await
    }

    /// Add to the revenue total.
    pub async fn record_revenue(&self, amount: f64) -> Result<Metrics, StateError> {
        if !amount.is_finite() || amount < 0.0 {
            return Err(StateError::InvalidValue(format!(
                "revenue amount must be a non-negative number, got {}",
                amount
            )));
        }
        self.update_with(|current| MetricsUpdate {
            revenue_total: Some(current.revenue_total + amount),
            ..Default::default()
        })
        .await
    }
}

#[async_trait]
impl MetricsSource for MetricsStore {
    async fn metrics(&self) -> Result<Metrics, StateError> {
        self.get_metrics().await
    }

    async fn set_strategy(&self, strategy: &str) -> Result<Metrics, StateError> {
        MetricsStore::set_strategy(self, strategy).await
    }
}
