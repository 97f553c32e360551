//! Shared service container.

use std::sync::Arc;

use ember_llm::CompletionClient;
use ember_remote::{Deployer, MemoryStore};
use ember_state::{ContentStore, HealthMonitor, MetricsStore, RunwayTracker};

use crate::OutputProcessor;

/// Every long-lived client and store, built once at startup and shared by
/// all task handlers.
#[derive(Clone)]
pub struct Services {
    pub llm: CompletionClient,
    pub memory: Arc<dyn MemoryStore>,
    pub deployer: Arc<dyn Deployer>,
    pub content: Arc<dyn ContentStore>,
    pub runway: Arc<RunwayTracker>,
    pub metrics: Arc<MetricsStore>,
    pub health: Arc<HealthMonitor>,
}

impl Services {
    /// An output processor over these services.
    pub fn processor(&self) -> OutputProcessor {
        OutputProcessor::new(
            self.content.clone(),
            self.memory.clone(),
            self.deployer.clone(),
            self.runway.clone(),
            self.metrics.clone(),
        )
    }
}
