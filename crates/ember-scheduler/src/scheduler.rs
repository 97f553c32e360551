//! Task scheduler implementation.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use tokio::sync::{Mutex, RwLock, watch};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::{Schedule, SchedulerError};

/// Future returned by a task handler.
pub type TaskFuture = Pin<Box<dyn Future<Output = Result<(), String>> + Send>>;

/// Type alias for a task handler function.
pub type TaskHandler = Arc<dyn Fn() -> TaskFuture + Send + Sync>;

/// Wrap an async closure as a [`TaskHandler`].
pub fn task_handler<F, Fut>(f: F) -> TaskHandler
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), String>> + Send + 'static,
{
    Arc::new(move || Box::pin(f()))
}

/// A registered task.
#[derive(Clone)]
struct ScheduledTask {
    name: String,
    schedule: Schedule,
    handler: TaskHandler,
    /// Set while a run is in flight; ticks arriving meanwhile are dropped.
    running: Arc<AtomicBool>,
}

/// Snapshot of a registered task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskStatus {
    pub name: String,
    pub schedule: Schedule,
    pub running: bool,
}

/// The task scheduler.
///
/// Each registered task gets its own timer once [`Scheduler::start`] is
/// called. Handlers are spawned onto the runtime, so a slow handler never
/// delays another task's timer.
pub struct Scheduler {
    tasks: Arc<RwLock<Vec<ScheduledTask>>>,
    timers: Mutex<Vec<JoinHandle<()>>>,
    shutdown_tx: watch::Sender<bool>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    /// Create a new scheduler with an empty registry.
    pub fn new() -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            tasks: Arc::new(RwLock::new(Vec::new())),
            timers: Mutex::new(Vec::new()),
            shutdown_tx,
        }
    }

    /// Register a task.
    ///
    /// An invalid schedule or a duplicate name is logged and the registry is
    /// left untouched.
    pub async fn register(
        &self,
        name: impl Into<String>,
        schedule: Schedule,
        handler: TaskHandler,
    ) -> Result<(), SchedulerError> {
        let name = name.into();

        if let Err(e) = schedule.validate() {
            error!(task = %name, error = %e, "rejected task with invalid schedule");
            return Err(e);
        }

        let mut tasks = self.tasks.write().await;
        if tasks.iter().any(|t| t.name == name) {
            error!(task = %name, "rejected duplicate task registration");
            return Err(SchedulerError::TaskExists(name));
        }

        info!(task = %name, schedule = %schedule, "registered task");
        tasks.push(ScheduledTask {
            name,
            schedule,
            handler,
            running: Arc::new(AtomicBool::new(false)),
        });
        Ok(())
    }

    /// Register a task from a cron-style expression (see [`Schedule`]'s `FromStr`).
    pub async fn register_expr(
        &self,
        name: impl Into<String>,
        expr: &str,
        handler: TaskHandler,
    ) -> Result<(), SchedulerError> {
        let name = name.into();
        match expr.parse::<Schedule>() {
            Ok(schedule) => self.register(name, schedule, handler).await,
            Err(e) => {
                error!(task = %name, error = %e, "rejected task with invalid schedule");
                Err(e)
            }
        }
    }

    /// Start one timer per registered task.
    pub async fn start(&self) {
        self.shutdown_tx.send_replace(false);

        let tasks = self.tasks.read().await.clone();
        let mut timers = self.timers.lock().await;
        for task in tasks {
            let shutdown_rx = self.shutdown_tx.subscribe();
            timers.push(tokio::spawn(run_timer(task, shutdown_rx)));
        }

        info!(count = timers.len(), "scheduler started");
    }

    /// Cancel every timer and clear the registry.
    ///
    /// Handler runs already in flight are not cancelled.
    pub async fn stop(&self) {
        self.shutdown_tx.send_replace(true);

        let mut timers = self.timers.lock().await;
        for timer in timers.drain(..) {
            timer.abort();
        }
        self.tasks.write().await.clear();

        info!("scheduler stopped");
    }

    /// List registered tasks.
    pub async fn status(&self) -> Vec<TaskStatus> {
        self.tasks
            .read()
            .await
            .iter()
            .map(|t| TaskStatus {
                name: t.name.clone(),
                schedule: t.schedule,
                running: t.running.load(Ordering::Acquire),
            })
            .collect()
    }

    /// Run a registered task once, now, and wait for it.
    ///
    /// Returns `Ok(false)` if the handler failed or a run was already in flight.
    pub async fn run_once(&self, name: &str) -> Result<bool, SchedulerError> {
        let task = self
            .tasks
            .read()
            .await
            .iter()
            .find(|t| t.name == name)
            .cloned()
            .ok_or_else(|| SchedulerError::TaskNotFound(name.to_string()))?;

        if task.running.swap(true, Ordering::AcqRel) {
            warn!(task = %task.name, "task already running");
            return Ok(false);
        }
        let ok = run_guarded(&task.name, &task.handler).await;
        task.running.store(false, Ordering::Release);
        Ok(ok)
    }
}

/// Timer loop for one task.
async fn run_timer(task: ScheduledTask, mut shutdown_rx: watch::Receiver<bool>) {
    let mut cursor = Utc::now();

    loop {
        let next = task.schedule.next_after(cursor);
        let wait = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        debug!(task = %task.name, next = %next, "timer armed");

        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    debug!(task = %task.name, "timer cancelled");
                    break;
                }
                continue;
            }
            _ = sleep(wait) => {}
        }

        cursor = next;
        fire(&task);
    }
}

/// Spawn a run of the task unless one is already in flight.
fn fire(task: &ScheduledTask) {
    if task.running.swap(true, Ordering::AcqRel) {
        warn!(task = %task.name, "previous run still in flight, dropping tick");
        return;
    }

    let name = task.name.clone();
    let handler = Arc::clone(&task.handler);
    let running = Arc::clone(&task.running);
    tokio::spawn(async move {
        run_guarded(&name, &handler).await;
        running.store(false, Ordering::Release);
    });
}

/// Run a handler, logging its duration and outcome.
///
/// Errors and panics are contained here; returns whether the run succeeded.
#[tracing::instrument(skip(handler))]
async fn run_guarded(task: &str, handler: &TaskHandler) -> bool {
    info!("task starting");
    let started = Instant::now();

    let outcome = tokio::spawn(handler()).await;
    let elapsed_ms = started.elapsed().as_millis() as u64;

    match outcome {
        Ok(Ok(())) => {
            info!(elapsed_ms, "task completed");
            true
        }
        Ok(Err(e)) => {
            error!(elapsed_ms, error = %e, "task failed");
            false
        }
        Err(e) => {
            error!(elapsed_ms, error = %e, "task panicked");
            false
        }
    }
}
