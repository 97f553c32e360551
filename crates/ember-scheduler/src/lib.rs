//! Wall-clock task scheduler for Ember.
//!
//! This crate provides a scheduler that:
//! - Registers named tasks against validated schedule descriptors
//! - Runs one independent timer per task on the UTC grid
//! - Isolates handler failures so one task never stops its siblings
//! - Drops ticks that arrive while the previous run is still in flight

mod error;
mod schedule;
mod scheduler;

pub use error::SchedulerError;
pub use schedule::Schedule;
pub use scheduler::{Scheduler, TaskFuture, TaskHandler, TaskStatus, task_handler};
