//! Core agent logic for Ember.
//!
//! This crate provides:
//! - Prompt templates and placeholder rendering
//! - Activity-decision parsing and validation
//! - The output processor that persists completion results
//! - The service container and the task runner built on it

mod agent;
mod decision;
mod error;
mod processor;
mod prompt;
mod services;

pub use agent::{Agent, TaskKind};
pub use decision::{
    Activity, ActivityDecision, ActivityType, mentions_strategy_change, parse_decision,
};
pub use error::{AgentError, DecisionError};
pub use processor::{ActivityResult, OutputProcessor, ProcessResult};
pub use prompt::{PromptBuilder, PromptContext, render};
pub use services::Services;
