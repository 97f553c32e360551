//! Completion-service client for Ember.
//!
//! This crate provides:
//! - A [`CompletionTransport`] seam for the single network call
//! - An Anthropic Messages API transport over `reqwest`
//! - A [`CompletionClient`] that adds bounded retry, exponential backoff and
//!   rate-limit classification on top of any transport

mod anthropic;
mod client;
mod error;
mod types;

pub use anthropic::{AnthropicConfig, AnthropicTransport};
pub use client::{CompletionClient, DEFAULT_BASE_DELAY, MAX_ATTEMPTS};
pub use error::{CompletionError, TransportError};
pub use types::{CompletionRequest, CompletionResponse, CompletionTransport, Usage};
