//! Command-line configuration and service wiring.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{FixedOffset, NaiveDate};
use clap::Args;
use ember_agent::Services;
use ember_llm::{AnthropicConfig, AnthropicTransport, CompletionClient};
use ember_remote::{DeployTrigger, DisabledMemory, HttpDeployTransport, MemoryClient, MemoryStore};
use ember_state::{FileContentStore, HealthMonitor, MetricsStore, RunwayConfig, RunwayTracker};
use miette::Result;
use tracing::warn;

/// Parse a UTC offset such as `+05:30`, `-08:00`, `+0200` or `Z`.
pub fn parse_utc_offset(s: &str) -> Result<FixedOffset, String> {
    let s = s.trim();
    if s.eq_ignore_ascii_case("z") || s.eq_ignore_ascii_case("utc") {
        return FixedOffset::east_opt(0).ok_or_else(|| "invalid offset".to_string());
    }

    let (sign, rest) = match s.as_bytes().first() {
        Some(b'+') => (1, &s[1..]),
        Some(b'-') => (-1, &s[1..]),
        _ => return Err(format!("offset '{}' must start with + or -", s)),
    };
    let digits: String = rest.chars().filter(|c| *c != ':').collect();
    if digits.len() != 4 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(format!("offset '{}' must look like +HH:MM", s));
    }

    let hours: i32 = digits[..2].parse().map_err(|_| format!("bad hours in '{}'", s))?;
    let minutes: i32 = digits[2..].parse().map_err(|_| format!("bad minutes in '{}'", s))?;
    if hours > 23 || minutes > 59 {
        return Err(format!("offset '{}' is out of range", s));
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
        .ok_or_else(|| format!("offset '{}' is out of range", s))
}

/// Parse a key metric value given on the command line.
///
/// Numbers and booleans keep their JSON type; anything else is a string.
pub fn parse_metric_value(raw: &str) -> serde_json::Value {
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(value @ (serde_json::Value::Number(_) | serde_json::Value::Bool(_))) => value,
        _ => serde_json::Value::from(raw),
    }
}

/// Local state settings shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct StateArgs {
    /// First day of the project (YYYY-MM-DD, local time)
    #[arg(long, env = "EMBER_START_DATE")]
    pub start_date: NaiveDate,

    /// UTC offset used for local days and hours
    #[arg(
        long,
        env = "EMBER_UTC_OFFSET",
        default_value = "+00:00",
        value_parser = parse_utc_offset,
        allow_hyphen_values = true
    )]
    pub utc_offset: FixedOffset,

    /// Runway assumed before any runway record exists
    #[arg(long, env = "EMBER_INITIAL_RUNWAY_DAYS", default_value = "30")]
    pub initial_runway_days: f64,

    /// Length of the project in days
    #[arg(long, env = "EMBER_TOTAL_DAYS", default_value = "30")]
    pub total_days: u32,

    /// Directory for local state (defaults to the platform data dir)
    #[arg(long, env = "EMBER_DATA_DIR")]
    pub data_dir: Option<PathBuf>,
}

impl StateArgs {
    pub fn data_dir(&self) -> Result<PathBuf> {
        match &self.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => dirs::data_dir()
                .map(|d| d.join("ember"))
                .ok_or_else(|| miette::miette!("no data directory available, pass --data-dir")),
        }
    }

    pub fn runway_config(&self) -> RunwayConfig {
        RunwayConfig {
            initial_runway_days: self.initial_runway_days,
            start_date: self.start_date,
            total_days: self.total_days,
            utc_offset: self.utc_offset,
        }
    }

    pub fn runway_tracker(&self) -> Result<RunwayTracker> {
        Ok(RunwayTracker::new(&self.data_dir()?, self.runway_config()))
    }
}

/// Remote service settings for subcommands that call out.
#[derive(Args, Debug, Clone)]
pub struct ServiceArgs {
    /// Anthropic API key
    #[arg(long, env = "ANTHROPIC_API_KEY", hide_env_values = true)]
    pub anthropic_api_key: String,

    /// Model identifier
    #[arg(long, env = "EMBER_MODEL", default_value = "claude-sonnet-4-5")]
    pub model: String,

    /// Max tokens per completion
    #[arg(long, env = "EMBER_MAX_TOKENS", default_value = "4096")]
    pub max_tokens: u32,

    /// Anthropic API base URL
    #[arg(
        long,
        env = "EMBER_ANTHROPIC_BASE_URL",
        default_value = "https://api.anthropic.com"
    )]
    pub anthropic_base_url: String,

    /// Memory service API key; mirroring is disabled without it
    #[arg(long, env = "EMBER_MEMORY_API_KEY", hide_env_values = true)]
    pub memory_api_key: Option<String>,

    /// Memory service base URL
    #[arg(long, env = "EMBER_MEMORY_URL", default_value = "https://api.supermemory.ai")]
    pub memory_url: String,

    /// Site rebuild webhook
    #[arg(long, env = "EMBER_DEPLOY_HOOK_URL")]
    pub deploy_hook_url: Option<String>,
}

/// Build the shared services from configuration.
pub fn build_services(service: &ServiceArgs, state: &StateArgs) -> Result<Services> {
    let data_dir = state.data_dir()?;

    let transport = AnthropicTransport::new(
        AnthropicConfig::new(&service.anthropic_api_key, &service.model)
            .with_base_url(&service.anthropic_base_url)
            .with_max_tokens(service.max_tokens),
    );

    let memory: Arc<dyn MemoryStore> = match &service.memory_api_key {
        Some(key) if !key.is_empty() => Arc::new(MemoryClient::new(&service.memory_url, key)),
        _ => {
            warn!("memory API key not set, memory mirroring disabled");
            Arc::new(DisabledMemory)
        }
    };

    if service.deploy_hook_url.is_none() {
        warn!("deploy hook URL not set, deploys will be skipped");
    }
    let deployer = DeployTrigger::new(
        Arc::new(HttpDeployTransport::new()),
        service.deploy_hook_url.clone(),
    );

    Ok(Services {
        llm: CompletionClient::new(Arc::new(transport)),
        memory: memory.clone(),
        deployer: Arc::new(deployer),
        content: Arc::new(FileContentStore::new(&data_dir)),
        runway: Arc::new(RunwayTracker::new(&data_dir, state.runway_config())),
        metrics: Arc::new(MetricsStore::new(&data_dir).with_mirror(memory)),
        health: Arc::new(HealthMonitor::new(&data_dir)),
    })
}
