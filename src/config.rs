use crate::gate::{budget, cache, circuit, GateSettings};
use std::env;
use std::time::Duration;

pub const DEFAULT_GRAPHQL_URL: &str = "https://api-op.grid.gg/central-data/graphql";

/// Synthetic failure injected before the POST, for resilience drills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FaultMode {
    #[default]
    None,
    /// Behave as if GRID answered 429.
    RateLimited,
    /// Behave as if the TLS stream hit EOF.
    Eof,
}

impl FaultMode {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "429" => FaultMode::RateLimited,
            "EOF" => FaultMode::Eof,
            _ => FaultMode::None,
        }
    }
}

/// Runtime configuration for the GRID client and its gate.
/// Values are sourced from environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: String,
    pub graphql_url: String,
    pub user_agent: String,
    pub timeout_secs: u64,
    pub fault_mode: FaultMode,
    pub gate: GateSettings,
    pub run_budget: Option<u32>,
}

impl Config {
    /// Configuration pointing at `graphql_url` with default limits.
    pub fn new(api_key: impl Into<String>, graphql_url: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            graphql_url: graphql_url.into(),
            user_agent: default_user_agent(),
            timeout_secs: 30,
            fault_mode: FaultMode::None,
            gate: GateSettings::default(),
            run_budget: None,
        }
    }

    /// Load configuration from environment.
    ///
    /// Env vars:
    /// - GRID_API_KEY [required]
    /// - GRID_GRAPHQL_URL (default: https://api-op.grid.gg/central-data/graphql)
    /// - GRID_HTTP_TIMEOUT_SECS (default: 30)
    /// - GRID_USER_AGENT (default: grid-gate/<version>)
    /// - GRID_FAULT_MODE (NONE | 429 | EOF, default: NONE)
    /// - GRID_RATE_MAX_REQUESTS (default: 15)
    /// - GRID_RATE_WINDOW_SECS (default: 60)
    /// - GRID_CIRCUIT_OPEN_SECS (default: 600)
    /// - GRID_CACHE_TTL_SECS (default: 300)
    /// - GRID_RUN_BUDGET (per tool call; unset means unlimited)
    pub fn from_env() -> Result<Self, String> {
        let api_key = env::var("GRID_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| "Missing GRID_API_KEY".to_string())?;

        let graphql_url =
            env::var("GRID_GRAPHQL_URL").unwrap_or_else(|_| DEFAULT_GRAPHQL_URL.to_string());
        url::Url::parse(&graphql_url)
            .map_err(|e| format!("Invalid GRID_GRAPHQL_URL {graphql_url:?}: {e}"))?;

        let user_agent = env::var("GRID_USER_AGENT").unwrap_or_else(|_| default_user_agent());
        let fault_mode = env::var("GRID_FAULT_MODE")
            .map(|s| FaultMode::parse(&s))
            .unwrap_or_default();

        let gate = GateSettings {
            max_requests: env_num("GRID_RATE_MAX_REQUESTS")?.unwrap_or(budget::DEFAULT_MAX_REQUESTS),
            window: env_secs("GRID_RATE_WINDOW_SECS")?.unwrap_or(budget::DEFAULT_WINDOW),
            open_for: env_secs("GRID_CIRCUIT_OPEN_SECS")?.unwrap_or(circuit::DEFAULT_OPEN_FOR),
            cache_ttl: env_secs("GRID_CACHE_TTL_SECS")?.unwrap_or(cache::DEFAULT_TTL),
        };

        Ok(Self {
            api_key,
            graphql_url,
            user_agent,
            timeout_secs: env_num("GRID_HTTP_TIMEOUT_SECS")?.unwrap_or(30),
            fault_mode,
            gate,
            run_budget: env_num("GRID_RUN_BUDGET")?,
        })
    }
}

fn default_user_agent() -> String {
    format!("grid-gate/{}", env!("CARGO_PKG_VERSION"))
}

fn env_num<T: std::str::FromStr>(name: &str) -> Result<Option<T>, String> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| format!("{name} must be a non-negative integer, got {raw:?}")),
        Err(_) => Ok(None),
    }
}

fn env_secs(name: &str) -> Result<Option<Duration>, String> {
    Ok(env_num::<u64>(name)?.map(Duration::from_secs))
}
