// Publisher configuration: defaults, then YAML override, then environment.
use anyhow::{Context, Result};
use herald_transport::ExchangeKind;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::time::Duration;

pub(crate) const DEFAULT_MESSAGE_TIMEOUT_MS: u64 = 5_000;

/// Recognized publisher options. Validation of the target invariants
/// (exchange/routing-key presence, binding-argument exclusivity) happens in
/// `PublisherTarget::from_config`, not here.
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    /// Target exchange; absent means publish directly to the queue named by
    /// `routing_key` via the default exchange.
    pub exchange: Option<String>,
    /// Declared type when an exchange is configured.
    pub exchange_type: ExchangeKind,
    /// Routing key; mutually exclusive with `binding_args`.
    pub routing_key: Option<String>,
    /// Fixed header key/value set for header-exchange routing.
    pub binding_args: BTreeMap<String, String>,
    /// How long an unconfirmed publish waits before it is treated as failed.
    pub message_timeout: Duration,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            exchange: None,
            exchange_type: ExchangeKind::Topic,
            routing_key: None,
            binding_args: BTreeMap::new(),
            message_timeout: Duration::from_millis(DEFAULT_MESSAGE_TIMEOUT_MS),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
struct PublisherConfigOverride {
    exchange: Option<String>,
    exchange_type: Option<ExchangeKind>,
    routing_key: Option<String>,
    binding_args: Option<BTreeMap<String, String>>,
    message_timeout_ms: Option<u64>,
}

impl PublisherConfig {
    /// Defaults layered with an optional YAML file and `HERALD_*` variables.
    /// The file path argument wins over `HERALD_PUBLISHER_CONFIG`.
    pub fn from_env_or_yaml(config_path: Option<&str>) -> Result<Self> {
        let mut config = Self::default();
        let override_path = config_path
            .map(|value| value.to_string())
            .or_else(|| std::env::var("HERALD_PUBLISHER_CONFIG").ok());
        if let Some(path) = override_path.as_deref() {
            let contents =
                fs::read_to_string(path).with_context(|| format!("read publisher config: {path}"))?;
            let override_cfg: PublisherConfigOverride =
                serde_yaml::from_str(&contents).context("parse publisher config yaml")?;
            override_cfg.apply(&mut config);
        }
        config.apply_env();
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Some(value) = read_string_env("HERALD_EXCHANGE") {
            self.exchange = Some(value);
        }
        if let Some(value) = read_string_env("HERALD_EXCHANGE_TYPE") {
            if let Some(kind) = ExchangeKind::parse(&value) {
                self.exchange_type = kind;
            }
        }
        if let Some(value) = read_string_env("HERALD_ROUTING_KEY") {
            self.routing_key = Some(value);
        }
        if let Some(value) = read_u64_env("HERALD_MESSAGE_TIMEOUT_MS") {
            self.message_timeout = Duration::from_millis(value);
        }
    }
}

impl PublisherConfigOverride {
    fn apply(&self, config: &mut PublisherConfig) {
        if let Some(value) = &self.exchange {
            config.exchange = Some(value.clone());
        }
        if let Some(value) = self.exchange_type {
            config.exchange_type = value;
        }
        if let Some(value) = &self.routing_key {
            config.routing_key = Some(value.clone());
        }
        if let Some(value) = &self.binding_args {
            config.binding_args = value.clone();
        }
        if let Some(value) = self.message_timeout_ms {
            if value > 0 {
                config.message_timeout = Duration::from_millis(value);
            }
        }
    }
}

fn read_string_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.is_empty())
}

fn read_u64_env(key: &str) -> Option<u64> {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .filter(|value| *value > 0)
}
