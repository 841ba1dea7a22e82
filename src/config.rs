//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Secrets (the gateway API key) are referenced by env-var name in the config
//! and resolved at runtime via `std::env::var`.

use anyhow::{Context, Result};
use secrecy::SecretString;
use serde::{Deserialize, Deserializer};
use std::fs;

use crate::types::{MintwatchError, Wei};

/// Upper bound on `purchase.workflow_timeout_seconds` (one year).
pub const MAX_WORKFLOW_TIMEOUT_SECS: u64 = 365 * 24 * 60 * 60;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub agent: AgentConfig,
    pub purchase: PurchaseConfig,
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub dashboard: DashboardConfig,
    #[serde(default)]
    pub alerts: AlertsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AgentConfig {
    pub name: String,
    /// Cadence of the workflow scheduler.
    pub tick_interval_ms: u64,
    /// Run against the in-memory simulated chain instead of the gateway.
    #[serde(default)]
    pub dry_run: bool,
}

/// Everything the workflow core needs to build its requests.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct PurchaseConfig {
    /// Highest acceptable price per unit, in wei. Accepts a TOML integer or
    /// a decimal string (wei amounts overflow TOML's i64).
    #[serde(deserialize_with = "deserialize_wei")]
    pub price_ceiling: Wei,
    pub workflow_timeout_seconds: u64,
    /// Contract the active sales are read from.
    pub target_sale_contract_address: String,
    /// Contract the purchase call is sent to.
    pub purchase_contract_address: String,
    /// Multisig wallet that executes the purchase.
    pub multisig_contract_address: String,
    pub tx_gas_limit: u64,
    /// Owner address whose signature approves the multisig transaction.
    pub signer_address: String,
    /// Artists (seller addresses) the agent may buy from. Empty allows any.
    #[serde(default)]
    pub artist_allow_list: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GatewayConfig {
    pub base_url: String,
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DashboardConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 3030,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AlertsConfig {
    /// Completed purchases are POSTed here when set.
    pub webhook_url: Option<String>,
}

fn default_request_timeout() -> u64 {
    30
}

fn deserialize_wei<'de, D>(deserializer: D) -> std::result::Result<Wei, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawWei {
        Int(u64),
        Text(String),
    }

    match RawWei::deserialize(deserializer)? {
        RawWei::Int(v) => Ok(Wei::from(v)),
        RawWei::Text(s) => s
            .trim()
            .replace('_', "")
            .parse::<Wei>()
            .map_err(|e| serde::de::Error::custom(format!("invalid wei amount '{s}': {e}"))),
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::from_toml(&contents).with_context(|| format!("Invalid config file: {path}"))
    }

    /// Parse and validate configuration from a TOML string.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: AppConfig =
            toml::from_str(contents).context("Failed to parse config TOML")?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the agent cannot run with.
    pub fn validate(&self) -> std::result::Result<(), MintwatchError> {
        if self.agent.tick_interval_ms == 0 {
            return Err(MintwatchError::Config(
                "agent.tick_interval_ms must be greater than zero".into(),
            ));
        }
        if self.purchase.workflow_timeout_seconds == 0 {
            return Err(MintwatchError::Config(
                "purchase.workflow_timeout_seconds must be greater than zero".into(),
            ));
        }
        if self.purchase.workflow_timeout_seconds > MAX_WORKFLOW_TIMEOUT_SECS {
            return Err(MintwatchError::Config(format!(
                "purchase.workflow_timeout_seconds must be at most {MAX_WORKFLOW_TIMEOUT_SECS}"
            )));
        }
        let addresses = [
            ("target_sale_contract_address", &self.purchase.target_sale_contract_address),
            ("purchase_contract_address", &self.purchase.purchase_contract_address),
            ("multisig_contract_address", &self.purchase.multisig_contract_address),
            ("signer_address", &self.purchase.signer_address),
        ];
        for (name, value) in addresses {
            if value.trim().is_empty() {
                return Err(MintwatchError::Config(format!("purchase.{name} is empty")));
            }
        }
        if !self.agent.dry_run && self.gateway.base_url.trim().is_empty() {
            return Err(MintwatchError::Config(
                "gateway.base_url is required unless agent.dry_run is set".into(),
            ));
        }
        Ok(())
    }

    /// Resolve an environment variable name to its value.
    /// Useful for loading secrets referenced in the config.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }

    /// The gateway API key, if one is configured and present in the env.
    pub fn gateway_api_key(&self) -> Option<SecretString> {
        self.gateway
            .api_key_env
            .as_deref()
            .and_then(|env| Self::resolve_env(env).ok())
            .map(SecretString::new)
    }
}
