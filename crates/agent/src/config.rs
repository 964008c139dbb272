//! Agent configuration

use anyhow::{Context, Result};
use bridge_lib::BridgeSettings;
use serde::Deserialize;
use std::fmt;
use std::path::Path;

/// Environment variable naming an optional config file
pub const CONFIG_PATH_ENV: &str = "BRIDGE_CONFIG";

/// Agent configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Name attached to every structured log event
    #[serde(default = "default_instance_name")]
    pub instance_name: String,

    /// API server port for health, metrics and control endpoints
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    #[serde(default)]
    pub transmitter: TransmitterSettings,

    /// Pipeline settings, resolved by `BridgeSettings::resolve`
    #[serde(default)]
    pub bridge: BridgeSettings,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransmitterKind {
    Http,
    #[default]
    Log,
}

#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct TransmitterSettings {
    pub kind: TransmitterKind,
    /// Target URL for `http`
    pub endpoint: Option<String>,
    /// Bearer token passed through untouched
    pub token: Option<String>,
    pub request_timeout_secs: u64,
}

impl Default for TransmitterSettings {
    fn default() -> Self {
        Self {
            kind: TransmitterKind::Log,
            endpoint: None,
            token: None,
            request_timeout_secs: 30,
        }
    }
}

impl fmt::Debug for TransmitterSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransmitterSettings")
            .field("kind", &self.kind)
            .field("endpoint", &self.endpoint)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

fn default_instance_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "sensor-bridge".to_string())
}

fn default_api_port() -> u16 {
    8080
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            instance_name: default_instance_name(),
            api_port: default_api_port(),
            transmitter: TransmitterSettings::default(),
            bridge: BridgeSettings::default(),
        }
    }
}

impl AgentConfig {
    /// Load from the file named by `BRIDGE_CONFIG` (if set) and `BRIDGE_*` environment variables
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_ENV).ok();
        Self::load_from(path.as_deref().map(Path::new))
    }

    /// Load from an optional file, with environment variables layered on top.
    ///
    /// Nested keys use `__`, e.g. `BRIDGE_BRIDGE__MAX_BATCH_SIZE=200` or
    /// `BRIDGE_TRANSMITTER__KIND=http`.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let config = builder
            .add_source(
                config::Environment::with_prefix("BRIDGE")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to load configuration")?;

        config
            .try_deserialize()
            .context("Invalid configuration")
    }
}
