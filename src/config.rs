use crate::audio::CaptureOptions;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fmt;

pub const DEFAULT_SIGNALING_ENDPOINT: &str = "https://live.convai.com/connect";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub signaling: SignalingConfig,
    pub capture: CaptureOptions,
    pub session: SessionConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Name recorded in the startup log
    pub name: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "convai-call".to_string(),
        }
    }
}

/// Upstream signaling backend settings
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct SignalingConfig {
    /// Connect endpoint of the upstream signaling API
    pub endpoint: String,

    /// API key sent as `X-API-Key` (falls back to `CONVAI_API_KEY`)
    pub api_key: Option<String>,

    /// Character the call is placed with (falls back to `CONVAI_CHARACTER_ID`)
    pub character_id: Option<String>,

    /// Requested media profile; only audio is used here
    pub connection_type: String,
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_SIGNALING_ENDPOINT.to_string(),
            api_key: None,
            character_id: None,
            connection_type: "audio".to_string(),
        }
    }
}

impl fmt::Debug for SignalingConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalingConfig")
            .field("endpoint", &self.endpoint)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("character_id", &self.character_id)
            .field("connection_type", &self.connection_type)
            .finish()
    }
}

impl SignalingConfig {
    /// Fill missing credentials from the conventional environment variables.
    pub fn with_env_fallback(mut self) -> Self {
        if self.api_key.is_none() {
            self.api_key = non_empty_env("CONVAI_API_KEY");
        }
        if self.character_id.is_none() {
            self.character_id = non_empty_env("CONVAI_CHARACTER_ID");
        }
        self
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Number of activity log entries kept for display
    pub log_history: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { log_history: 11 }
    }
}

impl Config {
    /// Load from an optional config file (any format the `config` crate
    /// recognises by extension), then `CONVAI__SECTION__KEY` overrides.
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("CONVAI").separator("__"))
            .build()
            .with_context(|| format!("Failed to read config from {}", path))?;

        let mut cfg: Config = settings
            .try_deserialize()
            .context("Invalid configuration")?;
        cfg.signaling = cfg.signaling.with_env_fallback();

        Ok(cfg)
    }
}
