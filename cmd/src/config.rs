//! Configuration handling for the fq command-line client.
//!
//! Reads an optional YAML config file and applies `FQ_*` environment
//! overrides; command-line flags are merged on top by the caller.

use anyhow::Result;
use serde::Deserialize;
use std::path::Path;
use tracing::{info, warn};

/// Client configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FqConfig {
    /// Broker host
    pub host: String,
    /// Broker port
    pub port: u16,
    /// Sender credentials, `user[/queue[/queue_type]]`
    pub sender: String,
    /// Password
    pub password: String,
    /// Heartbeat interval in milliseconds
    pub heartbeat_ms: u64,
    /// Publish-queue bound
    pub backlog: usize,
    /// Fail fast instead of blocking when the publish queue is full
    pub non_blocking: bool,
}

impl Default for FqConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8765,
            sender: "guest".to_string(),
            password: String::new(),
            heartbeat_ms: 1_000,
            backlog: 10_000,
            non_blocking: false,
        }
    }
}

impl FqConfig {
    /// Load configuration from a file, falling back to defaults, then apply
    /// environment overrides.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::default();
        if let Ok(content) = std::fs::read_to_string(&path) {
            match serde_yaml::from_str::<FqConfig>(&content) {
                Ok(parsed) => {
                    config = parsed;
                    info!("loaded configuration from {:?}", path.as_ref());
                }
                Err(err) => {
                    warn!(
                        "failed to parse config file {:?}: {err}; using defaults",
                        path.as_ref()
                    );
                }
            }
        }
        config.apply_environment_overrides();
        Ok(config)
    }

    fn apply_environment_overrides(&mut self) {
        if let Ok(host) = std::env::var("FQ_HOST") {
            self.host = host;
        }
        if let Ok(port) = std::env::var("FQ_PORT") {
            if let Ok(port) = port.parse() {
                self.port = port;
            }
        }
        if let Ok(sender) = std::env::var("FQ_SENDER") {
            self.sender = sender;
        }
        if let Ok(password) = std::env::var("FQ_PASSWORD") {
            self.password = password;
        }
    }
}
