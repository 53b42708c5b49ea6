//! Agent configuration

use anyhow::{Context, Result};
use edgewatch_lib::collector::{SeverityKeywords, TailerConfig, WatcherConfig};
use edgewatch_lib::forward::ForwarderConfig;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Prefix for environment overrides, e.g. `EDGEWATCH_WATCH_PATH`
pub const ENV_PREFIX: &str = "EDGEWATCH";

/// Environment variable naming an optional config file
pub const CONFIG_FILE_ENV: &str = "EDGEWATCH_CONFIG";

/// Agent configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Node name used in structured logs
    #[serde(default = "default_node_name")]
    pub node_name: String,

    /// Identity stamped on forwarded envelopes
    #[serde(default = "default_device_id")]
    pub device_id: String,

    /// API server port for health, metrics and queries
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Directory to watch. No watcher runs when unset.
    #[serde(default)]
    pub watch_path: Option<PathBuf>,

    #[serde(default = "default_true")]
    pub watch_recursive: bool,

    /// Comma-separated extensions to forward; empty forwards everything
    #[serde(default)]
    pub watch_extensions: String,

    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,

    /// Comma-separated log files to tail
    #[serde(default = "default_log_files")]
    pub log_files: String,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_ledger_capacity")]
    pub ledger_capacity: usize,

    /// Comma-separated keyword overrides for severity classification
    #[serde(default)]
    pub critical_keywords: Option<String>,
    #[serde(default)]
    pub error_keywords: Option<String>,
    #[serde(default)]
    pub warn_keywords: Option<String>,

    /// Topic for file change and log envelopes
    #[serde(default = "default_events_topic")]
    pub events_topic: String,

    /// Topic the anomaly detector consumes telemetry from
    #[serde(default = "default_telemetry_topic")]
    pub telemetry_topic: String,

    /// Topic anomaly alerts are re-published on
    #[serde(default = "default_alerts_topic")]
    pub alerts_topic: String,

    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,
}

fn default_node_name() -> String {
    std::env::var("NODE_NAME").unwrap_or_else(|_| "unknown".to_string())
}

fn default_device_id() -> String {
    "WS-AGENT".to_string()
}

fn default_api_port() -> u16 {
    8080
}

fn default_true() -> bool {
    true
}

fn default_settle_delay_ms() -> u64 {
    50
}

fn default_log_files() -> String {
    "/var/log/syslog,/var/log/auth.log".to_string()
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_ledger_capacity() -> usize {
    100
}

fn default_events_topic() -> String {
    "device-events-workstation".to_string()
}

fn default_telemetry_topic() -> String {
    "iot-logs".to_string()
}

fn default_alerts_topic() -> String {
    "anomaly-alerts".to_string()
}

fn default_send_timeout_ms() -> u64 {
    5000
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

impl AgentConfig {
    /// Load from the optional `EDGEWATCH_CONFIG` file and the process environment
    pub fn load() -> Result<Self> {
        let file = std::env::var(CONFIG_FILE_ENV).ok().map(PathBuf::from);
        Self::load_from(file.as_deref(), None)
    }

    /// Load from an optional file, layered under environment variables
    ///
    /// `env` replaces the process environment when given.
    pub fn load_from(file: Option<&Path>, env: Option<HashMap<String, String>>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .try_parsing(true)
                .source(env),
        );

        let config: AgentConfig = builder
            .build()
            .context("Failed to build configuration")?
            .try_deserialize()
            .context("Invalid agent configuration")?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            anyhow::bail!("poll_interval_ms must be greater than zero");
        }
        if self.ledger_capacity == 0 {
            anyhow::bail!("ledger_capacity must be greater than zero");
        }
        Ok(())
    }

    pub fn log_file_list(&self) -> Vec<PathBuf> {
        split_list(&self.log_files)
            .into_iter()
            .map(PathBuf::from)
            .collect()
    }

    pub fn extension_list(&self) -> Vec<String> {
        split_list(&self.watch_extensions)
    }

    /// Defaults, with any non-empty override list replacing its group
    pub fn severity_keywords(&self) -> SeverityKeywords {
        let mut keywords = SeverityKeywords::default();
        let overrides = [
            (&self.critical_keywords, &mut keywords.critical),
            (&self.error_keywords, &mut keywords.error),
            (&self.warn_keywords, &mut keywords.warn),
        ];
        for (raw, target) in overrides {
            if let Some(list) = raw.as_deref().map(split_list).filter(|l| !l.is_empty()) {
                *target = list;
            }
        }
        keywords
    }

    pub fn watcher_config(&self) -> Option<WatcherConfig> {
        self.watch_path.as_ref().map(|root| WatcherConfig {
            recursive: self.watch_recursive,
            settle_delay: Duration::from_millis(self.settle_delay_ms),
            ..WatcherConfig::new(root)
        })
    }

    pub fn tailer_config(&self) -> TailerConfig {
        TailerConfig {
            files: self.log_file_list(),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            keywords: self.severity_keywords(),
            ..TailerConfig::default()
        }
    }

    /// Delivery bound shared by event forwarding and alert re-publication
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    pub fn forwarder_config(&self) -> ForwarderConfig {
        ForwarderConfig {
            device_id: self.device_id.clone(),
            topic: self.events_topic.clone(),
            send_timeout: self.send_timeout(),
            extensions: self.extension_list(),
        }
    }
}
