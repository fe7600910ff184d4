use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub monitor: MonitorConfig,
    pub webhook: WebhookConfig,
    #[serde(default)]
    pub alerts: AlertsConfig,
    #[serde(default = "default_source_config")]
    pub source: SourceConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MonitorConfig {
    /// Name of the chat (group or individual) to watch
    pub chat: String,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WebhookConfig {
    /// Base URL; channel suffixes (`/m`, `/ef`, `/alert`) are appended to it
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub max_retries: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AlertsConfig {
    #[serde(default)]
    pub phrases: Vec<String>,
    #[serde(default = "default_threshold")]
    pub threshold: u8,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            phrases: Vec::new(),
            threshold: default_threshold(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    /// Directory holding one `WhatsApp Chat with <chat>.txt` export per chat
    #[serde(default = "default_transcript_dir")]
    pub directory: PathBuf,
    /// Sender name of the monitored account inside the export
    #[serde(default = "default_self_name")]
    pub self_name: String,
}

fn default_interval_secs() -> u64 {
    5
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_retry_backoff_ms() -> u64 {
    500
}

fn default_threshold() -> u8 {
    90
}

fn default_transcript_dir() -> PathBuf {
    PathBuf::from("exports")
}

fn default_self_name() -> String {
    "You".to_string()
}

fn default_source_config() -> SourceConfig {
    SourceConfig {
        directory: default_transcript_dir(),
        self_name: default_self_name(),
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let mut config: Config =
            toml::from_str(content).context("Failed to parse config file")?;
        config.validate()?;

        // Suffixes always start with '/', so keep the base free of a trailing one
        config.webhook.base_url = config.webhook.base_url.trim_end_matches('/').to_string();
        config.alerts.phrases.retain(|p| !p.trim().is_empty());

        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.monitor.chat.trim().is_empty() {
            anyhow::bail!("[monitor] chat must not be empty");
        }
        if self.monitor.interval_secs == 0 {
            anyhow::bail!("[monitor] interval_secs must be at least 1");
        }
        if self.webhook.base_url.trim().is_empty() {
            anyhow::bail!("[webhook] base_url must not be empty");
        }
        if self.alerts.threshold > 100 {
            anyhow::bail!(
                "[alerts] threshold must be between 0 and 100, got {}",
                self.alerts.threshold
            );
        }
        Ok(())
    }

    pub fn alerting_enabled(&self) -> bool {
        !self.alerts.phrases.is_empty()
    }
}
