use crate::domain::event::Provider;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentMode {
    #[default]
    Production,
    Development,
}

impl DeploymentMode {
    pub fn is_production(&self) -> bool {
        *self == DeploymentMode::Production
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub mode: DeploymentMode,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    /// Signing material keyed by provider name (`paystack`, `monnify`, ...).
    pub providers: BTreeMap<String, ProviderCredentials>,
    pub dedupe: DedupeConfig,
    pub ledger: LedgerConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct ProviderCredentials {
    pub secret: Option<String>,
    /// Public identifier some providers sign instead of the body.
    pub client_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct DedupeConfig {
    pub heuristic_enabled: bool,
    pub heuristic_window_secs: u64,
    /// Unbounded when absent.
    pub content_hash_window_secs: Option<u64>,
}

impl Default for DedupeConfig {
    fn default() -> Self {
        Self {
            heuristic_enabled: true,
            heuristic_window_secs: 300,
            content_hash_window_secs: None,
        }
    }
}

impl DedupeConfig {
    pub fn heuristic_window(&self) -> Duration {
        Duration::from_secs(self.heuristic_window_secs)
    }

    pub fn content_hash_window(&self) -> Option<Duration> {
        self.content_hash_window_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct LedgerConfig {
    pub max_commit_attempts: u32,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            max_commit_attempts: 3,
        }
    }
}

impl AppConfig {
    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Reads a YAML file, then applies `<PROVIDER>_WEBHOOK_SECRET` environment overrides.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let mut config = Self::from_yaml(&content)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut names: Vec<String> = Provider::NAMED
            .iter()
            .map(|p| p.as_str().to_string())
            .collect();
        names.extend(self.providers.keys().cloned());
        names.sort();
        names.dedup();

        for name in names {
            let key = format!(
                "{}_WEBHOOK_SECRET",
                name.to_ascii_uppercase().replace('-', "_")
            );
            if let Some(secret) = lookup(&key).filter(|s| !s.is_empty()) {
                self.providers.entry(name).or_default().secret = Some(secret);
            }
        }
    }

    pub fn credentials(&self, provider: &Provider) -> Option<&ProviderCredentials> {
        self.providers.get(provider.as_str())
    }
}
