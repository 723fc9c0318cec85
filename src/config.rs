// Startup configuration for pocscan
// Read once from an optional JSON file; CLI flags override individual fields

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::client::{ClientConfig, DEFAULT_USER_AGENT};
use crate::errors::ConfigError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Per-probe timeout in seconds.
    pub timeout: u64,
    pub proxy: Option<String>,
    pub workers: usize,
    pub user_agent: String,
    pub plugin_dir: PathBuf,
    pub max_redirects: usize,
    /// Idle messages kept per pool.
    pub pool_max_idle: usize,
    pub log_level: Option<String>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        ScanConfig {
            timeout: 10,
            proxy: None,
            workers: 10,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            plugin_dir: PathBuf::from("plugins"),
            max_redirects: 10,
            pool_max_idle: 256,
            log_level: None,
        }
    }
}

impl ScanConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: ScanConfig = serde_json::from_str(text)?;
        if let Some(proxy) = &config.proxy {
            if proxy.trim().is_empty() {
                return Ok(ScanConfig { proxy: None, ..config });
            }
        }
        Ok(config)
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            timeout: Duration::from_secs(self.timeout),
            proxy: self.proxy.clone(),
            user_agent: self.user_agent.clone(),
            max_redirects: self.max_redirects,
        }
    }
}
