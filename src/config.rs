//! Service configuration.
//!
//! A YAML file carries one section per fetch method, each with a cache size
//! in megabytes and a per-item ceiling in kilobytes. Slaves started without
//! a readable local file bootstrap by reading the master's `/config`
//! endpoint, which echoes this structure as JSON.

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Per-method cache sizing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct MethodConfig {
    /// Total cache capacity, in megabytes.
    pub cache_size: u64,
    /// Per-item ceiling, in kilobytes. Zero means unlimited.
    pub max_item_size: u64,
}

impl MethodConfig {
    #[must_use]
    pub fn cache_bytes(&self) -> u64 {
        self.cache_size << 20
    }

    #[must_use]
    pub fn max_item_bytes(&self) -> u64 {
        self.max_item_size << 10
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub html: MethodConfig,
    pub image: MethodConfig,
    pub dimension: MethodConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            html: MethodConfig {
                cache_size: 64,
                max_item_size: 1024,
            },
            image: MethodConfig {
                cache_size: 64,
                max_item_size: 4096,
            },
            dimension: MethodConfig {
                cache_size: 8,
                max_item_size: 0,
            },
        }
    }
}

impl Config {
    /// Parse the YAML config at `path`.
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {path}"))?;
        serde_yaml::from_str(&raw).with_context(|| format!("parsing config file {path}"))
    }

    /// Bootstrap from a running master's `/config` endpoint.
    pub async fn from_master(master: &str, http: &reqwest::Client) -> anyhow::Result<Self> {
        let url = format!("{master}/config");
        let config = http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("fetching config from {url}"))?
            .json::<Self>()
            .await
            .with_context(|| format!("decoding config from {url}"))?;
        Ok(config)
    }
}
