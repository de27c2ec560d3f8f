use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use serde::{Deserialize, Serialize};

/// Per-pair timeout deltas declared in wall-time minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeoutDeltaMinutes {
    pub reverse: u64,
    pub swap_minimal: u64,
    pub swap_maximal: u64,
}

/// `timeoutDelta` accepts either a single integer (legacy, applied to all
/// three deltas) or the full table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TimeoutDeltaConfig {
    Single(u64),
    Table(TimeoutDeltaMinutes),
}

impl TimeoutDeltaConfig {
    pub fn minutes(&self) -> TimeoutDeltaMinutes {
        match *self {
            TimeoutDeltaConfig::Single(minutes) => TimeoutDeltaMinutes {
                reverse: minutes,
                swap_minimal: minutes,
                swap_maximal: minutes,
            },
            TimeoutDeltaConfig::Table(minutes) => minutes,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairConfig {
    pub base: String,
    pub quote: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate: Option<f64>,
    pub fee: f64,
    #[serde(rename = "timeoutDelta")]
    pub timeout_delta: TimeoutDeltaConfig,
}

impl PairConfig {
    pub fn id(&self) -> String {
        format!("{}/{}", self.base, self.quote)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub pairs: Vec<PairConfig>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("parse config {}", path.display()))
    }

    /// Rewrites the config file atomically: serialize to a sibling temp file,
    /// then rename over the original.
    pub fn save(&self, path: &Path) -> Result<()> {
        let serialized = toml::to_string_pretty(self).context("serialize config")?;

        let tmp: PathBuf = path.with_extension("toml.tmp");
        std::fs::write(&tmp, serialized)
            .with_context(|| format!("write temp config {}", tmp.display()))?;
        std::fs::rename(&tmp, path)
            .with_context(|| format!("rename {} over {}", tmp.display(), path.display()))?;
        Ok(())
    }

    pub fn pair_mut(&mut self, pair_id: &str) -> Option<&mut PairConfig> {
        self.pairs.iter_mut().find(|p| p.id() == pair_id)
    }
}
