use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::escalation::EscalationPolicy;

const CONFIG_FILE: &str = "config.json";

/// Workspace configuration stored at `.cardflow/config.json`. Every field
/// has a default so a missing or partial file still loads.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub due_soon_hours: i64,
    pub stale_hours: i64,
    /// Seconds between daemon escalation sweeps.
    pub sweep_interval_secs: u64,
    /// When set, `cardflow escalate` and any other sweep trigger must
    /// present this exact value.
    pub sweep_secret: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        let policy = EscalationPolicy::default();
        Config {
            due_soon_hours: policy.due_soon_hours,
            stale_hours: policy.stale_hours,
            sweep_interval_secs: 3600,
            sweep_secret: None,
        }
    }
}

impl Config {
    pub fn load(cardflow_dir: &Path) -> Result<Config> {
        let path = cardflow_dir.join(CONFIG_FILE);
        if !path.exists() {
            return Ok(Config::default());
        }
        let content = fs::read_to_string(&path).context("Failed to read config.json")?;
        serde_json::from_str(&content).context("Failed to parse config.json")
    }

    pub fn save(&self, cardflow_dir: &Path) -> Result<()> {
        let path = cardflow_dir.join(CONFIG_FILE);
        let json = serde_json::to_string_pretty(self)?;
        fs::write(&path, json).context("Failed to write config.json")?;
        Ok(())
    }

    pub fn policy(&self) -> EscalationPolicy {
        EscalationPolicy {
            due_soon_hours: self.due_soon_hours,
            stale_hours: self.stale_hours,
        }
    }
}
