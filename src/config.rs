use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::engine::firing::FiringProtocol;

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct EngineConfig {
    /// Simulation time covered by one tick.
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
    /// Transit progress gained per tick at speed 1.
    #[serde(default = "default_progress_per_tick")]
    pub progress_per_tick: f64,
    #[serde(default = "default_speed")]
    pub speed: f64,
    /// Autorun fires one random enabled transition per interval.
    #[serde(default = "default_step_interval_ms")]
    pub step_interval_ms: u64,
    #[serde(default = "default_commit_delay_ms")]
    pub commit_delay_ms: u64,
    #[serde(default)]
    pub protocol: FiringProtocol,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub autorun: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_ms: default_tick_ms(),
            progress_per_tick: default_progress_per_tick(),
            speed: default_speed(),
            step_interval_ms: default_step_interval_ms(),
            commit_delay_ms: default_commit_delay_ms(),
            protocol: FiringProtocol::default(),
            seed: None,
            autorun: false,
        }
    }
}

impl EngineConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        Self::from_toml(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: EngineConfig = toml::from_str(content)?;
        anyhow::ensure!(config.tick_ms > 0, "tick_ms must be positive");
        anyhow::ensure!(
            config.speed.is_finite() && config.speed >= 0.0,
            "speed must be a non-negative number"
        );
        Ok(config)
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    pub fn step_interval(&self) -> Duration {
        Duration::from_millis(self.step_interval_ms)
    }

    pub fn commit_delay(&self) -> Duration {
        Duration::from_millis(self.commit_delay_ms)
    }

    /// Progress a transit gains per tick at the current speed.
    pub fn progress_step(&self) -> f64 {
        self.progress_per_tick * self.speed
    }
}

fn default_tick_ms() -> u64 {
    50
}

fn default_progress_per_tick() -> f64 {
    0.05
}

fn default_speed() -> f64 {
    1.0
}

fn default_step_interval_ms() -> u64 {
    1000
}

fn default_commit_delay_ms() -> u64 {
    500
}
