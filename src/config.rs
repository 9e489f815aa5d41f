use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::core::Operator;
use crate::{clog_debug, clog_warn, Error, Result};

/// Simulated cost applied to an operator nobody configured.
pub const DEFAULT_OPERATION_TIME_MS: u64 = 1000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub port: u16,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self { port: 8080 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub orchestrator_url: String,
    /// Number of concurrent workers polling for tasks.
    pub computing_power: usize,
    pub poll_interval_ms: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            orchestrator_url: "http://localhost:8080".to_string(),
            computing_power: 2,
            poll_interval_ms: 2000,
        }
    }
}

/// Per-operator simulated execution cost, in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OperationTimings {
    pub addition_ms: u64,
    pub subtraction_ms: u64,
    pub multiplication_ms: u64,
    pub division_ms: u64,
}

impl OperationTimings {
    /// The same cost for every operator.
    pub fn uniform(ms: u64) -> Self {
        Self {
            addition_ms: ms,
            subtraction_ms: ms,
            multiplication_ms: ms,
            division_ms: ms,
        }
    }

    pub fn for_operator(&self, op: Operator) -> u64 {
        match op {
            Operator::Add => self.addition_ms,
            Operator::Sub => self.subtraction_ms,
            Operator::Mul => self.multiplication_ms,
            Operator::Div => self.division_ms,
        }
    }
}

impl Default for OperationTimings {
    fn default() -> Self {
        Self::uniform(DEFAULT_OPERATION_TIME_MS)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub timings: OperationTimings,
    pub log_file: Option<String>,
}

impl Config {
    pub fn calcflow_dir() -> Result<PathBuf> {
        Ok(dirs::home_dir().ok_or(Error::NoHomeDir)?.join(".calcflow"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::calcflow_dir()?.join("calcflow.toml"))
    }

    /// Load `~/.calcflow/calcflow.toml` and apply environment overrides.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        Self::load_from(&path)
    }

    /// Load a config file (defaults if it does not exist) and apply
    /// environment overrides.
    pub fn load_from(path: &Path) -> Result<Self> {
        clog_debug!("Config::load path={}", path.display());
        let mut config = if path.exists() {
            toml::from_str(&fs::read_to_string(path)?)?
        } else {
            clog_debug!("Config file not found, using defaults");
            Self::default()
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        clog_debug!(
            "Config loaded: port={}, orchestrator_url={}, computing_power={}, timings={:?}",
            config.orchestrator.port,
            config.agent.orchestrator_url,
            config.agent.computing_power,
            config.timings
        );
        Ok(config)
    }

    /// Apply overrides from a variable lookup (the process environment in
    /// production).
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("ORCHESTRATOR_PORT") {
            match port.parse() {
                Ok(port) => self.orchestrator.port = port,
                Err(_) => clog_warn!("Ignoring invalid ORCHESTRATOR_PORT={:?}", port),
            }
        }
        if let Some(url) = lookup("ORCHESTRATOR_ADDR") {
            self.agent.orchestrator_url = url;
        }
        if let Some(power) = lookup("COMPUTING_POWER") {
            match power.parse() {
                Ok(power) if power > 0 => self.agent.computing_power = power,
                _ => clog_warn!("Ignoring invalid COMPUTING_POWER={:?}", power),
            }
        }

        let timings = [
            ("TIME_ADDITION_MS", &mut self.timings.addition_ms),
            ("TIME_SUBTRACTION_MS", &mut self.timings.subtraction_ms),
            ("TIME_MULTIPLICATIONS_MS", &mut self.timings.multiplication_ms),
            ("TIME_DIVISIONS_MS", &mut self.timings.division_ms),
        ];
        for (key, slot) in timings {
            if let Some(raw) = lookup(key) {
                *slot = raw.parse().unwrap_or_else(|_| {
                    clog_warn!("Invalid {}={:?}, using {}ms", key, raw, DEFAULT_OPERATION_TIME_MS);
                    DEFAULT_OPERATION_TIME_MS
                });
            }
        }
    }

    pub fn log_path(&self) -> Option<PathBuf> {
        self.log_file.as_deref().map(expand_tilde)
    }
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
