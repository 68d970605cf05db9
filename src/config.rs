// Configuration management

use crate::error::Result;
use crate::monitor::governor::RestartHistory;
use crate::systemd::Tunnel;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Persisted monitor configuration and roster snapshot.
///
/// Every field carries a serde default, so files written by older versions
/// load cleanly with new tunables filled from defaults, and unknown keys are
/// ignored. Mutated only by explicit operator action; read-only during a
/// cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Last roster snapshot; restart counters are merged back in by name on
    /// re-enumeration
    pub tunnels: Vec<Tunnel>,
    /// Governor bookkeeping, persisted so backoff survives monitor restarts
    pub restart_history: HashMap<String, RestartHistory>,
    /// Seconds between polling cycles
    pub check_interval: u64,
    /// Restart unhealthy tunnels automatically
    pub auto_restart: bool,
    /// Restart attempts permitted inside the sliding window
    pub max_restart_attempts: usize,
    /// Seconds between Stop and Start during a restart
    pub restart_delay: u64,
    /// Sliding window length for restart accounting, in seconds
    pub restart_window_seconds: u64,
    /// Try a plain Start on inactive/failed tunnels before governed restart
    pub restart_on_inactive: bool,
    /// Journal evidence lookback in seconds; 0 follows check_interval
    pub journal_since_seconds: u64,
    /// Log level for the tracing subscriber
    pub log_level: String,
    /// Port the (external) dashboard listens on
    pub web_port: u16,
    /// Known benign noise, removed from evidence before the critical scan
    pub ignore_patterns: Vec<String>,
    /// Substrings that mark a tunnel's log evidence as unhealthy
    pub critical_patterns: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tunnels: Vec::new(),
            restart_history: HashMap::new(),
            check_interval: 300,
            auto_restart: true,
            max_restart_attempts: 3,
            restart_delay: 10,
            restart_window_seconds: 900,
            restart_on_inactive: true,
            journal_since_seconds: 0,
            log_level: "info".to_string(),
            web_port: 8080,
            ignore_patterns: Vec::new(),
            critical_patterns: vec![
                "connection refused".to_string(),
                "connection timeout".to_string(),
                "connection reset".to_string(),
                "broken pipe".to_string(),
                "network unreachable".to_string(),
                "no route to host".to_string(),
                "failed to connect".to_string(),
                "connection lost".to_string(),
                "reconnecting".to_string(),
            ],
        }
    }
}

impl Config {
    /// Get default config path: ~/.config/tunnelmon/config.yaml
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        Ok(config_dir.join("tunnelmon").join("config.yaml"))
    }

    /// Load config from path, falling back to defaults if not found.
    /// Missing keys are filled from defaults; unknown keys are ignored.
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = path.unwrap_or_else(|| Self::default_path().unwrap_or_default());

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path)?;
            let config: Config = serde_yaml::from_str(&contents)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save config to path
    pub fn save(&self, path: PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Evidence lookback; follows the polling interval unless overridden, so
    /// evidence windows line up with polling cadence
    pub fn journal_lookback(&self) -> Duration {
        let secs = if self.journal_since_seconds == 0 {
            self.check_interval
        } else {
            self.journal_since_seconds
        };
        Duration::from_secs(secs)
    }

    /// Max tracing level from `log_level`; unparseable values fall back to info
    pub fn tracing_level(&self) -> tracing::Level {
        self.log_level
            .parse()
            .unwrap_or(tracing::Level::INFO)
    }
}
