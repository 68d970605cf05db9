// Tunnel unit data models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// LifecycleState is systemd's view of a unit's run state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    Active,
    Inactive,
    Failed,
    Activating,
    Deactivating,
    Unknown,
}

impl LifecycleState {
    /// Parse systemd's ActiveState property; unrecognized values map to Unknown
    pub fn parse(state: &str) -> Self {
        match state {
            "active" => LifecycleState::Active,
            "inactive" => LifecycleState::Inactive,
            "failed" => LifecycleState::Failed,
            "activating" => LifecycleState::Activating,
            "deactivating" => LifecycleState::Deactivating,
            _ => LifecycleState::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Active => "active",
            LifecycleState::Inactive => "inactive",
            LifecycleState::Failed => "failed",
            LifecycleState::Activating => "activating",
            LifecycleState::Deactivating => "deactivating",
            LifecycleState::Unknown => "unknown",
        }
    }

    /// Returns true if the unit is currently active/running
    pub fn is_active(&self) -> bool {
        matches!(self, LifecycleState::Active)
    }

    /// Returns true if the unit is a candidate for the lightweight
    /// reactivation path (stopped or stuck shutting down)
    pub fn needs_reactivation(&self) -> bool {
        matches!(
            self,
            LifecycleState::Inactive | LifecycleState::Failed | LifecycleState::Deactivating
        )
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// TunnelKind is the relay side a unit serves, derived from its name.
/// Rathole deployments name the domestic relay "iran" and the foreign
/// endpoint "kharej"; names without the marker default to Kharej.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TunnelKind {
    Iran,
    Kharej,
}

impl TunnelKind {
    pub fn from_name(name: &str) -> Self {
        if name.to_lowercase().contains("iran") {
            TunnelKind::Iran
        } else {
            TunnelKind::Kharej
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TunnelKind::Iran => "iran",
            TunnelKind::Kharej => "kharej",
        }
    }
}

/// Tunnel represents one monitored rathole tunnel unit.
///
/// The roster is rebuilt from directory enumeration every cycle; only
/// `restart_count` and `last_restart_at` survive across cycles (and across
/// monitor restarts), merged back in by name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tunnel {
    pub name: String,
    pub kind: TunnelKind,
    pub lifecycle_state: LifecycleState,
    pub restart_count: u32,
    pub last_restart_at: Option<DateTime<Utc>>,
}

impl Tunnel {
    /// Create a freshly discovered tunnel with no restart history
    pub fn discovered(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: TunnelKind::from_name(name),
            lifecycle_state: LifecycleState::Unknown,
            restart_count: 0,
            last_restart_at: None,
        }
    }
}
