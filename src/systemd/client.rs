// Systemd unit directory queries over D-Bus using zbus

use crate::error::{Result, TunnelmonError};
use crate::systemd::{ConnectionManager, LifecycleState, TunnelController};
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::time::Duration;
use zbus::Connection;

/// Substring that marks a service unit as a managed rathole tunnel
pub const TUNNEL_UNIT_MARKER: &str = "rathole";

/// How long to wait after issuing Start before trusting a state query
pub const START_SETTLE: Duration = Duration::from_secs(2);

/// The four-operation contract tunnelmon needs from the service manager.
///
/// Queries fail softly: enumeration errors yield an empty roster and state
/// errors yield `Unknown`, both logged, so a flaky bus never aborts a cycle.
/// Lifecycle commands return `Result` because callers decide how a refused
/// command affects restart accounting.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ManagedUnits: Send + Sync {
    /// Enumerate tunnel unit names: filtered to the monitoring marker,
    /// de-duplicated and sorted. Empty on query failure.
    async fn list_tunnel_units(&self) -> Vec<String>;

    /// Current lifecycle state of a unit; `Unknown` on query failure
    async fn unit_state(&self, name: &str) -> LifecycleState;

    async fn start_unit(&self, name: &str) -> Result<()>;

    async fn stop_unit(&self, name: &str) -> Result<()>;

    /// Restart a unit as Stop + delay + Start.
    ///
    /// The delay between the two commands is mandatory: tunnels hold
    /// persistent sockets that must be released before the replacement
    /// process binds them. Success is judged by a post-action state query,
    /// never by the command return codes alone.
    async fn restart_unit(&self, name: &str, restart_delay: Duration) -> bool {
        if let Err(err) = self.stop_unit(name).await {
            tracing::warn!(unit = name, %err, "stop before restart failed, continuing");
        }

        tokio::time::sleep(restart_delay).await;

        if let Err(err) = self.start_unit(name).await {
            tracing::error!(unit = name, %err, "start after restart failed");
            return false;
        }

        tokio::time::sleep(START_SETTLE).await;
        self.unit_state(name).await.is_active()
    }
}

/// Directory client for tunnel units on the systemd system bus
pub struct SystemdDirectory {
    connection: Connection,
    connection_manager: ConnectionManager,
    controller: TunnelController,
    unit_marker: String,
}

impl SystemdDirectory {
    /// Connect to the system bus and prepare the lifecycle controller
    pub async fn new() -> Result<Self> {
        let connection_manager = ConnectionManager::default();
        let connection = connection_manager.connect_systemd().await?;
        let controller = TunnelController::new(connection.clone());

        Ok(Self {
            connection,
            connection_manager,
            controller,
            unit_marker: TUNNEL_UNIT_MARKER.to_string(),
        })
    }

    async fn manager_proxy(&self) -> Result<zbus::Proxy<'static>> {
        zbus::Proxy::new(
            &self.connection,
            "org.freedesktop.systemd1",
            "/org/freedesktop/systemd1",
            "org.freedesktop.systemd1.Manager",
        )
        .await
        .map_err(|e| TunnelmonError::SystemdConnection(e.to_string()).into())
    }

    async fn list_units_inner(&self) -> Result<Vec<String>> {
        self.connection_manager
            .with_retry("list_tunnel_units", || async {
                let proxy = self.manager_proxy().await?;

                // ListUnits returns array of (name, description, load_state, active_state,
                //                             sub_state, followed, unit_path, job_id,
                //                             job_type, job_path)
                #[allow(clippy::type_complexity)]
                let units: Vec<(
                    String,
                    String,
                    String,
                    String,
                    String,
                    String,
                    zbus::zvariant::OwnedObjectPath,
                    u32,
                    String,
                    zbus::zvariant::OwnedObjectPath,
                )> = proxy
                    .call("ListUnits", &())
                    .await
                    .map_err(|e| TunnelmonError::UnitQuery(e.to_string()))?;

                Ok(filter_tunnel_units(
                    units.into_iter().map(|unit| unit.0),
                    &self.unit_marker,
                ))
            })
            .await
    }

    async fn unit_state_inner(&self, name: &str) -> Result<LifecycleState> {
        self.connection_manager
            .with_retry("unit_state", || async {
                let proxy = self.manager_proxy().await?;

                // LoadUnit works for both loaded and not-loaded units, unlike GetUnit
                let unit_path: zbus::zvariant::OwnedObjectPath = proxy
                    .call("LoadUnit", &(name,))
                    .await
                    .map_err(|e| TunnelmonError::UnitQuery(e.to_string()))?;

                let unit_proxy = zbus::Proxy::new(
                    &self.connection,
                    "org.freedesktop.systemd1",
                    unit_path.as_str(),
                    "org.freedesktop.systemd1.Unit",
                )
                .await
                .map_err(|e| TunnelmonError::SystemdConnection(e.to_string()))?;

                let state: String = unit_proxy
                    .get_property("ActiveState")
                    .await
                    .map_err(|e| TunnelmonError::UnitQuery(e.to_string()))?;

                Ok(LifecycleState::parse(&state))
            })
            .await
    }
}

#[async_trait]
impl ManagedUnits for SystemdDirectory {
    async fn list_tunnel_units(&self) -> Vec<String> {
        match self.list_units_inner().await {
            Ok(names) => names,
            Err(err) => {
                tracing::error!(%err, "failed to enumerate tunnel units");
                Vec::new()
            }
        }
    }

    async fn unit_state(&self, name: &str) -> LifecycleState {
        match self.unit_state_inner(name).await {
            Ok(state) => state,
            Err(err) => {
                tracing::warn!(unit = name, %err, "failed to query unit state");
                LifecycleState::Unknown
            }
        }
    }

    async fn start_unit(&self, name: &str) -> Result<()> {
        self.controller.start_unit(name).await
    }

    async fn stop_unit(&self, name: &str) -> Result<()> {
        self.controller.stop_unit(name).await
    }
}

/// Filter raw unit names down to the monitored tunnel set:
/// marker substring, `.service` suffix, de-duplicated, sorted
pub fn filter_tunnel_units(names: impl Iterator<Item = String>, marker: &str) -> Vec<String> {
    let filtered: BTreeSet<String> = names
        .filter(|name| name.contains(marker) && name.ends_with(".service"))
        .collect();

    filtered.into_iter().collect()
}
