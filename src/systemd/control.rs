// Tunnel unit lifecycle commands

use crate::error::{Result, TunnelmonError};
use zbus::Connection;

/// Issues start/stop commands for tunnel units over the system bus
pub struct TunnelController {
    connection: Connection,
}

impl TunnelController {
    /// Create a controller sharing an existing system-bus connection
    pub fn new(connection: Connection) -> Self {
        Self { connection }
    }

    /// Start a tunnel unit and block until systemd accepts the job
    pub async fn start_unit(&self, unit_name: &str) -> Result<()> {
        validate_unit_name(unit_name)?;

        let proxy = self.manager_proxy().await?;

        let _job_path: zbus::zvariant::OwnedObjectPath = proxy
            .call("StartUnit", &(unit_name, "replace"))
            .await
            .map_err(|e| control_error(unit_name, "start", e))?;

        Ok(())
    }

    /// Stop a tunnel unit and block until systemd accepts the job
    pub async fn stop_unit(&self, unit_name: &str) -> Result<()> {
        validate_unit_name(unit_name)?;

        let proxy = self.manager_proxy().await?;

        let _job_path: zbus::zvariant::OwnedObjectPath = proxy
            .call("StopUnit", &(unit_name, "replace"))
            .await
            .map_err(|e| control_error(unit_name, "stop", e))?;

        Ok(())
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
}

fn control_error(unit_name: &str, verb: &str, err: zbus::Error) -> TunnelmonError {
    let message = err.to_string();
    if message.contains("Access denied") || message.contains("Authentication") {
        TunnelmonError::UnitControl {
            unit: unit_name.to_string(),
            message: "Access denied. Run the monitor as root or grant it systemd privileges."
                .to_string(),
        }
    } else {
        TunnelmonError::UnitControl {
            unit: unit_name.to_string(),
            message: format!("Failed to {}: {}", verb, message),
        }
    }
}

/// Validate unit name format and prevent injection
pub(crate) fn validate_unit_name(unit_name: &str) -> Result<()> {
    if unit_name.is_empty() {
        return Err(anyhow::anyhow!("Unit name cannot be empty"));
    }

    // No path traversal, no null bytes, reasonable length
    if unit_name.contains("..") || unit_name.contains('\0') || unit_name.len() > 256 {
        return Err(anyhow::anyhow!("Invalid unit name format"));
    }

    if !unit_name.ends_with(".service") {
        return Err(anyhow::anyhow!("Unit name must end with .service"));
    }

    Ok(())
}

// Make TunnelController cloneable for async tasks
impl Clone for TunnelController {
    fn clone(&self) -> Self {
        Self {
            connection: self.connection.clone(),
        }
    }
}
