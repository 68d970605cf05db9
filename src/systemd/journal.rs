// Journalctl evidence retrieval, bounded by a trailing time window

use crate::error::{Result, TunnelmonError};
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// The one-operation contract tunnelmon needs from the log subsystem.
/// Failures yield an empty blob, logged, never raised.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RecentLogs: Send + Sync {
    async fn recent_log(&self, unit: &str, lookback: Duration) -> String;
}

/// Fetches recent journal lines for a unit via journalctl
#[derive(Debug, Default)]
pub struct JournalReader;

impl JournalReader {
    pub fn new() -> Self {
        Self
    }

    async fn fetch(unit: &str, lookback: Duration) -> Result<String> {
        let since = format!("{} seconds ago", lookback.as_secs());

        let output = Command::new("journalctl")
            .args(["-u", unit, "--since", since.as_str(), "--no-pager", "-q"])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| TunnelmonError::Journal(format!("Failed to spawn journalctl: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(TunnelmonError::Journal(format!(
                "journalctl exited with {}: {}",
                output.status,
                stderr.trim()
            ))
            .into());
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl RecentLogs for JournalReader {
    async fn recent_log(&self, unit: &str, lookback: Duration) -> String {
        match Self::fetch(unit, lookback).await {
            Ok(text) => text,
            Err(err) => {
                tracing::warn!(%unit, %err, "failed to read journal, treating as empty");
                String::new()
            }
        }
    }
}
