// Resilient D-Bus connection handling with retry logic

use crate::error::{Result, TunnelmonError};
use std::time::Duration;
use tokio::time::sleep;
use zbus::Connection;

/// Connection manager with automatic retry for transient D-Bus failures
#[derive(Debug, Clone)]
pub struct ConnectionManager {
    max_retries: usize,
    retry_delay: Duration,
    connection_timeout: Duration,
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_millis(500),
            connection_timeout: Duration::from_secs(5),
        }
    }
}

impl ConnectionManager {
    /// Create a new connection manager with custom settings
    pub fn new(max_retries: usize, retry_delay: Duration, connection_timeout: Duration) -> Self {
        Self {
            max_retries,
            retry_delay,
            connection_timeout,
        }
    }

    /// Establish a system-bus connection with retry logic
    pub async fn connect_systemd(&self) -> Result<Connection> {
        self.with_retry("systemd connection", || async {
            let conn = tokio::time::timeout(self.connection_timeout, Connection::system())
                .await
                .map_err(|_| TunnelmonError::SystemdConnection("Connection timeout".to_string()))?
                .map_err(|e| {
                    TunnelmonError::SystemdConnection(format!("Failed to connect: {}", e))
                })?;

            Ok(conn)
        })
        .await
    }

    /// Execute an operation with automatic retry
    pub async fn with_retry<F, T, Fut>(&self, operation_name: &str, operation: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut last_error = None;

        for attempt in 1..=self.max_retries {
            match operation().await {
                Ok(result) => {
                    if attempt > 1 {
                        tracing::info!(
                            "Operation '{}' succeeded on attempt {}",
                            operation_name,
                            attempt
                        );
                    }
                    return Ok(result);
                }
                Err(error) => {
                    tracing::warn!(
                        "Operation '{}' failed on attempt {}: {}",
                        operation_name,
                        attempt,
                        error
                    );
                    last_error = Some(error);

                    if self.should_not_retry(last_error.as_ref().unwrap()) {
                        break;
                    }

                    if attempt < self.max_retries {
                        tracing::debug!("Retrying in {:?}...", self.retry_delay);
                        sleep(self.retry_delay).await;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            TunnelmonError::SystemdConnection("No error recorded during retry".to_string()).into()
        }))
    }

    /// Check if an error should not be retried
    fn should_not_retry(&self, error: &anyhow::Error) -> bool {
        let error_str = error.to_string().to_lowercase();

        // Permission and authentication failures will not heal on retry
        if error_str.contains("permission denied") || error_str.contains("access denied") {
            return true;
        }

        if error_str.contains("authentication") || error_str.contains("auth") {
            return true;
        }

        if error_str.contains("not found") || error_str.contains("no such file") {
            return true;
        }

        if error_str.contains("invalid argument") || error_str.contains("invalid name") {
            return true;
        }

        false
    }
}
