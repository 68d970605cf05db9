// Restart admission control: sliding attempt window plus exponential backoff

use crate::systemd::{ManagedUnits, Tunnel};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// First failure penalty, in seconds; doubles per consecutive failure
const BASE_BACKOFF_SECS: u64 = 60;

/// Ceiling for the doubling backoff, in seconds
const MAX_BACKOFF_SECS: u64 = 3600;

/// Per-unit restart bookkeeping inside the sliding window
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RestartHistory {
    /// Attempt timestamps; entries older than the window are pruned before
    /// every admission check
    attempts: Vec<DateTime<Utc>>,
    /// While set and in the future, blocks admission regardless of window
    /// occupancy
    backoff_until: Option<DateTime<Utc>>,
    /// Consecutive failed attempts, drives the doubling
    consecutive_failures: u32,
}

/// Decides whether a restart is currently permitted for a unit, executes it,
/// and records the outcome.
///
/// Histories are keyed by unit name and survive monitor restarts via
/// [`RestartGovernor::snapshot`] / [`RestartGovernor::restore`], so a freshly
/// restarted monitor cannot trigger a restart storm on units that were
/// already in backoff.
#[derive(Debug)]
pub struct RestartGovernor {
    window: ChronoDuration,
    max_attempts: usize,
    histories: HashMap<String, RestartHistory>,
}

impl RestartGovernor {
    pub fn new(window_seconds: u64, max_attempts: usize) -> Self {
        Self {
            window: ChronoDuration::seconds(window_seconds as i64),
            max_attempts,
            histories: HashMap::new(),
        }
    }

    /// Reconfigure window parameters; existing histories are kept
    pub fn set_limits(&mut self, window_seconds: u64, max_attempts: usize) {
        self.window = ChronoDuration::seconds(window_seconds as i64);
        self.max_attempts = max_attempts;
    }

    /// Whether a restart is currently permitted for `name`
    pub fn can_restart(&mut self, name: &str, now: DateTime<Utc>) -> bool {
        let history = self.histories.entry(name.to_string()).or_default();

        if let Some(until) = history.backoff_until {
            if now < until {
                return false;
            }
        }

        let horizon = now - self.window;
        history.attempts.retain(|at| *at >= horizon && *at <= now);

        history.attempts.len() < self.max_attempts
    }

    /// Earliest time the backoff penalty for `name` expires, if one is set
    pub fn backoff_until(&self, name: &str) -> Option<DateTime<Utc>> {
        self.histories.get(name).and_then(|h| h.backoff_until)
    }

    /// Attempts currently counted against the window for `name`
    pub fn attempts_in_window(&mut self, name: &str, now: DateTime<Utc>) -> usize {
        let window = self.window;
        let history = self.histories.entry(name.to_string()).or_default();
        let horizon = now - window;
        history.attempts.retain(|at| *at >= horizon && *at <= now);
        history.attempts.len()
    }

    /// Execute a governed restart. The caller must have verified
    /// [`Self::can_restart`] first.
    ///
    /// The attempt is recorded unconditionally, success or failure, so a
    /// tight failure loop stays visible to the window. Failure escalates the
    /// backoff penalty; success clears it entirely, since the unit has
    /// demonstrated it can run.
    pub async fn execute_restart(
        &mut self,
        units: &dyn ManagedUnits,
        tunnel: &mut Tunnel,
        restart_delay: Duration,
        now: DateTime<Utc>,
    ) -> bool {
        let history = self.histories.entry(tunnel.name.clone()).or_default();
        history.attempts.push(now);

        tracing::info!(unit = %tunnel.name, "restarting tunnel");
        let success = units.restart_unit(&tunnel.name, restart_delay).await;

        if success {
            history.backoff_until = None;
            history.consecutive_failures = 0;

            tunnel.restart_count += 1;
            tunnel.last_restart_at = Some(now);
            tracing::info!(
                unit = %tunnel.name,
                restart_count = tunnel.restart_count,
                "tunnel restarted successfully"
            );
        } else {
            history.consecutive_failures += 1;
            let penalty = backoff_delay(history.consecutive_failures);
            history.backoff_until = Some(now + penalty);
            tracing::error!(
                unit = %tunnel.name,
                consecutive_failures = history.consecutive_failures,
                backoff_secs = penalty.num_seconds(),
                "tunnel restart failed, backing off"
            );
        }

        success
    }

    /// Drop histories for units no longer enumerable
    pub fn retain<'a>(&mut self, names: impl Iterator<Item = &'a str>) {
        let keep: std::collections::HashSet<&str> = names.collect();
        self.histories.retain(|name, _| keep.contains(name.as_str()));
    }

    /// Histories keyed by unit name, for persistence
    pub fn snapshot(&self) -> HashMap<String, RestartHistory> {
        self.histories.clone()
    }

    /// Load persisted histories, replacing any in-memory state
    pub fn restore(&mut self, histories: HashMap<String, RestartHistory>) {
        self.histories = histories;
    }
}

/// Doubling penalty: base << (failures - 1), capped
fn backoff_delay(consecutive_failures: u32) -> ChronoDuration {
    let exponent = consecutive_failures.saturating_sub(1).min(16);
    let secs = BASE_BACKOFF_SECS
        .saturating_mul(1u64 << exponent)
        .min(MAX_BACKOFF_SECS);
    ChronoDuration::seconds(secs as i64)
}
