// Monitor loop: cycle orchestration, loop task, operator API

use crate::config::Config;
use crate::error::{Result, TunnelmonError};
use crate::monitor::governor::RestartGovernor;
use crate::monitor::health::{self, Health, PatternSet};
use crate::systemd::{LifecycleState, ManagedUnits, RecentLogs, Tunnel};
use chrono::Utc;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

/// Sleep after a cycle-level failure, deliberately longer than any sane
/// polling interval
const FAILURE_BACKOFF: Duration = Duration::from_secs(60);

/// Wait after a reactivation Start before re-querying state
const REACTIVATE_SETTLE: Duration = Duration::from_secs(2);

/// Everything the cycle lock guards: roster, governor bookkeeping, config
#[derive(Debug)]
pub struct MonitorState {
    pub config: Config,
    pub roster: Vec<Tunnel>,
    pub governor: RestartGovernor,
}

/// Point-in-time view for operator surfaces
#[derive(Debug, Clone)]
pub struct StatusSnapshot {
    pub running: bool,
    pub tunnels: Vec<Tunnel>,
    pub config: Config,
}

/// Supervises the tunnel roster: one background polling task, with all
/// shared state behind a single mutex held for the duration of a cycle.
///
/// Manual restart requests and tunable changes go through the same lock, so
/// they either complete before a cycle starts or wait until it finishes; a
/// manual restart can never race the loop's own restart of the same unit.
pub struct Monitor {
    state: Arc<Mutex<MonitorState>>,
    units: Arc<dyn ManagedUnits>,
    logs: Arc<dyn RecentLogs>,
    config_path: PathBuf,
    stop_tx: watch::Sender<bool>,
    task: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl Monitor {
    pub fn new(
        config: Config,
        config_path: PathBuf,
        units: Arc<dyn ManagedUnits>,
        logs: Arc<dyn RecentLogs>,
    ) -> Self {
        let mut governor = RestartGovernor::new(
            config.restart_window_seconds,
            config.max_restart_attempts,
        );
        governor.restore(config.restart_history.clone());

        let state = MonitorState {
            roster: config.tunnels.clone(),
            governor,
            config,
        };

        let (stop_tx, _) = watch::channel(false);

        Self {
            state: Arc::new(Mutex::new(state)),
            units,
            logs,
            config_path,
            stop_tx,
            task: std::sync::Mutex::new(None),
        }
    }

    /// Whether the polling task is currently running
    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .unwrap()
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    /// Idle -> Running: spawn the background polling task. No-op if already
    /// running.
    pub fn start(&self) {
        let mut task = self.task.lock().unwrap();
        if task.as_ref().map(|h| !h.is_finished()).unwrap_or(false) {
            tracing::debug!("monitor loop already running");
            return;
        }

        self.stop_tx.send_replace(false);

        let state = self.state.clone();
        let units = self.units.clone();
        let logs = self.logs.clone();
        let config_path = self.config_path.clone();
        let stop_rx = self.stop_tx.subscribe();

        tracing::info!("starting monitor loop");
        *task = Some(tokio::spawn(run_loop(
            state,
            units,
            logs,
            config_path,
            stop_rx,
        )));
    }

    /// Running -> Idle: signal the loop to stop after its current cycle and
    /// wait for it to wind down. Cooperative; never interrupts an in-flight
    /// external command.
    pub async fn stop(&self) {
        self.stop_tx.send_replace(true);

        let handle = self.task.lock().unwrap().take();
        if let Some(handle) = handle {
            tracing::info!("stopping monitor loop after current cycle");
            if let Err(err) = handle.await {
                tracing::error!(%err, "monitor loop task panicked");
            }
        }
        tracing::info!("monitor loop stopped");
    }

    /// Run exactly one cycle on the caller's task (drives `--once`)
    pub async fn run_cycle_once(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        run_cycle(
            &mut state,
            self.units.as_ref(),
            self.logs.as_ref(),
            &self.config_path,
        )
        .await
    }

    /// Manual restart request from an operator surface. Still governed:
    /// returns Ok(false) when the governor denies the attempt.
    pub async fn restart_tunnel(&self, name: &str) -> Result<bool> {
        let mut state = self.state.lock().await;
        let state = &mut *state;

        let tunnel = state
            .roster
            .iter_mut()
            .find(|t| t.name == name)
            .ok_or_else(|| TunnelmonError::UnknownTunnel(name.to_string()))?;

        let now = Utc::now();
        if !state.governor.can_restart(name, now) {
            tracing::info!(unit = name, "manual restart denied by governor");
            return Ok(false);
        }

        let restart_delay = Duration::from_secs(state.config.restart_delay);
        let success = state
            .governor
            .execute_restart(self.units.as_ref(), tunnel, restart_delay, now)
            .await;

        persist(&mut state.config, &state.roster, &state.governor, &self.config_path);

        Ok(success)
    }

    /// Enable or disable automated restarts
    pub async fn set_auto_restart(&self, enabled: bool) {
        let mut state = self.state.lock().await;
        state.config.auto_restart = enabled;
        tracing::info!(enabled, "auto-restart updated");
        persist_config(&state.config, &self.config_path);
    }

    /// Change the polling interval, effective from the next cycle
    pub async fn set_check_interval(&self, seconds: u64) {
        let mut state = self.state.lock().await;
        state.config.check_interval = seconds;
        tracing::info!(seconds, "check interval updated");
        persist_config(&state.config, &self.config_path);
    }

    /// Change the window cap on restart attempts
    pub async fn set_max_restart_attempts(&self, attempts: usize) {
        let mut state = self.state.lock().await;
        state.config.max_restart_attempts = attempts;
        let window = state.config.restart_window_seconds;
        state.governor.set_limits(window, attempts);
        tracing::info!(attempts, "max restart attempts updated");
        persist_config(&state.config, &self.config_path);
    }

    /// Current roster and configuration
    pub async fn status(&self) -> StatusSnapshot {
        let state = self.state.lock().await;
        StatusSnapshot {
            running: self.is_running(),
            tunnels: state.roster.clone(),
            config: state.config.clone(),
        }
    }
}

async fn run_loop(
    state: Arc<Mutex<MonitorState>>,
    units: Arc<dyn ManagedUnits>,
    logs: Arc<dyn RecentLogs>,
    config_path: PathBuf,
    mut stop_rx: watch::Receiver<bool>,
) {
    tracing::info!("monitor loop entering Running state");

    loop {
        if *stop_rx.borrow() {
            break;
        }

        let (interval, cycle_result) = {
            let mut guard = state.lock().await;
            let result = run_cycle(&mut guard, units.as_ref(), logs.as_ref(), &config_path).await;
            (guard.config.check_interval, result)
        };

        // A single bad cycle never kills the loop; it just earns a longer nap
        let sleep_for = match cycle_result {
            Ok(()) => Duration::from_secs(interval),
            Err(err) => {
                tracing::error!(%err, "monitor cycle failed");
                FAILURE_BACKOFF
            }
        };

        if *stop_rx.borrow() {
            break;
        }

        tokio::select! {
            _ = tokio::time::sleep(sleep_for) => {}
            _ = stop_rx.changed() => {
                if *stop_rx.borrow() {
                    break;
                }
            }
        }
    }

    tracing::info!("monitor loop entering Idle state");
}

/// One polling cycle: enumerate, evaluate, act, persist.
/// The caller holds the state lock for the whole cycle.
pub(crate) async fn run_cycle(
    state: &mut MonitorState,
    units: &dyn ManagedUnits,
    logs: &dyn RecentLogs,
    config_path: &Path,
) -> Result<()> {
    let MonitorState {
        config,
        roster,
        governor,
    } = state;

    let mut names = units.list_tunnel_units().await;
    names.sort();
    names.dedup();
    tracing::debug!(count = names.len(), "enumerated tunnel units");

    // Rebuild the roster: counters survive by name, retired units drop out
    let mut previous: HashMap<String, Tunnel> = roster
        .drain(..)
        .map(|tunnel| (tunnel.name.clone(), tunnel))
        .collect();

    for name in &names {
        let mut tunnel = previous
            .remove(name)
            .unwrap_or_else(|| Tunnel::discovered(name));
        tunnel.lifecycle_state = units.unit_state(name).await;
        roster.push(tunnel);
    }

    for retired in previous.keys() {
        tracing::info!(unit = %retired, "tunnel no longer enumerable, dropping from roster");
    }

    governor.retain(names.iter().map(String::as_str));
    governor.set_limits(config.restart_window_seconds, config.max_restart_attempts);

    let ignore = PatternSet::new(&config.ignore_patterns);
    let critical = PatternSet::new(&config.critical_patterns);
    let lookback = config.journal_lookback();
    let restart_delay = Duration::from_secs(config.restart_delay);

    // Units are handled sequentially in name order so restart-window
    // accounting is reproducible across runs
    for tunnel in roster.iter_mut() {
        if tunnel.lifecycle_state.needs_reactivation() && config.restart_on_inactive {
            reactivate(units, tunnel, restart_delay).await;
            continue;
        }

        let evidence = if tunnel.lifecycle_state.is_active() {
            logs.recent_log(&tunnel.name, lookback).await
        } else {
            String::new()
        };

        let verdict = health::classify(tunnel.lifecycle_state, &evidence, &ignore, &critical);
        let reason = match verdict {
            Health::Healthy => continue,
            Health::Unhealthy { reason } => reason,
        };

        tracing::warn!(unit = %tunnel.name, %reason, "tunnel unhealthy");

        if !config.auto_restart {
            continue;
        }

        let now = Utc::now();
        if governor.can_restart(&tunnel.name, now) {
            governor
                .execute_restart(units, tunnel, restart_delay, now)
                .await;
        } else {
            tracing::info!(unit = %tunnel.name, "restart denied by governor");
        }
    }

    persist(config, roster, governor, config_path);

    Ok(())
}

/// Lightweight recovery for tunnels that are merely stopped: plain Start,
/// escalating to a full restart if the unit does not come up. Not counted
/// against the restart window; rate-limited only by the polling interval.
async fn reactivate(units: &dyn ManagedUnits, tunnel: &mut Tunnel, restart_delay: Duration) {
    tracing::info!(
        unit = %tunnel.name,
        state = %tunnel.lifecycle_state,
        "tunnel not active, attempting reactivation"
    );

    if let Err(err) = units.start_unit(&tunnel.name).await {
        tracing::warn!(unit = %tunnel.name, %err, "reactivation start failed");
    }

    tokio::time::sleep(REACTIVATE_SETTLE).await;

    let state = units.unit_state(&tunnel.name).await;
    if state.is_active() {
        tunnel.lifecycle_state = LifecycleState::Active;
        tracing::info!(unit = %tunnel.name, "tunnel reactivated");
        return;
    }

    tracing::warn!(unit = %tunnel.name, "reactivation insufficient, escalating to restart");
    if units.restart_unit(&tunnel.name, restart_delay).await {
        tunnel.lifecycle_state = LifecycleState::Active;
        tracing::info!(unit = %tunnel.name, "tunnel recovered via restart");
    } else {
        tunnel.lifecycle_state = units.unit_state(&tunnel.name).await;
        tracing::error!(
            unit = %tunnel.name,
            state = %tunnel.lifecycle_state,
            "tunnel still not active after restart"
        );
    }
}

/// Write roster and governor bookkeeping back into the config snapshot and
/// persist it. Persistence failure is logged, never fatal; the in-memory
/// state stays authoritative and the next cycle tries again.
fn persist(config: &mut Config, roster: &[Tunnel], governor: &RestartGovernor, path: &Path) {
    config.tunnels = roster.to_vec();
    config.restart_history = governor.snapshot();
    persist_config(config, path);
}

fn persist_config(config: &Config, path: &Path) {
    if let Err(err) = config.save(path.to_path_buf()) {
        tracing::warn!(%err, path = %path.display(), "failed to persist configuration");
    }
}
