// Systemd integration module

pub mod client;
pub mod control;
pub mod journal;
pub mod models;
pub mod resilience;

#[cfg(test)]
mod tests;

pub use client::{filter_tunnel_units, ManagedUnits, SystemdDirectory, TUNNEL_UNIT_MARKER};
pub use control::TunnelController;
pub use journal::{JournalReader, RecentLogs};
pub use models::{LifecycleState, Tunnel, TunnelKind};
pub use resilience::ConnectionManager;

#[cfg(test)]
pub use client::MockManagedUnits;
#[cfg(test)]
pub use journal::MockRecentLogs;
