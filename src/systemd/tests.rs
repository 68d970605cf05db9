#[cfg(test)]
mod tests {
    use crate::error::Result;
    use crate::systemd::control::validate_unit_name;
    use crate::systemd::{filter_tunnel_units, ConnectionManager, LifecycleState, Tunnel, TunnelKind};

    #[test]
    fn test_lifecycle_state_parsing() {
        assert_eq!(LifecycleState::parse("active"), LifecycleState::Active);
        assert_eq!(LifecycleState::parse("inactive"), LifecycleState::Inactive);
        assert_eq!(LifecycleState::parse("failed"), LifecycleState::Failed);
        assert_eq!(LifecycleState::parse("activating"), LifecycleState::Activating);
        assert_eq!(
            LifecycleState::parse("deactivating"),
            LifecycleState::Deactivating
        );

        // Anything systemd invents later maps to Unknown
        assert_eq!(LifecycleState::parse("reloading"), LifecycleState::Unknown);
        assert_eq!(LifecycleState::parse(""), LifecycleState::Unknown);
    }

    #[test]
    fn test_lifecycle_state_predicates() {
        assert!(LifecycleState::Active.is_active());
        assert!(!LifecycleState::Activating.is_active());

        assert!(LifecycleState::Inactive.needs_reactivation());
        assert!(LifecycleState::Failed.needs_reactivation());
        assert!(LifecycleState::Deactivating.needs_reactivation());
        assert!(!LifecycleState::Active.needs_reactivation());
        assert!(!LifecycleState::Activating.needs_reactivation());
        assert!(!LifecycleState::Unknown.needs_reactivation());
    }

    #[test]
    fn test_tunnel_kind_derivation() {
        assert_eq!(
            TunnelKind::from_name("rathole-iran-1.service"),
            TunnelKind::Iran
        );
        assert_eq!(
            TunnelKind::from_name("rathole-IRAN-2.service"),
            TunnelKind::Iran
        );
        assert_eq!(
            TunnelKind::from_name("rathole-kharej-1.service"),
            TunnelKind::Kharej
        );
        // No marker defaults to the foreign side
        assert_eq!(TunnelKind::from_name("rathole-eu1.service"), TunnelKind::Kharej);
    }

    #[test]
    fn test_discovered_tunnel_has_no_history() {
        let tunnel = Tunnel::discovered("rathole-iran-1.service");
        assert_eq!(tunnel.name, "rathole-iran-1.service");
        assert_eq!(tunnel.kind, TunnelKind::Iran);
        assert_eq!(tunnel.lifecycle_state, LifecycleState::Unknown);
        assert_eq!(tunnel.restart_count, 0);
        assert!(tunnel.last_restart_at.is_none());
    }

    #[test]
    fn test_filter_tunnel_units() {
        let raw = vec![
            "rathole-kharej-1.service".to_string(),
            "nginx.service".to_string(),
            "rathole-iran-1.service".to_string(),
            "rathole-iran-1.service".to_string(), // duplicate
            "rathole-kharej-1.socket".to_string(), // wrong suffix
            "sshd.service".to_string(),
        ];

        let filtered = filter_tunnel_units(raw.into_iter(), "rathole");

        // De-duplicated and sorted
        assert_eq!(
            filtered,
            vec![
                "rathole-iran-1.service".to_string(),
                "rathole-kharej-1.service".to_string(),
            ]
        );
    }

    #[test]
    fn test_filter_tunnel_units_empty_input() {
        let filtered = filter_tunnel_units(std::iter::empty(), "rathole");
        assert!(filtered.is_empty());
    }

    #[test]
    fn test_unit_name_validation() {
        assert!(validate_unit_name("").is_err());
        assert!(validate_unit_name("../etc/passwd.service").is_err());
        assert!(validate_unit_name("invalid\0unit.service").is_err());
        assert!(validate_unit_name("noextension").is_err());

        assert!(validate_unit_name("rathole-iran-1.service").is_ok());
        assert!(validate_unit_name("rathole-kharej-2.service").is_ok());
    }

    #[tokio::test]
    async fn test_connection_manager_retry() -> Result<()> {
        use std::sync::atomic::{AtomicU32, Ordering};
        use std::sync::Arc;

        let manager = ConnectionManager::new(
            2, // max_retries
            std::time::Duration::from_millis(100),
            std::time::Duration::from_secs(1),
        );

        let call_count = Arc::new(AtomicU32::new(0));
        let call_count_clone = call_count.clone();

        let result = manager
            .with_retry("test_operation", move || {
                let count = call_count_clone.clone();
                async move {
                    let current = count.fetch_add(1, Ordering::SeqCst) + 1;
                    if current < 2 {
                        Err(anyhow::anyhow!("Simulated failure"))
                    } else {
                        Ok("success")
                    }
                }
            })
            .await;

        assert!(result.is_ok());
        assert_eq!(result.unwrap(), "success");
        assert_eq!(call_count.load(Ordering::SeqCst), 2);

        Ok(())
    }

    #[tokio::test]
    async fn test_connection_manager_gives_up_on_permission_errors() {
        use std::sync::atomic::{AtomicU32, Ordering};
        use std::sync::Arc;

        let manager = ConnectionManager::new(
            5,
            std::time::Duration::from_millis(10),
            std::time::Duration::from_secs(1),
        );

        let call_count = Arc::new(AtomicU32::new(0));
        let call_count_clone = call_count.clone();

        let result: Result<()> = manager
            .with_retry("denied_operation", move || {
                let count = call_count_clone.clone();
                async move {
                    count.fetch_add(1, Ordering::SeqCst);
                    Err(anyhow::anyhow!("Access denied for test"))
                }
            })
            .await;

        assert!(result.is_err());
        // Permission errors are not retried
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
    }
}
