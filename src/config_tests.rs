#[cfg(test)]
mod tests {
    use crate::config::Config;
    use crate::error::Result;
    use crate::systemd::{LifecycleState, Tunnel, TunnelKind};

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert!(config.tunnels.is_empty());
        assert!(config.restart_history.is_empty());
        assert_eq!(config.check_interval, 300);
        assert!(config.auto_restart);
        assert_eq!(config.max_restart_attempts, 3);
        assert_eq!(config.restart_delay, 10);
        assert_eq!(config.restart_window_seconds, 900);
        assert!(config.restart_on_inactive);
        assert_eq!(config.journal_since_seconds, 0);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.web_port, 8080);
        assert!(config.ignore_patterns.is_empty());
        assert!(config
            .critical_patterns
            .contains(&"connection refused".to_string()));
    }

    #[test]
    fn test_config_serialization() {
        let mut config = Config::default();
        config.check_interval = 120;
        config.log_level = "debug".to_string();
        config.tunnels = vec![Tunnel {
            name: "rathole-iran-1.service".to_string(),
            kind: TunnelKind::Iran,
            lifecycle_state: LifecycleState::Active,
            restart_count: 4,
            last_restart_at: None,
        }];

        let yaml = serde_yaml::to_string(&config).unwrap();
        assert!(yaml.contains("rathole-iran-1.service"));
        assert!(yaml.contains("debug"));

        let deserialized: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(deserialized.check_interval, 120);
        assert_eq!(deserialized.log_level, "debug");
        assert_eq!(deserialized.tunnels.len(), 1);
        assert_eq!(deserialized.tunnels[0].kind, TunnelKind::Iran);
        assert_eq!(deserialized.tunnels[0].restart_count, 4);
    }

    #[test]
    fn test_config_default_path() {
        let path = Config::default_path();
        assert!(path.is_ok());

        let path = path.unwrap();
        assert!(path.to_string_lossy().contains("tunnelmon"));
        assert!(path.to_string_lossy().contains("config.yaml"));
    }

    #[test]
    fn test_config_load_missing() -> Result<()> {
        // Loading a non-existent config returns defaults
        let config = Config::load(Some("/nonexistent/config.yaml".into()))?;
        assert_eq!(config.check_interval, 300);

        Ok(())
    }

    #[test]
    fn test_config_save_load() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let config_path = temp_dir.path().join("config.yaml");

        let original_config = Config {
            check_interval: 42,
            auto_restart: false,
            ..Config::default()
        };

        original_config.save(config_path.clone())?;

        let loaded_config = Config::load(Some(config_path))?;

        assert_eq!(loaded_config.check_interval, 42);
        assert!(!loaded_config.auto_restart);
        assert_eq!(
            loaded_config.max_restart_attempts,
            original_config.max_restart_attempts
        );

        Ok(())
    }

    #[test]
    fn test_config_merge_fills_missing_and_ignores_unknown_keys() {
        // A file from an older (or newer) version: partial keys plus one
        // this version has never heard of
        let yaml = r#"
check_interval: 60
unknown_future_tunable: true
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.check_interval, 60);
        // Missing keys are filled from defaults
        assert!(config.auto_restart);
        assert_eq!(config.restart_window_seconds, 900);
        assert!(!config.critical_patterns.is_empty());
    }

    #[test]
    fn test_journal_lookback_follows_check_interval() {
        let mut config = Config::default();
        config.check_interval = 120;
        config.journal_since_seconds = 0;
        assert_eq!(config.journal_lookback(), std::time::Duration::from_secs(120));

        config.journal_since_seconds = 45;
        assert_eq!(config.journal_lookback(), std::time::Duration::from_secs(45));
    }

    #[test]
    fn test_tracing_level_parsing() {
        let mut config = Config::default();
        assert_eq!(config.tracing_level(), tracing::Level::INFO);

        config.log_level = "debug".to_string();
        assert_eq!(config.tracing_level(), tracing::Level::DEBUG);

        config.log_level = "not-a-level".to_string();
        assert_eq!(config.tracing_level(), tracing::Level::INFO);
    }
}
