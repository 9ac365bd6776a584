use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - Poller limits, query timeout and policy overrides are non-zero
/// - Cache base URL is set
/// - Provider defaults name a provider
/// - Volcengine credentials are present when the section exists
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    let orchestrator = &config.orchestrator;
    if orchestrator.max_concurrent_pollers == 0 {
        return Err(ConfigError::ValidationError(
            "orchestrator.max_concurrent_pollers cannot be 0".to_string(),
        ));
    }
    if orchestrator.query_timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "orchestrator.query_timeout_secs cannot be 0".to_string(),
        ));
    }
    if orchestrator.submit_timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "orchestrator.submit_timeout_secs cannot be 0".to_string(),
        ));
    }
    for (kind, policy) in &orchestrator.policies {
        if policy.poll_interval_ms == Some(0) || policy.max_wait_ms == Some(0) {
            return Err(ConfigError::ValidationError(format!(
                "orchestrator.policies.{} values cannot be 0",
                kind
            )));
        }
    }

    if config.storage.base_url.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "storage.base_url cannot be empty".to_string(),
        ));
    }

    for (kind, default) in &config.providers.defaults {
        if default.provider.trim().is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "providers.defaults.{}.provider cannot be empty",
                kind
            )));
        }
    }

    if let Some(ref tts) = config.providers.volcengine_tts {
        if tts.app_id.is_empty() || tts.access_key.is_empty() {
            return Err(ConfigError::ValidationError(
                "providers.volcengine_tts requires app_id and access_key".to_string(),
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_config_from_str;

    #[test]
    fn test_validate_default_config() {
        assert!(validate_config(&Config::default()).is_ok());
    }

    #[test]
    fn test_validate_port_zero_fails() {
        let mut config = Config::default();
        config.server.port = 0;
        let err = validate_config(&config).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_validate_zero_pollers_fails() {
        let mut config = Config::default();
        config.orchestrator.max_concurrent_pollers = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_zero_submit_timeout_fails() {
        let mut config = Config::default();
        config.orchestrator.submit_timeout_secs = 0;
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("submit_timeout_secs"));
    }

    #[test]
    fn test_validate_zero_policy_interval_fails() {
        let config = load_config_from_str(
            r#"
[orchestrator.policies.video_merge]
poll_interval_ms = 0
"#,
        )
        .unwrap();
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("video_merge"));
    }

    #[test]
    fn test_validate_missing_tts_credentials_fails() {
        let config = load_config_from_str(
            r#"
[providers.volcengine_tts]
app_id = "app"
access_key = ""
"#,
        )
        .unwrap();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_empty_default_provider_fails() {
        let config = load_config_from_str(
            r#"
[providers.defaults.voice_clone]
provider = " "
"#,
        )
        .unwrap();
        assert!(validate_config(&config).is_err());
    }
}
