use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - Backend URL is an absolute http(s) URL
/// - Poll intervals and the extraction timeout are non-zero
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    match reqwest::Url::parse(&config.backend.url) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => {}
        Ok(url) => {
            return Err(ConfigError::ValidationError(format!(
                "backend.url must use http or https, got '{}'",
                url.scheme()
            )));
        }
        Err(e) => {
            return Err(ConfigError::ValidationError(format!(
                "backend.url is not a valid URL: {}",
                e
            )));
        }
    }

    let orchestrator = &config.orchestrator;
    if orchestrator.job_poll_interval_ms == 0 {
        return Err(ConfigError::ValidationError(
            "orchestrator.job_poll_interval_ms cannot be 0".to_string(),
        ));
    }
    if orchestrator.match_poll_interval_ms == 0 {
        return Err(ConfigError::ValidationError(
            "orchestrator.match_poll_interval_ms cannot be 0".to_string(),
        ));
    }
    if orchestrator.extraction_start_timeout_ms == 0 {
        return Err(ConfigError::ValidationError(
            "orchestrator.extraction_start_timeout_ms cannot be 0".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_valid_config() {
        let config = Config::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_port_zero_fails() {
        let mut config = Config::default();
        config.server.port = 0;
        let result = validate_config(&config);
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_validate_bad_backend_url_fails() {
        let mut config = Config::default();
        config.backend.url = "not a url".to_string();
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::ValidationError(_))
        ));

        config.backend.url = "ftp://files.example.edu".to_string();
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("http or https"));
    }

    #[test]
    fn test_validate_zero_interval_fails() {
        let mut config = Config::default();
        config.orchestrator.match_poll_interval_ms = 0;
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("match_poll_interval_ms"));
    }
}
