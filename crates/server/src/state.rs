use std::time::Duration;

use syllabus_core::{Config, SessionOrchestrator};

/// Shared application state
pub struct AppState {
    config: Config,
    orchestrator: SessionOrchestrator,
    /// Client used by the pass-through proxy.
    proxy_client: reqwest::Client,
}

impl AppState {
    pub fn new(config: Config, orchestrator: SessionOrchestrator) -> Result<Self, reqwest::Error> {
        // Proxied calls inherit the UI's own patience; extraction start can
        // legitimately take minutes.
        let proxy_timeout = Duration::from_secs(u64::from(config.backend.request_timeout_secs))
            .max(orchestrator.config().extraction_start_timeout());
        let proxy_client = reqwest::Client::builder()
            .timeout(proxy_timeout)
            .build()?;

        Ok(Self {
            config,
            orchestrator,
            proxy_client,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn orchestrator(&self) -> &SessionOrchestrator {
        &self.orchestrator
    }

    pub fn proxy_client(&self) -> &reqwest::Client {
        &self.proxy_client
    }

    /// Backend base URL without a trailing slash.
    pub fn backend_url(&self) -> &str {
        self.config.backend.url.trim_end_matches('/')
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use syllabus_core::testing::MockJobService;

    #[tokio::test]
    async fn test_new_builds_proxy_client() {
        let mut config = Config::default();
        config.backend.url = "http://analysis:8000/".to_string();
        let orchestrator = SessionOrchestrator::new(
            config.orchestrator.clone(),
            Arc::new(MockJobService::new()),
        );

        let state = AppState::new(config, orchestrator).unwrap();
        assert_eq!(state.backend_url(), "http://analysis:8000");
        assert_eq!(state.config().server.port, 3000);
    }
}
