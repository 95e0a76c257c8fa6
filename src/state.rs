use std::sync::Arc;

use crate::config::Config;
use crate::search::pipeline::QueryService;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub service: Arc<QueryService>,
}

impl AppState {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        // Ensure data directories exist
        std::fs::create_dir_all(config.query_cache_dir())?;

        let http_client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(10))
            .timeout(std::time::Duration::from_secs(120))
            .build()?;

        let service = QueryService::from_config(&config, http_client)?;

        Ok(Self {
            config: Arc::new(config),
            service: Arc::new(service),
        })
    }

    /// State around an already-built service (tests inject fake upstreams).
    pub fn with_service(config: Config, service: QueryService) -> Self {
        Self {
            config: Arc::new(config),
            service: Arc::new(service),
        }
    }
}
