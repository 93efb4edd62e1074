use crate::types::FetchConfig;
use std::env;
use std::time::Duration;

/// Process-level configuration, read once at startup from the environment.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub update_interval: Duration,
    pub fetch: FetchConfig,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let database_url =
            env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://pagefeed.db".to_string());

        let update_interval = env::var("PAGEFEED_UPDATE_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(3600));

        let mut fetch = FetchConfig::default();
        if let Ok(user_agent) = env::var("PAGEFEED_USER_AGENT") {
            fetch.user_agent = user_agent;
        }

        Self {
            database_url,
            update_interval,
            fetch,
        }
    }
}
