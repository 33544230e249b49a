use fleetmon_api::{DEFAULT_LIST_LIMIT, MAX_LIST_LIMIT};
use serde::Serialize;
use std::time::Duration;

pub const CONFIG_SCHEMA_VERSION: &str = "1";

#[derive(Debug, Clone, Serialize)]
pub struct ApiConfig {
    pub max_body_bytes: usize,
    pub request_timeout: Duration,
    pub default_list_limit: usize,
    pub max_list_limit: usize,
    /// Rebuild reference data for every tenant on this cadence; `None`
    /// disables the background loop and builds happen on demand only.
    pub rebuild_interval: Option<Duration>,
    pub drain_grace: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: 256 * 1024,
            request_timeout: Duration::from_secs(10),
            default_list_limit: DEFAULT_LIST_LIMIT,
            max_list_limit: MAX_LIST_LIMIT,
            rebuild_interval: Some(Duration::from_secs(300)),
            drain_grace: Duration::from_secs(5),
        }
    }
}

pub fn validate_startup_config_contract(api: &ApiConfig) -> Result<(), String> {
    if api.max_body_bytes == 0 {
        return Err("max_body_bytes must be > 0".to_string());
    }
    if api.request_timeout.is_zero() {
        return Err("request_timeout must be > 0".to_string());
    }
    if api.default_list_limit == 0 || api.max_list_limit == 0 {
        return Err("list limits must be > 0".to_string());
    }
    if api.default_list_limit > api.max_list_limit {
        return Err("default_list_limit must not exceed max_list_limit".to_string());
    }
    if let Some(interval) = api.rebuild_interval {
        if interval < Duration::from_secs(1) {
            return Err("rebuild_interval must be at least 1s".to_string());
        }
    }
    Ok(())
}
