use dotenv::dotenv;
use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub rpc_url: String,
    pub rpc_url_backup: Option<Vec<String>>,
    pub rpc_max_retries: Option<usize>,
    pub rpc_retry_delay_ms: Option<u64>,
    pub block_engine_url: String,
    pub quote_api_url: String,
    pub total_retries: u32,
    pub signable_retries: u32,
    pub retry_base_delay_ms: u64,
    pub retry_backoff_multiplier: f64,
    pub confirm_poll_interval_ms: u64,
    pub confirm_timeout_ms: u64,
    pub default_compute_unit_limit: u32,
    pub price_cache_ttl_secs: u64,
    pub referred_by: Option<String>,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();
        Config {
            rpc_url: env::var("RPC_URL").unwrap_or_else(|_| "http://127.0.0.1:8899".to_string()),
            rpc_url_backup: env::var("RPC_URL_BACKUP")
                .ok()
                .map(|s| s.split(',').map(String::from).collect()),
            rpc_max_retries: env::var("RPC_MAX_RETRIES").ok().and_then(|v| v.parse().ok()),
            rpc_retry_delay_ms: env::var("RPC_RETRY_DELAY_MS")
                .ok()
                .and_then(|v| v.parse().ok()),
            block_engine_url: env::var("BLOCK_ENGINE_URL")
                .unwrap_or_else(|_| "https://mainnet.block-engine.jito.wtf".to_string()),
            quote_api_url: env::var("QUOTE_API_URL")
                .unwrap_or_else(|_| "https://quote-api.jup.ag/v6".to_string()),
            total_retries: env::var("TOTAL_RETRIES")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .unwrap_or(5),
            signable_retries: env::var("SIGNABLE_RETRIES")
                .unwrap_or_else(|_| "3".to_string())
                .parse()
                .unwrap_or(3),
            retry_base_delay_ms: env::var("RETRY_BASE_DELAY_MS")
                .unwrap_or_else(|_| "350".to_string())
                .parse()
                .unwrap_or(350),
            retry_backoff_multiplier: env::var("RETRY_BACKOFF_MULTIPLIER")
                .unwrap_or_else(|_| "2.0".to_string())
                .parse()
                .unwrap_or(2.0),
            confirm_poll_interval_ms: env::var("CONFIRM_POLL_INTERVAL_MS")
                .unwrap_or_else(|_| "500".to_string())
                .parse()
                .unwrap_or(500),
            confirm_timeout_ms: env::var("CONFIRM_TIMEOUT_MS")
                .unwrap_or_else(|_| "30000".to_string())
                .parse()
                .unwrap_or(30_000),
            default_compute_unit_limit: env::var("DEFAULT_COMPUTE_UNIT_LIMIT")
                .unwrap_or_else(|_| "1400000".to_string())
                .parse()
                .unwrap_or(1_400_000),
            price_cache_ttl_secs: env::var("PRICE_CACHE_TTL_SECS")
                .unwrap_or_else(|_| "3".to_string())
                .parse()
                .unwrap_or(3),
            referred_by: env::var("REFERRED_BY").ok(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rpc_url: "http://127.0.0.1:8899".to_string(),
            rpc_url_backup: None,
            rpc_max_retries: Some(3),
            rpc_retry_delay_ms: Some(250),
            block_engine_url: "https://mainnet.block-engine.jito.wtf".to_string(),
            quote_api_url: "https://quote-api.jup.ag/v6".to_string(),
            total_retries: 5,
            signable_retries: 3,
            retry_base_delay_ms: 350,
            retry_backoff_multiplier: 2.0,
            confirm_poll_interval_ms: 500,
            confirm_timeout_ms: 30_000,
            default_compute_unit_limit: 1_400_000,
            price_cache_ttl_secs: 3,
            referred_by: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.total_retries, 5);
        assert_eq!(config.signable_retries, 3);
        assert!(config.retry_backoff_multiplier > 1.0);
    }
}
