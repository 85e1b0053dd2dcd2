use anyhow::{Context, Result};
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub json_rpc_urls: Vec<String>,
    pub database_url: String,
    pub rpc_max_retries: usize,

    pub head_poll_interval: Duration,
    pub head_fetch_retries: usize,
    pub listener_heal_depth: u64,

    pub backfill_start_block: Option<u64>,
    pub backfill_heal_depth: u64,
    pub backfill_delay: Duration,
    pub retry_delay: Duration,

    pub plain_update_interval: Duration,
    pub contract_update_interval: Duration,
    pub log_window_size: u64,
    pub log_fetch_retries: usize,
    pub holder_refresh_concurrency: usize,

    pub fee_interval: Duration,
    pub fee_freshness: Duration,
    pub fee_start_block: Option<u64>,

    pub stats_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            json_rpc_urls: Vec::new(),
            database_url: "sqlite:./chain-mirror.db".to_string(),
            rpc_max_retries: 3,
            head_poll_interval: Duration::from_secs(5),
            head_fetch_retries: 5,
            listener_heal_depth: 10,
            backfill_start_block: None,
            backfill_heal_depth: 100,
            backfill_delay: Duration::from_millis(200),
            retry_delay: Duration::from_secs(5),
            plain_update_interval: Duration::from_secs(300),
            contract_update_interval: Duration::from_secs(600),
            // Most public RPCs allow up to 1k logs per request
            log_window_size: 1000,
            log_fetch_retries: 3,
            holder_refresh_concurrency: 8,
            fee_interval: Duration::from_secs(60),
            fee_freshness: Duration::from_secs(60),
            fee_start_block: None,
            stats_interval: Duration::from_secs(300),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        let defaults = Config::default();

        let urls = std::env::var("JSON_RPC_URLS")
            .or_else(|_| std::env::var("JSON_RPC_URL"))
            .context("JSON_RPC_URLS must be set in .env")?;
        let json_rpc_urls: Vec<String> = urls
            .split(',')
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty())
            .collect();
        if json_rpc_urls.is_empty() {
            anyhow::bail!("JSON_RPC_URLS contains no usable endpoint");
        }

        let database_url =
            std::env::var("DATABASE_URL").unwrap_or_else(|_| defaults.database_url.clone());

        Ok(Config {
            json_rpc_urls,
            database_url,
            rpc_max_retries: env_or("RPC_MAX_RETRIES", defaults.rpc_max_retries)?,
            head_poll_interval: secs_or("HEAD_POLL_INTERVAL_SECS", defaults.head_poll_interval)?,
            head_fetch_retries: env_or("HEAD_FETCH_RETRIES", defaults.head_fetch_retries)?,
            listener_heal_depth: env_or("LISTENER_HEAL_DEPTH", defaults.listener_heal_depth)?,
            backfill_start_block: env_opt("BACKFILL_START_BLOCK")?,
            backfill_heal_depth: env_or("BACKFILL_HEAL_DEPTH", defaults.backfill_heal_depth)?,
            backfill_delay: millis_or("BACKFILL_DELAY_MS", defaults.backfill_delay)?,
            retry_delay: secs_or("RETRY_DELAY_SECS", defaults.retry_delay)?,
            plain_update_interval: secs_or(
                "PLAIN_UPDATE_INTERVAL_SECS",
                defaults.plain_update_interval,
            )?,
            contract_update_interval: secs_or(
                "CONTRACT_UPDATE_INTERVAL_SECS",
                defaults.contract_update_interval,
            )?,
            log_window_size: env_or("LOG_WINDOW_SIZE", defaults.log_window_size)?,
            log_fetch_retries: env_or("LOG_FETCH_RETRIES", defaults.log_fetch_retries)?,
            holder_refresh_concurrency: env_or(
                "HOLDER_REFRESH_CONCURRENCY",
                defaults.holder_refresh_concurrency,
            )?,
            fee_interval: secs_or("FEE_INTERVAL_SECS", defaults.fee_interval)?,
            fee_freshness: secs_or("FEE_FRESHNESS_SECS", defaults.fee_freshness)?,
            fee_start_block: env_opt("FEE_START_BLOCK")?,
            stats_interval: secs_or("STATS_INTERVAL_SECS", defaults.stats_interval)?,
        })
    }
}

fn env_opt<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => {
            let value = raw
                .trim()
                .parse::<T>()
                .with_context(|| format!("Invalid {key} value: {raw}"))?;
            Ok(Some(value))
        }
        Err(_) => Ok(None),
    }
}

fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    Ok(env_opt(key)?.unwrap_or(default))
}

fn secs_or(key: &str, default: Duration) -> Result<Duration> {
    Ok(env_opt::<u64>(key)?
        .map(Duration::from_secs)
        .unwrap_or(default))
}

fn millis_or(key: &str, default: Duration) -> Result<Duration> {
    Ok(env_opt::<u64>(key)?
        .map(Duration::from_millis)
        .unwrap_or(default))
}
