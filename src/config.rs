use anyhow::{Context, Result, anyhow};
use std::{
    env,
    net::SocketAddr,
    time::Duration,
};

use crate::alerts::{AlertThresholds, Band, UnitThresholds};

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub bind_addr: SocketAddr,
    pub provider: ProviderConfig,
    pub store: StoreConfig,
    pub rate_limit: RateLimitConfig,
    pub cache: CacheTtls,
    pub alerts: AlertThresholds,
    pub cors_allow_origin: String,
}

#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub api_key: String,
    pub base_url: String,
    pub timeout: Duration,
    pub connect_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub backend: StoreBackendConfig,
    pub connect_timeout: Duration,
    pub op_timeout: Duration,
}

#[derive(Debug, Clone)]
pub enum StoreBackendConfig {
    Disabled,
    Memory,
    Redis { url: String },
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub limit: u64,
    pub window: Duration,
    pub exempt_prefixes: Vec<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct CacheTtls {
    pub current: Duration,
    pub forecast: Duration,
    pub alerts: Duration,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            current: Duration::from_secs(15 * 60),
            forecast: Duration::from_secs(60 * 60),
            alerts: Duration::from_secs(10 * 60),
        }
    }
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self> {
        let bind_addr = env::var("BIND_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:8080".to_string())
            .parse::<SocketAddr>()
            .context("invalid BIND_ADDR")?;

        let api_key = env::var("OPENWEATHER_API_KEY")
            .ok()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .ok_or_else(|| anyhow!("OPENWEATHER_API_KEY is required"))?;

        let provider = ProviderConfig {
            api_key,
            base_url: env::var("OPENWEATHER_BASE_URL")
                .unwrap_or_else(|_| "https://api.openweathermap.org".to_string())
                .trim_end_matches('/')
                .to_string(),
            timeout: Duration::from_millis(parse_env("PROVIDER_TIMEOUT_MS", 5_000u64).max(100)),
            connect_timeout: Duration::from_millis(
                parse_env("PROVIDER_CONNECT_TIMEOUT_MS", 3_000u64).max(100),
            ),
        };

        let redis_url = env::var("REDIS_URL")
            .ok()
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty());

        let default_backend = if redis_url.is_some() { "redis" } else { "none" };
        let backend = match env::var("STORE_BACKEND")
            .unwrap_or_else(|_| default_backend.to_string())
            .to_ascii_lowercase()
            .as_str()
        {
            "none" | "disabled" => StoreBackendConfig::Disabled,
            "memory" | "in_memory" => StoreBackendConfig::Memory,
            "redis" => StoreBackendConfig::Redis {
                url: redis_url.ok_or_else(|| anyhow!("STORE_BACKEND=redis requires REDIS_URL"))?,
            },
            other => return Err(anyhow!("unsupported STORE_BACKEND: {other}")),
        };

        let store = StoreConfig {
            backend,
            connect_timeout: Duration::from_millis(
                parse_env("STORE_CONNECT_TIMEOUT_MS", 3_000u64).max(50),
            ),
            op_timeout: Duration::from_millis(parse_env("STORE_OP_TIMEOUT_MS", 3_000u64).max(50)),
        };

        let rate_limit = RateLimitConfig {
            enabled: parse_env("RATE_LIMIT_ENABLED", true),
            limit: parse_env("RATE_LIMIT_MAX_REQUESTS", 3u64).max(1),
            window: Duration::from_secs(parse_env("RATE_LIMIT_WINDOW_SECONDS", 10u64).max(1)),
            exempt_prefixes: parse_csv("RATE_LIMIT_EXEMPT_PREFIXES", "/api/health"),
        };

        let defaults = CacheTtls::default();
        let cache = CacheTtls {
            current: ttl_from_env("CACHE_CURRENT_TTL_SECS", defaults.current),
            forecast: ttl_from_env("CACHE_FORECAST_TTL_SECS", defaults.forecast),
            alerts: ttl_from_env("CACHE_ALERTS_TTL_SECS", defaults.alerts),
        };

        let alerts = thresholds_from_env(AlertThresholds::default());
        let cors_allow_origin = env::var("CORS_ALLOW_ORIGIN").unwrap_or_else(|_| "*".to_string());

        Ok(Self {
            bind_addr,
            provider,
            store,
            rate_limit,
            cache,
            alerts,
            cors_allow_origin,
        })
    }
}

fn thresholds_from_env(defaults: AlertThresholds) -> AlertThresholds {
    let units = |suffix: &str, d: UnitThresholds| UnitThresholds {
        high_temp: band(&format!("ALERT_HIGH_TEMP_{suffix}"), d.high_temp),
        low_temp: band(&format!("ALERT_LOW_TEMP_{suffix}"), d.low_temp),
        high_wind: band(&format!("ALERT_HIGH_WIND_{suffix}"), d.high_wind),
    };

    AlertThresholds {
        metric: units("METRIC", defaults.metric),
        imperial: units("IMPERIAL", defaults.imperial),
    }
}

fn band(key: &str, default: Band) -> Band {
    Band {
        base: parse_env(key, default.base),
        severe: parse_env(&format!("{key}_SEVERE"), default.severe),
    }
}

fn ttl_from_env(key: &str, default: Duration) -> Duration {
    Duration::from_secs(parse_env(key, default.as_secs()).max(1))
}

fn parse_csv(key: &str, default: &str) -> Vec<String> {
    env::var(key)
        .unwrap_or_else(|_| default.to_string())
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

fn parse_env<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr,
{
    env::var(key)
        .ok()
        .and_then(|s| s.trim().parse::<T>().ok())
        .unwrap_or(default)
}
