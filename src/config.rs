use crate::error::{RelayError, Result};
use crate::fetch::{PageSizeTable, SelectionPolicy};
use std::env;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

const DEFAULT_LIST_URL: &str =
    "https://proxy.webshare.io/api/v2/proxy/list/?mode=direct&page_size=100";
const DEFAULT_INVENTORY_URL: &str = "http://steamcommunity.com/inventory";

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Listening server configuration
    pub server: ServerConfig,
    /// Upstream proxy provider configuration
    pub provider: ProviderConfig,
    /// Proxy pool lifecycle configuration
    pub pool: PoolConfig,
    /// Inventory fetch configuration
    pub fetch: FetchConfig,
    /// Logging configuration
    pub log: LogConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host to bind to (default: 127.0.0.1)
    pub host: String,
    /// Preferred port (default: 8000); another free port is chosen if taken
    pub port: u16,
    /// Bearer token; empty means one is generated at startup
    pub auth_token: String,
    /// Wall-clock budget for a single inventory request
    pub request_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// API key sent as `Authorization: Token <key>`
    pub api_key: String,
    /// Proxy list endpoint; `&page=n` is appended per page
    pub list_url: Url,
}

#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum age of a proxy snapshot before it is re-fetched
    pub refresh_interval: Duration,
    /// How long a quarantined proxy stays in the cooldown set
    pub cooldown_period: Duration,
    /// Whether re-quarantining an already cooled proxy resets its timestamp
    pub extend_cooldown: bool,
    /// Minimum gap between provider calls after a failed refresh, while a
    /// usable snapshot is still cached
    pub refresh_retry_backoff: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(12 * 60 * 60),
            cooldown_period: Duration::from_secs(30 * 60),
            extend_cooldown: false,
            refresh_retry_backoff: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Inventory endpoint base URL
    pub base_url: Url,
    /// Attempt budget for one fetch
    pub max_attempts: u32,
    /// Route selection policy across attempts
    pub selection_policy: SelectionPolicy,
    /// Timeout for a single HTTP call
    pub attempt_timeout: Duration,
    /// Item count per category
    pub page_sizes: PageSizeTable,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            base_url: Url::parse(DEFAULT_INVENTORY_URL).expect("default inventory URL is valid"),
            max_attempts: 20,
            selection_policy: SelectionPolicy::default(),
            attempt_timeout: Duration::from_secs(15),
            page_sizes: PageSizeTable::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Log level (debug, info, warn, error)
    pub level: String,
    /// Output format (json, pretty)
    pub format: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let api_key = get_env_or("WEBSHARE_API_KEY", "");
        if api_key.trim().is_empty() {
            return Err(RelayError::MissingEnvVar("WEBSHARE_API_KEY".into()));
        }

        let max_attempts: u32 = parse_env("FETCH_MAX_ATTEMPTS", "20")?;
        if max_attempts == 0 {
            return Err(RelayError::InvalidConfig(
                "FETCH_MAX_ATTEMPTS must be at least 1".into(),
            ));
        }

        let default_page_size: u32 = parse_env("FETCH_DEFAULT_PAGE_SIZE", "5000")?;

        Ok(Config {
            server: ServerConfig {
                host: get_env_or("SERVER_HOST", "127.0.0.1"),
                port: get_env_or("SERVER_PORT", "8000").parse().map_err(|_| {
                    RelayError::InvalidConfig("SERVER_PORT must be a valid port number".into())
                })?,
                auth_token: get_env_or("AUTH_TOKEN", "").trim().to_string(),
                request_timeout: Duration::from_secs(parse_env("REQUEST_TIMEOUT_SECS", "60")?),
            },
            provider: ProviderConfig {
                api_key: api_key.trim().to_string(),
                list_url: parse_url("WEBSHARE_LIST_URL", DEFAULT_LIST_URL)?,
            },
            pool: PoolConfig {
                refresh_interval: Duration::from_secs(parse_env(
                    "PROXY_REFRESH_INTERVAL_SECS",
                    "43200",
                )?),
                cooldown_period: Duration::from_secs(parse_env("PROXY_COOLDOWN_SECS", "1800")?),
                extend_cooldown: parse_env("PROXY_EXTEND_COOLDOWN", "false")?,
                refresh_retry_backoff: Duration::from_secs(parse_env(
                    "PROXY_REFRESH_RETRY_SECS",
                    "60",
                )?),
            },
            fetch: FetchConfig {
                base_url: parse_url("STEAM_INVENTORY_URL", DEFAULT_INVENTORY_URL)?,
                max_attempts,
                selection_policy: SelectionPolicy::from_str(&get_env_or(
                    "FETCH_SELECTION_POLICY",
                    "prefer_working",
                ))?,
                attempt_timeout: Duration::from_secs(parse_env("FETCH_ATTEMPT_TIMEOUT_SECS", "15")?),
                page_sizes: PageSizeTable::parse(
                    &get_env_or("FETCH_PAGE_SIZES", "440=3000"),
                    default_page_size,
                )?,
            },
            log: LogConfig {
                level: get_env_or("LOG_LEVEL", "info"),
                format: get_env_or("LOG_FORMAT", "pretty"),
            },
        })
    }

    /// Get the preferred listen address
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

fn parse_env<T: FromStr>(key: &str, default: &str) -> Result<T> {
    get_env_or(key, default)
        .trim()
        .parse()
        .map_err(|_| RelayError::InvalidConfig(format!("{} has an invalid value", key)))
}

fn parse_url(key: &str, default: &str) -> Result<Url> {
    let raw = get_env_or(key, default);
    let url = Url::parse(raw.trim())
        .map_err(|e| RelayError::InvalidConfig(format!("{} must be a valid URL: {}", key, e)))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(RelayError::InvalidConfig(format!(
            "{} has unsupported scheme: {}",
            key,
            url.scheme()
        )));
    }

    Ok(url)
}

/// Get environment variable with a default value
fn get_env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}
