use std::time::Duration;

use envconfig::Envconfig;
use resource_common::config::{duration_or, EnvMsDuration};
use resource_common::{LifecycleError, LifecycleResult};
use url::Url;

pub const DEFAULT_HOST: &str = "localhost:6379";
pub const DEFAULT_PORT: u16 = 6379;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_RESET_TIMEOUT: Duration = Duration::from_secs(5);

/// Cache client settings as read from the environment.
#[derive(Envconfig, Clone, Debug, Default)]
pub struct CacheConfig {
    #[envconfig(from = "REDIS_HOST", default = "localhost:6379")]
    pub host: String,

    #[envconfig(from = "REDIS_PASSWORD", default = "")]
    pub password: String,

    #[envconfig(from = "REDIS_INDEX_DB", default = "0")]
    pub index_db: i64,

    /// Shared by dial, read and write.
    #[envconfig(from = "REDIS_TIMEOUT_MS")]
    pub timeout: Option<EnvMsDuration>,

    #[envconfig(from = "REDIS_POOL_SIZE")]
    pub pool_size: Option<usize>,

    #[envconfig(from = "REDIS_MAX_RETRIES")]
    pub max_retries: Option<usize>,

    #[envconfig(from = "REDIS_RESET_TIMEOUT_MS")]
    pub reset_timeout: Option<EnvMsDuration>,
}

/// Effective client settings after defaults have been applied.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheSettings {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    pub db: i64,
    pub timeout: Duration,
    /// Number of multiplexed connections; `None` keeps the single connection the client opens by default.
    pub pool_size: Option<usize>,
    /// Reconnect attempts; `None` keeps the client library's default.
    pub max_retries: Option<usize>,
}

impl CacheConfig {
    pub fn settings(&self) -> LifecycleResult<CacheSettings> {
        let (host, port) = parse_address(&self.host)?;

        if self.index_db < 0 {
            return Err(LifecycleError::Configuration(format!(
                "cache logical database index must not be negative, got {}",
                self.index_db
            )));
        }

        Ok(CacheSettings {
            host,
            port,
            password: Some(self.password.clone()).filter(|p| !p.is_empty()),
            db: self.index_db,
            timeout: duration_or(self.timeout, DEFAULT_TIMEOUT),
            pool_size: self.pool_size.filter(|size| *size > 0),
            max_retries: self.max_retries,
        })
    }

    pub fn reset_timeout(&self) -> Duration {
        duration_or(self.reset_timeout, DEFAULT_RESET_TIMEOUT)
    }
}

impl CacheSettings {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Connection URL for the client. Credentials are percent-encoded; never log the result.
    pub fn connection_url(&self) -> LifecycleResult<Url> {
        let mut url = Url::parse(&format!("redis://{}/{}", self.address(), self.db))
            .map_err(|e| LifecycleError::Configuration(format!("invalid cache address: {e}")))?;

        if let Some(password) = &self.password {
            url.set_password(Some(password)).map_err(|_| {
                LifecycleError::Configuration("cache address cannot carry a password".to_owned())
            })?;
        }

        Ok(url)
    }
}

/// Split `host[:port]`, with or without a `redis://` scheme. Empty means the default address.
fn parse_address(raw: &str) -> LifecycleResult<(String, u16)> {
    let raw = raw.trim();
    let raw = if raw.is_empty() { DEFAULT_HOST } else { raw };
    let raw = raw.strip_prefix("redis://").unwrap_or(raw).trim_end_matches('/');

    let (host, port) = match raw.rsplit_once(':') {
        Some((host, port)) => {
            let port = port.parse::<u16>().map_err(|_| {
                LifecycleError::Configuration(format!("invalid cache port in address {raw}"))
            })?;
            (host, port)
        }
        None => (raw, DEFAULT_PORT),
    };

    if host.is_empty() {
        return Err(LifecycleError::Configuration(format!(
            "missing cache host in address {raw}"
        )));
    }

    Ok((host.to_owned(), port))
}
