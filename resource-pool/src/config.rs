use std::time::Duration;

use envconfig::Envconfig;
use resource_common::config::{duration_or, EnvMsDuration};
use resource_common::{LifecycleError, LifecycleResult};

pub const DEFAULT_MAX_OPEN_CONNECTIONS: u32 = 20;
pub const DEFAULT_MAX_IDLE_CONNECTIONS: u32 = 10;
pub const DEFAULT_CONN_MAX_LIFETIME: Duration = Duration::from_secs(60 * 60);
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(10 * 60);
pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// Pool settings as read from the environment. Unset numeric values are left at zero
/// and resolved to their defaults by `settings()`.
#[derive(Envconfig, Clone, Debug, Default)]
pub struct PoolConfig {
    #[envconfig(from = "DATABASE_URL", default = "")]
    pub database_url: String,

    #[envconfig(from = "DATABASE_MAX_OPEN_CONNECTIONS", default = "0")]
    pub max_open_connections: i64,

    #[envconfig(from = "DATABASE_MAX_IDLE_CONNECTIONS", default = "0")]
    pub max_idle_connections: i64,

    #[envconfig(from = "DATABASE_CONN_MAX_LIFETIME_MS")]
    pub conn_max_lifetime: Option<EnvMsDuration>,

    #[envconfig(from = "DATABASE_IDLE_TIMEOUT_MS")]
    pub idle_timeout: Option<EnvMsDuration>,

    #[envconfig(from = "DATABASE_ACQUIRE_TIMEOUT_MS")]
    pub acquire_timeout: Option<EnvMsDuration>,

    #[envconfig(from = "DATABASE_HEALTH_CHECK_TIMEOUT_MS")]
    pub health_check_timeout: Option<EnvMsDuration>,

    #[envconfig(from = "DATABASE_QUERY_DEBUG", default = "false")]
    pub query_debug: bool,
}

/// Effective pool tuning after defaults have been applied.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PoolSettings {
    pub database_url: String,
    pub max_open_connections: u32,
    /// Ceiling on idle connections. Never above `max_open_connections`.
    /// sqlx cannot cap the idle set directly; connections above `min_connections`
    /// are closed once they sit idle for `idle_timeout`.
    pub max_idle_connections: u32,
    /// Connections the pool opens ahead of demand and keeps while idle. Zero, so the pool
    /// connects lazily, unless `DATABASE_MAX_IDLE_CONNECTIONS` is set explicitly.
    pub min_connections: u32,
    pub conn_max_lifetime: Duration,
    pub idle_timeout: Duration,
    pub acquire_timeout: Duration,
    pub health_check_timeout: Duration,
    pub query_debug: bool,
}

impl PoolConfig {
    pub fn settings(&self) -> LifecycleResult<PoolSettings> {
        let database_url = self.database_url.trim();
        if database_url.is_empty() {
            return Err(LifecycleError::Configuration(
                "database connection string is empty".to_owned(),
            ));
        }

        let max_open_connections =
            positive_or(self.max_open_connections, DEFAULT_MAX_OPEN_CONNECTIONS);
        let max_idle_connections =
            positive_or(self.max_idle_connections, DEFAULT_MAX_IDLE_CONNECTIONS)
                .min(max_open_connections);
        let min_connections = if self.max_idle_connections > 0 {
            max_idle_connections
        } else {
            0
        };

        Ok(PoolSettings {
            database_url: database_url.to_owned(),
            max_open_connections,
            max_idle_connections,
            min_connections,
            conn_max_lifetime: duration_or(self.conn_max_lifetime, DEFAULT_CONN_MAX_LIFETIME),
            idle_timeout: duration_or(self.idle_timeout, DEFAULT_IDLE_TIMEOUT),
            acquire_timeout: duration_or(self.acquire_timeout, DEFAULT_ACQUIRE_TIMEOUT),
            health_check_timeout: duration_or(
                self.health_check_timeout,
                DEFAULT_HEALTH_CHECK_TIMEOUT,
            ),
            query_debug: self.query_debug,
        })
    }
}

fn positive_or(value: i64, default: u32) -> u32 {
    if value <= 0 {
        default
    } else {
        u32::try_from(value).unwrap_or(u32::MAX)
    }
}
