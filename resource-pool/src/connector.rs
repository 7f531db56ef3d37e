use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use log::LevelFilter;
use resource_common::{LifecycleError, LifecycleResult};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use sqlx::{ConnectOptions, Connection};

use crate::config::PoolSettings;
use crate::RESOURCE;

const SLOW_STATEMENT_THRESHOLD: Duration = Duration::from_secs(1);

/// Builds, probes and releases a connection pool for one database driver.
///
/// The manager owns when these run; implementations only describe how.
#[async_trait]
pub trait PoolConnector: Send + Sync + 'static {
    type Pool: Send + Sync + 'static;

    /// Construct the pool from tuned settings. Must not perform any network I/O.
    fn build(&self, settings: &PoolSettings) -> LifecycleResult<Self::Pool>;

    /// Verify that the pool can reach the database. Callers bound this with a timeout.
    async fn ping(&self, pool: &Self::Pool) -> LifecycleResult<()>;

    async fn close(&self, pool: &Self::Pool) -> LifecycleResult<()>;
}

/// PostgreSQL pools through sqlx.
#[derive(Debug, Default, Clone, Copy)]
pub struct PostgresConnector;

#[async_trait]
impl PoolConnector for PostgresConnector {
    type Pool = PgPool;

    fn build(&self, settings: &PoolSettings) -> LifecycleResult<PgPool> {
        let options = PgConnectOptions::from_str(&settings.database_url).map_err(|e| {
            LifecycleError::Configuration(format!("invalid database connection string: {e}"))
        })?;

        let options = if settings.query_debug {
            options
                .log_statements(LevelFilter::Info)
                .log_slow_statements(LevelFilter::Warn, SLOW_STATEMENT_THRESHOLD)
        } else {
            options.disable_statement_logging()
        };

        let pool = PgPoolOptions::new()
            .max_connections(settings.max_open_connections)
            .min_connections(settings.min_connections)
            .max_lifetime(settings.conn_max_lifetime)
            .idle_timeout(settings.idle_timeout)
            .acquire_timeout(settings.acquire_timeout)
            .test_before_acquire(true)
            .connect_lazy_with(options);

        Ok(pool)
    }

    async fn ping(&self, pool: &PgPool) -> LifecycleResult<()> {
        let mut conn = pool
            .acquire()
            .await
            .map_err(|e| LifecycleError::connectivity(RESOURCE, e))?;

        conn.ping()
            .await
            .map_err(|e| LifecycleError::connectivity(RESOURCE, e))
    }

    async fn close(&self, pool: &PgPool) -> LifecycleResult<()> {
        pool.close().await;
        Ok(())
    }
}

#[cfg(any(test, feature = "test-utils"))]
pub use mock::{MockPing, MockPool, MockPoolConnector};

#[cfg(any(test, feature = "test-utils"))]
mod mock {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use resource_common::{LifecycleError, LifecycleResult};

    use super::PoolConnector;
    use crate::config::PoolSettings;
    use crate::RESOURCE;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum MockPing {
        Succeed,
        Refuse,
        /// Never answers; only a timeout ends the probe.
        Hang,
    }

    #[derive(Debug)]
    pub struct MockPool {
        pub settings: PoolSettings,
        closed: AtomicBool,
    }

    impl MockPool {
        pub fn is_closed(&self) -> bool {
            self.closed.load(Ordering::SeqCst)
        }
    }

    /// A connector that counts its calls and never touches the network.
    #[derive(Debug)]
    pub struct MockPoolConnector {
        ping: MockPing,
        ping_delay: Duration,
        builds: AtomicUsize,
        pings: AtomicUsize,
        closes: AtomicUsize,
    }

    impl MockPoolConnector {
        pub fn new(ping: MockPing) -> Self {
            Self {
                ping,
                ping_delay: Duration::ZERO,
                builds: AtomicUsize::new(0),
                pings: AtomicUsize::new(0),
                closes: AtomicUsize::new(0),
            }
        }

        /// Delay the probe so concurrent callers pile up behind the first one.
        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.ping_delay = delay;
            self
        }

        pub fn builds(&self) -> usize {
            self.builds.load(Ordering::SeqCst)
        }

        pub fn pings(&self) -> usize {
            self.pings.load(Ordering::SeqCst)
        }

        pub fn closes(&self) -> usize {
            self.closes.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PoolConnector for MockPoolConnector {
        type Pool = MockPool;

        fn build(&self, settings: &PoolSettings) -> LifecycleResult<MockPool> {
            self.builds.fetch_add(1, Ordering::SeqCst);
            Ok(MockPool {
                settings: settings.clone(),
                closed: AtomicBool::new(false),
            })
        }

        async fn ping(&self, _pool: &MockPool) -> LifecycleResult<()> {
            self.pings.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.ping_delay).await;
            match self.ping {
                MockPing::Succeed => Ok(()),
                MockPing::Refuse => Err(LifecycleError::connectivity(
                    RESOURCE,
                    "connection refused",
                )),
                MockPing::Hang => std::future::pending().await,
            }
        }

        async fn close(&self, pool: &MockPool) -> LifecycleResult<()> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            pool.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }
}
