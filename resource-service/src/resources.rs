use resource_cache::{CacheConnector, CacheManager, RedisConnector};
use metrics_exporter_prometheus::PrometheusHandle;
use resource_common::health::ReadinessStatus;
use resource_common::metrics::setup_metrics_recorder;
use resource_common::LifecycleResult;
use resource_pool::{PoolConnector, PoolManager, PostgresConnector};
use tracing::error;

use crate::config::Config;

/// The shared resources of the process, built once at startup and passed to whoever needs them.
pub struct Resources<P: PoolConnector = PostgresConnector, C: CacheConnector = RedisConnector> {
    pub pool: PoolManager<P>,
    pub cache: CacheManager<C>,
}

impl Resources {
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            PoolManager::postgres(config.pool.clone()),
            CacheManager::redis(config.cache.clone()),
        )
    }
}

impl<P: PoolConnector, C: CacheConnector> Resources<P, C> {
    pub fn new(pool: PoolManager<P>, cache: CacheManager<C>) -> Self {
        Self { pool, cache }
    }

    /// Initialize both resources up front instead of on first use.
    pub async fn warm(&self) -> LifecycleResult<()> {
        self.pool.get_pool().await?;
        self.cache.get_client().await?;
        Ok(())
    }

    /// Install the process' metrics recorder, then warm both resources so their
    /// initialization is recorded by it.
    pub async fn start(&self) -> eyre::Result<PrometheusHandle> {
        let recorder_handle = setup_metrics_recorder()?;

        if let Err(e) = self.warm().await {
            error!("failed to initialize resources: {}", e);
            return Err(e.into());
        }

        Ok(recorder_handle)
    }

    pub fn readiness(&self) -> ReadinessStatus {
        ReadinessStatus::from_states([
            (resource_pool::RESOURCE, self.pool.state()),
            (resource_cache::RESOURCE, self.cache.state()),
        ])
    }

    /// Shut both resources down. Both are always attempted; the first error is returned.
    pub async fn shutdown(&self) -> LifecycleResult<()> {
        let (pool, cache) = tokio::join!(self.pool.shutdown(), self.cache.shutdown());

        for result in [&pool, &cache] {
            if let Err(e) = result {
                error!("failed to shut down resource: {}", e);
            }
        }

        pool.and(cache)
    }
}
