use std::sync::Arc;

use resource_common::metrics::{record_reset, record_shutdown};
use resource_common::{
    LifecycleError, LifecycleResult, OnInitFailure, ResourceCell, ResourceState, Terminate,
};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::CacheConfig;
use crate::connector::{CacheConnector, RedisConnector};
use crate::RESOURCE;

/// Owns the process' single client to the key-value cache.
///
/// Unlike the pool manager, a cache that cannot be reached at startup is fatal: the failure
/// is handed to the process terminator instead of being returned to the caller.
/// After `shutdown` the manager stays closed.
pub struct CacheManager<C: CacheConnector = RedisConnector> {
    config: CacheConfig,
    connector: Arc<C>,
    cell: ResourceCell<C::Client>,
}

impl CacheManager<RedisConnector> {
    pub fn redis(config: CacheConfig) -> Self {
        Self::new(config, RedisConnector)
    }
}

impl<C: CacheConnector> CacheManager<C> {
    pub fn new(config: CacheConfig, connector: C) -> Self {
        Self {
            config,
            connector: Arc::new(connector),
            cell: ResourceCell::new(RESOURCE, OnInitFailure::TerminateProcess),
        }
    }

    pub fn with_terminator(mut self, terminator: Arc<dyn Terminate>) -> Self {
        self.cell = self.cell.with_terminator(terminator);
        self
    }

    /// Return the shared client, initializing it on first use.
    ///
    /// Never returns an initialization failure: those end the process. The only error a
    /// caller can observe is `LifecycleError::Closed` after shutdown.
    pub async fn get_client(&self) -> LifecycleResult<Arc<C::Client>> {
        self.cell
            .get_or_init(|| initialize(self.config.clone(), self.connector.clone()))
            .await
    }

    /// Flush every key in the store behind `client`, bounded by the reset timeout.
    pub async fn reset(&self, client: &C::Client) -> LifecycleResult<()> {
        let reset_timeout = self.config.reset_timeout();

        let result = match timeout(reset_timeout, self.connector.flush_all(client)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e @ LifecycleError::Operation { .. })) => Err(e),
            Ok(Err(e)) => Err(LifecycleError::operation(RESOURCE, "reset", e)),
            Err(_) => Err(LifecycleError::operation(
                RESOURCE,
                "reset",
                format!("no response within {:?}", reset_timeout),
            )),
        };

        match &result {
            Ok(()) => {
                record_reset(RESOURCE, "success");
                info!(resource = RESOURCE, "cache reset");
            }
            Err(_) => record_reset(RESOURCE, "error"),
        }
        result
    }

    /// Close the client. Calling this before the client exists, or more than once, is a no-op.
    pub async fn shutdown(&self) -> LifecycleResult<()> {
        let Some(client) = self.cell.close().await else {
            debug!(resource = RESOURCE, "no open client to close");
            return Ok(());
        };

        info!(resource = RESOURCE, "closing cache client");
        match self.connector.close(&client).await {
            Ok(()) => {
                record_shutdown(RESOURCE, "success");
                Ok(())
            }
            Err(e) => {
                record_shutdown(RESOURCE, "error");
                Err(LifecycleError::operation(RESOURCE, "shutdown", e))
            }
        }
    }

    pub fn state(&self) -> ResourceState {
        self.cell.state()
    }

    pub fn policy(&self) -> OnInitFailure {
        self.cell.policy()
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }
}

async fn initialize<C: CacheConnector>(
    config: CacheConfig,
    connector: Arc<C>,
) -> LifecycleResult<C::Client> {
    let settings = config.settings()?;

    info!(
        resource = RESOURCE,
        address = %settings.address(),
        db = settings.db,
        timeout = ?settings.timeout,
        pool_size = ?settings.pool_size,
        max_retries = ?settings.max_retries,
        "connecting to cache"
    );

    // Each dial is bounded by the connector's own connection timeout.
    let client = connector.connect(&settings).await?;

    let check = match timeout(settings.timeout, connector.ping(&client)).await {
        Ok(result) => result,
        Err(_) => Err(LifecycleError::connectivity(
            RESOURCE,
            format!("no response within {:?}", settings.timeout),
        )),
    };
    if let Err(e) = check {
        if let Err(close_error) = connector.close(&client).await {
            warn!(resource = RESOURCE, "failed to release unverified client: {}", close_error);
        }
        return Err(e);
    }

    Ok(client)
}
