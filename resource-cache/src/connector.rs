use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use resource_common::{LifecycleError, LifecycleResult};

use crate::config::CacheSettings;
use crate::RESOURCE;

/// Opens, probes, flushes and releases a cache client.
///
/// The manager decides when each step runs and bounds it in time; implementations only
/// talk to the store.
#[async_trait]
pub trait CacheConnector: Send + Sync + 'static {
    type Client: Send + Sync + 'static;

    async fn connect(&self, settings: &CacheSettings) -> LifecycleResult<Self::Client>;

    async fn ping(&self, client: &Self::Client) -> LifecycleResult<()>;

    /// Remove every key from every logical database of the store.
    async fn flush_all(&self, client: &Self::Client) -> LifecycleResult<()>;

    async fn close(&self, client: &Self::Client) -> LifecycleResult<()>;
}

/// A small round-robin pool of multiplexed, self-reconnecting redis connections.
///
/// Closing drops the pooled connections, so their sockets are released even while
/// other holders of the cache are still alive. Connections handed out earlier keep
/// their socket until they are dropped.
pub struct RedisCache {
    connections: RwLock<Vec<ConnectionManager>>,
    next: AtomicUsize,
}

impl RedisCache {
    fn new(connections: Vec<ConnectionManager>) -> Self {
        Self {
            connections: RwLock::new(connections),
            next: AtomicUsize::new(0),
        }
    }

    /// Hand out the next connection. Clones share the underlying socket.
    pub fn connection(&self) -> LifecycleResult<ConnectionManager> {
        let connections = self
            .connections
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        if connections.is_empty() {
            return Err(LifecycleError::Closed(RESOURCE));
        }

        let index = self.next.fetch_add(1, Ordering::Relaxed) % connections.len();
        Ok(connections[index].clone())
    }

    /// Number of pooled connections; zero once closed.
    pub fn pool_size(&self) -> usize {
        self.connections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_closed(&self) -> bool {
        self.pool_size() == 0
    }

    fn close(&self) {
        self.connections
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RedisConnector;

impl RedisConnector {
    fn manager_config(settings: &CacheSettings) -> ConnectionManagerConfig {
        let config = ConnectionManagerConfig::new()
            .set_connection_timeout(settings.timeout)
            .set_response_timeout(settings.timeout);

        match settings.max_retries {
            Some(retries) => config.set_number_of_retries(retries),
            None => config,
        }
    }
}

#[async_trait]
impl CacheConnector for RedisConnector {
    type Client = RedisCache;

    async fn connect(&self, settings: &CacheSettings) -> LifecycleResult<RedisCache> {
        let client = redis::Client::open(settings.connection_url()?.as_str())
            .map_err(|e| LifecycleError::Configuration(format!("invalid cache address: {e}")))?;

        let size = settings.pool_size.unwrap_or(1);
        let mut connections = Vec::with_capacity(size);
        for _ in 0..size {
            let connection =
                ConnectionManager::new_with_config(client.clone(), Self::manager_config(settings))
                    .await
                    .map_err(|e| LifecycleError::connectivity(RESOURCE, e))?;
            connections.push(connection);
        }

        Ok(RedisCache::new(connections))
    }

    async fn ping(&self, client: &RedisCache) -> LifecycleResult<()> {
        let mut conn = client.connection()?;
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map(|_| ())
            .map_err(|e| LifecycleError::connectivity(RESOURCE, e))
    }

    async fn flush_all(&self, client: &RedisCache) -> LifecycleResult<()> {
        let mut conn = client.connection()?;
        redis::cmd("FLUSHALL")
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| LifecycleError::operation(RESOURCE, "reset", e))
    }

    async fn close(&self, client: &RedisCache) -> LifecycleResult<()> {
        client.close();
        Ok(())
    }
}

#[cfg(any(test, feature = "test-utils"))]
pub use mock::{MockBehavior, MockCache, MockCacheConnector};

#[cfg(any(test, feature = "test-utils"))]
mod mock {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use resource_common::{LifecycleError, LifecycleResult};

    use super::CacheConnector;
    use crate::config::CacheSettings;
    use crate::RESOURCE;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum MockBehavior {
        Succeed,
        Refuse,
        /// Never answers; only a timeout ends the call.
        Hang,
    }

    /// An in-memory key-value store standing in for a cache client.
    #[derive(Debug)]
    pub struct MockCache {
        pub settings: CacheSettings,
        entries: Mutex<HashMap<String, String>>,
        closed: AtomicBool,
    }

    impl MockCache {
        pub fn set(&self, key: &str, value: &str) {
            self.entries
                .lock()
                .unwrap()
                .insert(key.to_owned(), value.to_owned());
        }

        pub fn exists(&self, key: &str) -> bool {
            self.entries.lock().unwrap().contains_key(key)
        }

        pub fn len(&self) -> usize {
            self.entries.lock().unwrap().len()
        }

        pub fn is_empty(&self) -> bool {
            self.len() == 0
        }

        pub fn is_closed(&self) -> bool {
            self.closed.load(Ordering::SeqCst)
        }
    }

    #[derive(Debug)]
    pub struct MockCacheConnector {
        ping: MockBehavior,
        flush: MockBehavior,
        ping_delay: Duration,
        connect_delay: Duration,
        connects: AtomicUsize,
        pings: AtomicUsize,
        closes: AtomicUsize,
    }

    impl MockCacheConnector {
        pub fn new(ping: MockBehavior) -> Self {
            Self {
                ping,
                flush: MockBehavior::Succeed,
                ping_delay: Duration::ZERO,
                connect_delay: Duration::ZERO,
                connects: AtomicUsize::new(0),
                pings: AtomicUsize::new(0),
                closes: AtomicUsize::new(0),
            }
        }

        pub fn with_flush(mut self, flush: MockBehavior) -> Self {
            self.flush = flush;
            self
        }

        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.ping_delay = delay;
            self
        }

        pub fn with_connect_delay(mut self, delay: Duration) -> Self {
            self.connect_delay = delay;
            self
        }

        pub fn connects(&self) -> usize {
            self.connects.load(Ordering::SeqCst)
        }

        pub fn pings(&self) -> usize {
            self.pings.load(Ordering::SeqCst)
        }

        pub fn closes(&self) -> usize {
            self.closes.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CacheConnector for MockCacheConnector {
        type Client = MockCache;

        async fn connect(&self, settings: &CacheSettings) -> LifecycleResult<MockCache> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.connect_delay).await;
            Ok(MockCache {
                settings: settings.clone(),
                entries: Mutex::new(HashMap::new()),
                closed: AtomicBool::new(false),
            })
        }

        async fn ping(&self, _client: &MockCache) -> LifecycleResult<()> {
            self.pings.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.ping_delay).await;
            match self.ping {
                MockBehavior::Succeed => Ok(()),
                MockBehavior::Refuse => Err(LifecycleError::connectivity(
                    RESOURCE,
                    "connection refused",
                )),
                MockBehavior::Hang => std::future::pending().await,
            }
        }

        async fn flush_all(&self, client: &MockCache) -> LifecycleResult<()> {
            match self.flush {
                MockBehavior::Succeed => {
                    client.entries.lock().unwrap().clear();
                    Ok(())
                }
                MockBehavior::Refuse => Err(LifecycleError::operation(
                    RESOURCE,
                    "reset",
                    "connection refused",
                )),
                MockBehavior::Hang => std::future::pending().await,
            }
        }

        async fn close(&self, client: &MockCache) -> LifecycleResult<()> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            client.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }
}
