//! Lifecycle manager for the shared key-value cache client.

pub mod config;
pub mod connector;
pub mod manager;

pub use config::{CacheConfig, CacheSettings};
pub use connector::{CacheConnector, RedisCache, RedisConnector};
pub use manager::CacheManager;

/// Name this resource is reported under in logs, errors and metrics.
pub const RESOURCE: &str = "redis";
