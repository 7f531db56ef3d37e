//! Lifecycle manager for the shared relational-database connection pool.

pub mod config;
pub mod connector;
pub mod manager;

pub use config::{PoolConfig, PoolSettings};
pub use connector::{PoolConnector, PostgresConnector};
pub use manager::PoolManager;

/// Name this resource is reported under in logs, errors and metrics.
pub const RESOURCE: &str = "postgres";
