//! # Armature HBase
//!
//! HBase connection pooling for Armature applications.
//!
//! HBase connections are heavyweight: each one owns ZooKeeper sessions and
//! its own client thread pool. This crate keeps a bounded set of them and
//! lends them to request handlers.
//!
//! ## Features
//!
//! - **Bounded Pool**: Idle/active registries with a hard `max_size`
//! - **Blocking Acquire with Deadlines**: Saturated callers wait, optionally with a timeout
//! - **Health Detection**: Background eviction of connections that report closed
//! - **Pluggable Factory**: Any client library behind the [`ConnectionFactory`] trait
//! - **DI Integration**: [`PoolProvider`] builds one shared pool on first use
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use armature_hbase::{ConnectionPool, HBaseConfig, PoolConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cluster = HBaseConfig::from_env()?;
//!     let factory = MyHBaseFactory::new(cluster.to_properties());
//!
//!     let pool = ConnectionPool::new(PoolConfig::new(5, 20), factory).await?;
//!
//!     // Explicit checkout / check-in
//!     let conn = pool.acquire().await?;
//!     let tables = conn.list_tables().await?;
//!     pool.release(conn.id()).await?;
//!
//!     // Scoped
//!     let row = pool
//!         .with_connection(|conn| async move { conn.get("users", "row-1").await })
//!         .await??;
//!
//!     pool.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## With Dependency Injection
//!
//! ```rust,ignore
//! use armature::prelude::*;
//! use armature_hbase::{PoolProvider, PoolConfig};
//!
//! #[module]
//! struct HBaseModule;
//!
//! #[module_impl]
//! impl HBaseModule {
//!     #[provider(singleton)]
//!     fn hbase_pools() -> Arc<PoolProvider<MyHBaseFactory>> {
//!         Arc::new(PoolProvider::new(MyHBaseFactory::from_env()))
//!     }
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod config;
mod connection;
mod entity;
mod error;
mod health;
mod pool;
mod provider;
mod registry;
mod stats;

pub use config::{HBaseConfig, PoolConfig, PoolConfigBuilder};
pub use connection::{connect_with_retry, Connection, ConnectionFactory};
pub use entity::{ConnectionEntity, ConnectionId, ConnectionStatus};
pub use error::{FactoryError, HBaseError, Result};
pub use pool::{ConnectionPool, PooledConnection};
pub use provider::PoolProvider;
pub use stats::{PoolStats, PoolStatus};

/// Prelude for common imports.
///
/// ```
/// use armature_hbase::prelude::*;
/// ```
pub mod prelude {
    pub use crate::config::{HBaseConfig, PoolConfig};
    pub use crate::connection::{Connection, ConnectionFactory};
    pub use crate::entity::ConnectionId;
    pub use crate::error::{FactoryError, HBaseError, Result};
    pub use crate::pool::{ConnectionPool, PooledConnection};
    pub use crate::provider::PoolProvider;
}
