//! conncache — reuse expensive remote connections instead of reopening them.
//!
//! Some servers release resources slowly when a client disconnects, so
//! opening a fresh session for every short unit of work piles up load on
//! the server. This crate keeps at most one idle connection per endpoint
//! identity and hands it to the next caller after a health check.
//!
//! - **cache**: [`ConnectionCache`], the single-slot-per-key store
//! - **key**: [`CacheKey`], the `(target, principal)` endpoint identity
//! - **connection**: [`Connection`] / [`Driver`] capability traits
//! - **provider**: [`ConnectionProvider`], cache-first `obtain` / `relinquish`
//! - **config**: [`SessionConfig`], session settings loaded from TOML
//! - **tcp**: [`TcpDriver`], plain-TCP sessions
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use conncache::{ConnectionProvider, SessionConfig, TcpDriver};
//!
//! # fn main() -> conncache::CacheResult<()> {
//! let config = SessionConfig::default();
//! let provider = ConnectionProvider::new(Arc::new(TcpDriver::from_config(&config)), config);
//!
//! let conn = provider.obtain("db://127.0.0.1:1521", Some("scott"), Some("tiger"))?;
//! // ... use the connection ...
//! provider.relinquish("db://127.0.0.1:1521", Some("scott"), conn)?;
//!
//! // Closes whatever is still cached.
//! provider.cache().shutdown();
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod connection;
pub mod error;
pub mod key;
pub mod provider;
pub mod tcp;

#[cfg(test)]
pub(crate) mod mock;

pub use cache::{CacheStats, ConnectionCache};
pub use config::{ReconfigurePolicy, SessionConfig};
pub use connection::{Connection, Driver, IsolationLevel};
pub use error::{CacheError, CacheResult, DriverError};
pub use key::CacheKey;
pub use provider::ConnectionProvider;
pub use tcp::{TcpConnection, TcpDriver, TcpTarget};
