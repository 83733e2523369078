//! Capability traits for connections and the drivers that open them.
//!
//! The cache only ever talks to a connection through [`Connection`], so any
//! session type (a database driver handle, a raw socket, a test double) can
//! be cached as long as it can report liveness, report read-only mode, reset
//! its transaction state, and close.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::DriverError;
use crate::key::CacheKey;

/// Transaction isolation level applied to freshly configured sessions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IsolationLevel {
    ReadUncommitted,
    /// Weakest level most servers support; enough for metadata queries.
    #[default]
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IsolationLevel::ReadUncommitted => write!(f, "read-uncommitted"),
            IsolationLevel::ReadCommitted => write!(f, "read-committed"),
            IsolationLevel::RepeatableRead => write!(f, "repeatable-read"),
            IsolationLevel::Serializable => write!(f, "serializable"),
        }
    }
}

/// A live session with a remote system.
///
/// Calls may block on network I/O. The cache never holds its lock while
/// calling any of these methods.
pub trait Connection: Send + 'static {
    /// Returns `Ok(false)` if the remote side has closed the session.
    /// `Err` is reserved for faults while checking.
    fn is_alive(&self) -> Result<bool, DriverError>;

    /// Whether the session is in read-only mode.
    fn is_read_only(&self) -> Result<bool, DriverError>;

    /// Roll back any pending transaction and clear warning/error state.
    fn reset_transaction_state(&mut self) -> Result<(), DriverError>;

    /// Set the transaction isolation level for the session.
    fn set_isolation_level(&mut self, _level: IsolationLevel) -> Result<(), DriverError> {
        Err(DriverError::Unsupported("transaction isolation level"))
    }

    /// Set the session time zone (IANA id such as `Europe/Berlin`).
    fn set_session_time_zone(&mut self, _zone: &str) -> Result<(), DriverError> {
        Err(DriverError::Unsupported("session time zone"))
    }

    /// Close the session and release its server-side resources.
    fn close(&mut self) -> Result<(), DriverError>;
}

/// Opens new connections — injected into the provider for testability.
pub trait Driver: Send + Sync {
    type Connection: Connection;

    /// Establish a new session for `key`, authenticating with `credential`
    /// when one is given.
    fn open(&self, key: &CacheKey, credential: Option<&str>)
    -> Result<Self::Connection, DriverError>;
}
