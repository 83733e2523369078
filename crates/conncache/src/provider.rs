//! ConnectionProvider — consults the cache before opening new connections.
//!
//! ```text
//! obtain(target, principal, credential)
//!   → ConnectionCache::acquire(key)
//!     → hit  → [configure session if EveryHandout] → conn
//!     → miss → Driver::open → configure session → conn
//!
//! relinquish(target, principal, conn)
//!   → ConnectionCache::release(key, conn)
//! ```

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::cache::ConnectionCache;
use crate::config::{ReconfigurePolicy, SessionConfig};
use crate::connection::{Connection, Driver};
use crate::error::{CacheError, CacheResult, DriverError};
use crate::key::CacheKey;

/// Hands out connections for an endpoint, reusing cached ones when possible.
pub struct ConnectionProvider<D: Driver> {
    driver: Arc<D>,
    cache: Arc<ConnectionCache<D::Connection>>,
    session: SessionConfig,
}

impl<D: Driver> ConnectionProvider<D> {
    /// Create a provider with its own cache.
    pub fn new(driver: Arc<D>, session: SessionConfig) -> Self {
        Self::with_cache(driver, Arc::new(ConnectionCache::new()), session)
    }

    /// Create a provider backed by a cache shared with other providers.
    pub fn with_cache(
        driver: Arc<D>,
        cache: Arc<ConnectionCache<D::Connection>>,
        session: SessionConfig,
    ) -> Self {
        Self {
            driver,
            cache,
            session,
        }
    }

    pub fn cache(&self) -> &Arc<ConnectionCache<D::Connection>> {
        &self.cache
    }

    pub fn session_config(&self) -> &SessionConfig {
        &self.session
    }

    /// Get a connection for `(target, principal)`.
    ///
    /// Connect failures are returned as-is; they are never retried here.
    pub fn obtain(
        &self,
        target: &str,
        principal: Option<&str>,
        credential: Option<&str>,
    ) -> CacheResult<D::Connection> {
        let key = CacheKey::new(target, principal)?;

        if let Some(mut conn) = self.cache.acquire(&key)? {
            if self.session.reconfigure == ReconfigurePolicy::EveryHandout {
                self.configure_or_close(&key, &mut conn)?;
            }
            return Ok(conn);
        }

        debug!(%key, "creating a new connection");
        let mut conn = self
            .driver
            .open(&key, credential)
            .map_err(|source| CacheError::Connect {
                target: key.target().to_string(),
                source,
            })?;
        self.configure_or_close(&key, &mut conn)?;
        Ok(conn)
    }

    /// Return a connection obtained for `(target, principal)`.
    ///
    /// The connection must be idle. If the key is invalid the connection is
    /// closed and the error returned.
    pub fn relinquish(
        &self,
        target: &str,
        principal: Option<&str>,
        mut conn: D::Connection,
    ) -> CacheResult<()> {
        match CacheKey::new(target, principal) {
            Ok(key) => {
                self.cache.release(key, conn);
                Ok(())
            }
            Err(e) => {
                if let Err(close_err) = conn.close() {
                    warn!(endpoint = target, error = %close_err, "failed to close connection");
                }
                Err(e)
            }
        }
    }

    fn configure_or_close(&self, key: &CacheKey, conn: &mut D::Connection) -> CacheResult<()> {
        if let Err(source) = self.configure_session(key, conn) {
            if let Err(e) = conn.close() {
                warn!(%key, error = %e, "failed to close misconfigured connection");
            }
            return Err(CacheError::SessionConfig {
                key: key.clone(),
                source,
            });
        }
        Ok(())
    }

    /// Apply isolation level and time zone. Capabilities the connection
    /// does not support are skipped.
    fn configure_session(
        &self,
        key: &CacheKey,
        conn: &mut D::Connection,
    ) -> Result<(), DriverError> {
        match conn.set_isolation_level(self.session.isolation_level) {
            Err(e) if e.is_unsupported() => {
                debug!(%key, "connection does not support isolation levels");
            }
            other => other?,
        }

        let zone = self.session.client_time_zone();
        match conn.set_session_time_zone(&zone) {
            Ok(()) => {
                info!(%key, zone = %zone, "session time zone set");
                Ok(())
            }
            Err(e) if e.is_unsupported() => {
                debug!(%key, "connection does not support session time zones");
                Ok(())
            }
            Err(e) => {
                let fallback = &self.session.fallback_time_zone;
                warn!(
                    %key,
                    zone = %zone,
                    fallback = %fallback,
                    error = %e,
                    "time zone could not be set, using fallback zone"
                );
                conn.set_session_time_zone(fallback)
            }
        }
    }
}

impl<D: Driver> std::fmt::Debug for ConnectionProvider<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionProvider")
            .field("cache", &self.cache)
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}
