//! ConnectionCache — single-slot-per-key cache of idle connections.
//!
//! # Architecture
//!
//! ```text
//! acquire(key)
//!   → lock, remove slot for key, unlock
//!     → empty slot             → None (caller opens a new connection)
//!     → read-only connection   → close, None
//!     → closed by remote       → None
//!     → healthy                → reset transaction state → Some(conn)
//!
//! release(key, conn)
//!   → is_alive() outside the lock
//!   → lock, slot empty? store : hand back, unlock
//!     → handed back → close (best effort)
//! ```
//!
//! The map is the only shared state and is guarded by one mutex. Nothing
//! that talks to a connection runs while the mutex is held.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::connection::Connection;
use crate::error::{CacheError, CacheResult};
use crate::key::CacheKey;

/// Point-in-time cache statistics.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Acquires that handed back a cached connection.
    pub hits: u64,
    /// Acquires that found no connection under the key.
    pub misses: u64,
    /// Connections found closed by the remote side (on acquire or release).
    pub stale: u64,
    /// Cached connections rejected because they were in read-only mode.
    pub read_only: u64,
    /// Released connections closed because the slot was already taken.
    pub discarded: u64,
    /// Connections closed by `shutdown`.
    pub closed_on_shutdown: u64,
    /// Connections currently sitting idle in the cache.
    pub cached: usize,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    stale: AtomicU64,
    read_only: AtomicU64,
    discarded: AtomicU64,
    closed_on_shutdown: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

struct Slots<C> {
    idle: HashMap<CacheKey, C>,
    shut_down: bool,
}

/// Holds at most one idle connection per [`CacheKey`].
///
/// Share it between threads behind an `Arc`. Dropping the cache (or calling
/// [`shutdown`](Self::shutdown)) closes every connection still cached.
pub struct ConnectionCache<C: Connection> {
    slots: Mutex<Slots<C>>,
    counters: Counters,
}

impl<C: Connection> ConnectionCache<C> {
    pub fn new() -> Self {
        debug!("instantiated new connection cache");
        Self {
            slots: Mutex::new(Slots {
                idle: HashMap::new(),
                shut_down: false,
            }),
            counters: Counters::default(),
        }
    }

    /// Take the cached connection for `key`, if there is a usable one.
    ///
    /// The slot is emptied whether or not the connection turns out to be
    /// usable. Read-only connections are closed; connections the remote side
    /// already closed are dropped. A healthy connection has its transaction
    /// state reset before it is returned.
    ///
    /// Driver faults during the health check or reset are returned as
    /// errors; the faulty connection is closed and not put back.
    pub fn acquire(&self, key: &CacheKey) -> CacheResult<Option<C>> {
        let cached = self.slots.lock().idle.remove(key);

        let Some(mut conn) = cached else {
            Counters::bump(&self.counters.misses);
            debug!(%key, "no cached connection");
            return Ok(None);
        };

        let read_only = match conn.is_read_only() {
            Ok(read_only) => read_only,
            Err(source) => {
                self.close_quietly(key, conn);
                return Err(CacheError::Validation {
                    key: key.clone(),
                    source,
                });
            }
        };
        if read_only {
            Counters::bump(&self.counters.read_only);
            debug!(%key, "rejected read-only cached connection");
            self.close_quietly(key, conn);
            return Ok(None);
        }

        match conn.is_alive() {
            Ok(true) => {}
            Ok(false) => {
                Counters::bump(&self.counters.stale);
                debug!(%key, "cached connection was closed by the remote side");
                return Ok(None);
            }
            Err(source) => {
                self.close_quietly(key, conn);
                return Err(CacheError::Validation {
                    key: key.clone(),
                    source,
                });
            }
        }

        if let Err(source) = conn.reset_transaction_state() {
            self.close_quietly(key, conn);
            return Err(CacheError::Reset {
                key: key.clone(),
                source,
            });
        }

        Counters::bump(&self.counters.hits);
        debug!(%key, "got cached connection");
        Ok(Some(conn))
    }

    /// Hand an idle connection back for reuse under `key`.
    ///
    /// First releaser wins: if a connection is already cached for `key`, the
    /// incoming one is closed instead. Connections released after
    /// [`shutdown`](Self::shutdown), or found dead, are not cached either.
    pub fn release(&self, key: CacheKey, conn: C) {
        match conn.is_alive() {
            Ok(true) => {}
            Ok(false) => {
                Counters::bump(&self.counters.stale);
                debug!(%key, "not caching connection closed by the remote side");
                return;
            }
            Err(e) => {
                warn!(%key, error = %e, "health check failed on release, closing connection");
                self.close_quietly(&key, conn);
                return;
            }
        }

        let (rejected, shut_down) = {
            let mut slots = self.slots.lock();
            if slots.shut_down || slots.idle.contains_key(&key) {
                (Some(conn), slots.shut_down)
            } else {
                slots.idle.insert(key.clone(), conn);
                (None, false)
            }
        };

        match rejected {
            Some(conn) => {
                Counters::bump(&self.counters.discarded);
                if shut_down {
                    debug!(%key, "cache is shut down, closing released connection");
                } else {
                    debug!(%key, "discarding additional connection");
                }
                self.close_quietly(&key, conn);
            }
            None => debug!(%key, "caching released connection"),
        }
    }

    /// Close every cached connection and stop accepting new ones.
    ///
    /// Returns the number of connections closed. Calling it again is a
    /// no-op returning 0.
    pub fn shutdown(&self) -> usize {
        let drained: Vec<(CacheKey, C)> = {
            let mut slots = self.slots.lock();
            slots.shut_down = true;
            slots.idle.drain().collect()
        };

        let closed = drained.len();
        for (key, conn) in drained {
            Counters::bump(&self.counters.closed_on_shutdown);
            self.close_quietly(&key, conn);
        }
        if closed > 0 {
            info!(closed, "connection cache shut down");
        }
        closed
    }

    pub fn is_shut_down(&self) -> bool {
        self.slots.lock().shut_down
    }

    /// Whether a connection is currently cached under `key`.
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.slots.lock().idle.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.slots.lock().idle.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        CacheStats {
            hits: load(&self.counters.hits),
            misses: load(&self.counters.misses),
            stale: load(&self.counters.stale),
            read_only: load(&self.counters.read_only),
            discarded: load(&self.counters.discarded),
            closed_on_shutdown: load(&self.counters.closed_on_shutdown),
            cached: self.len(),
        }
    }

    /// Log cache statistics at `tracing::info` level.
    pub fn log_stats(&self) {
        let stats = self.stats();
        info!(
            hits = stats.hits,
            misses = stats.misses,
            stale = stats.stale,
            read_only = stats.read_only,
            discarded = stats.discarded,
            closed_on_shutdown = stats.closed_on_shutdown,
            cached = stats.cached,
            "connection cache statistics"
        );
    }

    fn close_quietly(&self, key: &CacheKey, mut conn: C) {
        if let Err(e) = conn.close() {
            warn!(%key, error = %e, "failed to close connection");
        }
    }
}

impl<C: Connection> Default for ConnectionCache<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Connection> Drop for ConnectionCache<C> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ── Debug impl (connections need not be Debug) ──────────────────────

impl<C: Connection> fmt::Debug for ConnectionCache<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slots = self.slots.lock();
        f.debug_struct("ConnectionCache")
            .field("cached", &slots.idle.len())
            .field("shut_down", &slots.shut_down)
            .finish_non_exhaustive()
    }
}
