//! Test doubles shared by the unit tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::connection::{Connection, Driver, IsolationLevel};
use crate::error::DriverError;
use crate::key::CacheKey;

/// Shared, inspectable state behind a [`MockConnection`].
#[derive(Debug)]
pub(crate) struct Probe {
    pub alive: AtomicBool,
    pub read_only: AtomicBool,
    pub fail_read_only: AtomicBool,
    pub fail_alive: AtomicBool,
    pub fail_reset: AtomicBool,
    pub fail_close: AtomicBool,
    pub support_session: AtomicBool,
    pub closes: AtomicUsize,
    pub resets: AtomicUsize,
    pub health_checks: AtomicUsize,
    pub zones: Mutex<Vec<String>>,
    pub rejected_zones: Mutex<Vec<String>>,
    pub isolation: Mutex<Vec<IsolationLevel>>,
}

impl Probe {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            alive: AtomicBool::new(true),
            read_only: AtomicBool::new(false),
            fail_read_only: AtomicBool::new(false),
            fail_alive: AtomicBool::new(false),
            fail_reset: AtomicBool::new(false),
            fail_close: AtomicBool::new(false),
            support_session: AtomicBool::new(true),
            closes: AtomicUsize::new(0),
            resets: AtomicUsize::new(0),
            health_checks: AtomicUsize::new(0),
            zones: Mutex::new(Vec::new()),
            rejected_zones: Mutex::new(Vec::new()),
            isolation: Mutex::new(Vec::new()),
        })
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn resets(&self) -> usize {
        self.resets.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
pub(crate) struct MockConnection {
    pub id: u64,
    pub probe: Arc<Probe>,
}

impl MockConnection {
    pub fn new(id: u64) -> (Self, Arc<Probe>) {
        let probe = Probe::new();
        (
            Self {
                id,
                probe: Arc::clone(&probe),
            },
            probe,
        )
    }
}

impl Connection for MockConnection {
    fn is_alive(&self) -> Result<bool, DriverError> {
        self.probe.health_checks.fetch_add(1, Ordering::SeqCst);
        if self.probe.fail_alive.load(Ordering::SeqCst) {
            return Err(DriverError::Protocol("liveness check failed".to_string()));
        }
        Ok(self.probe.alive.load(Ordering::SeqCst))
    }

    fn is_read_only(&self) -> Result<bool, DriverError> {
        if self.probe.fail_read_only.load(Ordering::SeqCst) {
            return Err(DriverError::Protocol("read-only check failed".to_string()));
        }
        Ok(self.probe.read_only.load(Ordering::SeqCst))
    }

    fn reset_transaction_state(&mut self) -> Result<(), DriverError> {
        self.probe.resets.fetch_add(1, Ordering::SeqCst);
        if self.probe.fail_reset.load(Ordering::SeqCst) {
            return Err(DriverError::Protocol("rollback failed".to_string()));
        }
        Ok(())
    }

    fn set_isolation_level(&mut self, level: IsolationLevel) -> Result<(), DriverError> {
        if !self.probe.support_session.load(Ordering::SeqCst) {
            return Err(DriverError::Unsupported("transaction isolation level"));
        }
        self.probe.isolation.lock().push(level);
        Ok(())
    }

    fn set_session_time_zone(&mut self, zone: &str) -> Result<(), DriverError> {
        if !self.probe.support_session.load(Ordering::SeqCst) {
            return Err(DriverError::Unsupported("session time zone"));
        }
        if self.probe.rejected_zones.lock().iter().any(|z| z == zone) {
            return Err(DriverError::Protocol(format!("unknown time zone {zone}")));
        }
        self.probe.zones.lock().push(zone.to_string());
        Ok(())
    }

    fn close(&mut self) -> Result<(), DriverError> {
        self.probe.closes.fetch_add(1, Ordering::SeqCst);
        if self.probe.fail_close.load(Ordering::SeqCst) {
            return Err(DriverError::Closed);
        }
        self.probe.alive.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// Driver handing out [`MockConnection`]s and remembering their probes.
pub(crate) struct MockDriver {
    next_id: AtomicU64,
    pub should_fail: AtomicBool,
    pub probes: Mutex<Vec<Arc<Probe>>>,
    pub rejected_zones: Vec<String>,
    pub support_session: bool,
}

impl MockDriver {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            should_fail: AtomicBool::new(false),
            probes: Mutex::new(Vec::new()),
            rejected_zones: Vec::new(),
            support_session: true,
        }
    }

    pub fn opens(&self) -> usize {
        self.probes.lock().len()
    }

    pub fn probe(&self, index: usize) -> Arc<Probe> {
        Arc::clone(&self.probes.lock()[index])
    }
}

impl Driver for MockDriver {
    type Connection = MockConnection;

    fn open(
        &self,
        _key: &CacheKey,
        _credential: Option<&str>,
    ) -> Result<MockConnection, DriverError> {
        if self.should_fail.load(Ordering::SeqCst) {
            return Err(DriverError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "connection refused",
            )));
        }
        let (conn, probe) = MockConnection::new(self.next_id.fetch_add(1, Ordering::SeqCst));
        probe
            .support_session
            .store(self.support_session, Ordering::SeqCst);
        probe
            .rejected_zones
            .lock()
            .extend(self.rejected_zones.iter().cloned());
        self.probes.lock().push(probe);
        Ok(conn)
    }
}
