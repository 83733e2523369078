//! Plain-TCP sessions for endpoints where liveness is all the cache needs.
//!
//! The driver performs **no protocol handshake**: callers speak whatever
//! wire protocol the remote expects through [`TcpConnection::send`] and
//! [`TcpConnection::recv`]. Targets look like `host:port`, optionally with a
//! `scheme://` prefix and a `/path` suffix, both ignored. A `?readonly`
//! query marks the session read-only so the cache will refuse to reuse it.
//!
//! # Health check
//!
//! ```text
//! is_alive()
//!   → non-blocking drain of unread bytes
//!     → EOF                   → dead (remote closed, even after data)
//!     → WouldBlock            → alive
//!     → reset / not connected → dead
//! ```
//!
//! Unread bytes are discarded by the check. A remote that writes a last
//! message and then closes (an idle-timeout notice, say) is reported dead
//! rather than alive.

use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::debug;

use crate::config::SessionConfig;
use crate::connection::{Connection, Driver};
use crate::error::DriverError;
use crate::key::CacheKey;

/// Parsed form of a connection target.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TcpTarget {
    /// `host:port` to connect to.
    pub authority: String,
    pub read_only: bool,
}

impl TcpTarget {
    pub fn parse(target: &str) -> Result<Self, DriverError> {
        let rest = match target.split_once("://") {
            Some((_, rest)) => rest,
            None => target,
        };
        let (rest, query) = match rest.split_once('?') {
            Some((rest, query)) => (rest, Some(query)),
            None => (rest, None),
        };
        let authority = rest.split('/').next().unwrap_or_default();

        let has_port = authority
            .rsplit_once(':')
            .is_some_and(|(host, port)| !host.is_empty() && port.parse::<u16>().is_ok());
        if !has_port {
            return Err(DriverError::InvalidTarget(format!(
                "expected host:port in '{target}'"
            )));
        }

        let read_only = query.is_some_and(|q| {
            q.split('&')
                .any(|param| param == "readonly" || param == "readonly=true")
        });

        Ok(Self {
            authority: authority.to_string(),
            read_only,
        })
    }
}

// ── TcpConnection ────────────────────────────────────────────────────

/// A TCP session carrying raw bytes.
#[derive(Debug)]
pub struct TcpConnection {
    stream: TcpStream,
    read_only: bool,
    closed: bool,
}

impl TcpConnection {
    pub fn new(stream: TcpStream, read_only: bool) -> Self {
        Self {
            stream,
            read_only,
            closed: false,
        }
    }

    /// Send bytes over the connection. Returns bytes sent.
    pub fn send(&mut self, data: &[u8]) -> Result<usize, DriverError> {
        if self.closed {
            return Err(DriverError::Closed);
        }
        self.stream.write_all(data)?;
        Ok(data.len())
    }

    /// Receive up to `max_bytes`. An empty result means the remote closed.
    pub fn recv(&mut self, max_bytes: usize) -> Result<Vec<u8>, DriverError> {
        if self.closed {
            return Err(DriverError::Closed);
        }
        let mut buf = vec![0u8; max_bytes];
        let n = self.stream.read(&mut buf)?;
        buf.truncate(n);
        Ok(buf)
    }

    /// Run `op` with the socket temporarily in non-blocking mode.
    fn nonblocking<T>(
        &self,
        op: impl FnOnce(&TcpStream) -> Result<T, DriverError>,
    ) -> Result<T, DriverError> {
        self.stream.set_nonblocking(true)?;
        let result = op(&self.stream);
        self.stream.set_nonblocking(false)?;
        result
    }
}

/// Read and discard whatever is buffered on `stream` without blocking.
///
/// Returns the number of bytes discarded, or `None` once the remote has
/// closed its side.
fn drain_unread(mut stream: &TcpStream) -> Result<Option<usize>, DriverError> {
    let mut buf = [0u8; 4096];
    let mut discarded = 0usize;
    loop {
        match stream.read(&mut buf) {
            Ok(0) => return Ok(None),
            Ok(n) => discarded += n,
            Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(Some(discarded)),
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(DriverError::Io(e)),
        }
    }
}

fn is_disconnect(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::NotConnected
            | ErrorKind::BrokenPipe
    )
}

impl Connection for TcpConnection {
    fn is_alive(&self) -> Result<bool, DriverError> {
        if self.closed {
            return Ok(false);
        }
        match self.nonblocking(drain_unread) {
            Ok(Some(discarded)) => {
                if discarded > 0 {
                    debug!(discarded, "discarded unread bytes on health check");
                }
                Ok(true)
            }
            Ok(None) => Ok(false),
            Err(DriverError::Io(e)) if is_disconnect(e.kind()) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn is_read_only(&self) -> Result<bool, DriverError> {
        Ok(self.read_only)
    }

    /// Discard bytes the remote sent that nobody read, so the next user
    /// starts from a clean stream.
    fn reset_transaction_state(&mut self) -> Result<(), DriverError> {
        if self.closed {
            return Err(DriverError::Closed);
        }
        let Some(discarded) = self.nonblocking(drain_unread)? else {
            return Err(DriverError::Closed);
        };
        if discarded > 0 {
            debug!(discarded, "discarded unread bytes on reset");
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), DriverError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        match self.stream.shutdown(Shutdown::Both) {
            Err(e) if e.kind() != ErrorKind::NotConnected => Err(DriverError::Io(e)),
            _ => Ok(()),
        }
    }
}

// ── TcpDriver ────────────────────────────────────────────────────────

/// Opens [`TcpConnection`]s. The credential is not used; authentication is
/// part of whatever protocol the caller speaks over the stream.
#[derive(Clone, Debug)]
pub struct TcpDriver {
    connect_timeout: Duration,
    read_timeout: Duration,
}

impl TcpDriver {
    pub fn new(connect_timeout: Duration, read_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            read_timeout,
        }
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(config.connect_timeout(), config.read_timeout())
    }
}

impl Driver for TcpDriver {
    type Connection = TcpConnection;

    fn open(
        &self,
        key: &CacheKey,
        _credential: Option<&str>,
    ) -> Result<TcpConnection, DriverError> {
        let target = TcpTarget::parse(key.target())?;

        let addr = target
            .authority
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| {
                DriverError::InvalidTarget(format!("no address found for {}", target.authority))
            })?;

        let stream = TcpStream::connect_timeout(&addr, self.connect_timeout)?;
        stream.set_read_timeout(Some(self.read_timeout))?;
        // Low-latency request/response exchange.
        let _ = stream.set_nodelay(true);

        debug!(
            %key,
            addr = %addr,
            read_only = target.read_only,
            "established tcp connection"
        );
        Ok(TcpConnection::new(stream, target.read_only))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn parse_host_port() {
        let target = TcpTarget::parse("127.0.0.1:5432").unwrap();
        assert_eq!(target.authority, "127.0.0.1:5432");
        assert!(!target.read_only);
    }

    #[test]
    fn parse_strips_scheme_and_path() {
        let target = TcpTarget::parse("db://db.local:1521/orcl").unwrap();
        assert_eq!(target.authority, "db.local:1521");
    }

    #[test]
    fn parse_readonly_query() {
        assert!(TcpTarget::parse("db://h:1?readonly").unwrap().read_only);
        assert!(TcpTarget::parse("h:1/x?a=b&readonly=true").unwrap().read_only);
        assert!(!TcpTarget::parse("h:1?readonly=false").unwrap().read_only);
    }

    #[test]
    fn parse_rejects_missing_port() {
        assert!(matches!(
            TcpTarget::parse("db://host/orcl"),
            Err(DriverError::InvalidTarget(_))
        ));
        assert!(TcpTarget::parse("host:notaport").is_err());
        assert!(TcpTarget::parse(":5432").is_err());
    }

    fn connected_pair() -> (TcpConnection, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (server, _) = listener.accept().unwrap();
        (TcpConnection::new(client, false), server)
    }

    #[test]
    fn open_connection_is_alive() {
        let (conn, _server) = connected_pair();
        assert!(conn.is_alive().unwrap());
    }

    #[test]
    fn remote_close_is_detected() {
        let (conn, server) = connected_pair();
        drop(server);
        // FIN delivery is asynchronous; give it a moment.
        std::thread::sleep(Duration::from_millis(50));
        assert!(!conn.is_alive().unwrap());
    }

    #[test]
    fn remote_close_after_final_message_is_detected() {
        let (conn, mut server) = connected_pair();
        server.write_all(b"FATAL: idle timeout").unwrap();
        drop(server);
        std::thread::sleep(Duration::from_millis(50));
        assert!(!conn.is_alive().unwrap());
    }

    #[test]
    fn pending_bytes_without_close_are_alive() {
        let (mut conn, mut server) = connected_pair();
        server.write_all(b"late reply").unwrap();
        std::thread::sleep(Duration::from_millis(50));

        assert!(conn.is_alive().unwrap());
        server.write_all(b"next").unwrap();
        assert_eq!(conn.recv(64).unwrap(), b"next");
    }

    #[test]
    fn close_marks_connection_dead() {
        let (mut conn, _server) = connected_pair();
        conn.close().unwrap();
        assert!(!conn.is_alive().unwrap());
        assert!(matches!(conn.send(b"x"), Err(DriverError::Closed)));
        // Closing twice is fine.
        conn.close().unwrap();
    }

    #[test]
    fn reset_discards_unread_bytes() {
        let (mut conn, mut server) = connected_pair();
        server.write_all(b"stale response").unwrap();
        std::thread::sleep(Duration::from_millis(50));

        conn.reset_transaction_state().unwrap();

        server.write_all(b"fresh").unwrap();
        let got = conn.recv(64).unwrap();
        assert_eq!(got, b"fresh");
    }

    #[test]
    fn send_and_recv_pass_bytes_through() {
        let (mut conn, mut server) = connected_pair();
        assert_eq!(conn.send(b"PING").unwrap(), 4);
        let mut buf = [0u8; 4];
        server.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"PING");
    }

    #[test]
    fn driver_rejects_bad_target() {
        let driver = TcpDriver::new(Duration::from_millis(100), Duration::from_millis(100));
        let key = CacheKey::new("no-port-here", None).unwrap();
        assert!(matches!(
            driver.open(&key, None),
            Err(DriverError::InvalidTarget(_))
        ));
    }

    #[test]
    fn driver_reports_read_only_targets() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let driver = TcpDriver::new(Duration::from_secs(1), Duration::from_secs(1));
        let key = CacheKey::new(&format!("tcp://{addr}?readonly"), None).unwrap();

        let conn = driver.open(&key, None).unwrap();
        assert!(conn.is_read_only().unwrap());
    }
}
