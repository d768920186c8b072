//! Redis-backed [`LeaseStore`] speaking RESP2 over a plain TCP stream.
//!
//! Every call is bounded: name resolution and the connection share the
//! connect timeout, and each command (write plus the whole reply) must
//! finish within `io_timeout`. A slow or trickling server turns into
//! [`StoreError::Timeout`] instead of a stalled tick. A connection that
//! fails mid-command is dropped and re-established on the next call.
//!
//! # Commands
//!
//! ```text
//! get          → GET key
//! set_with_ttl → SET key value PX <ttl_ms>
//! delete       → DEL key
//! ping         → PING
//! connect      → AUTH password / SELECT db (when configured)
//! ```

use std::io::{BufReader, ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::{Mutex, mpsc};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};
use crate::resp::{encode_command, read_reply, Reply};
use crate::store::LeaseStore;

/// Connection settings for [`RedisStore`].
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// `host:port` of the server.
    pub address: String,
    pub password: Option<String>,
    pub database: Option<u32>,
    pub connect_timeout: Duration,
    /// Deadline for one command, reply included.
    pub io_timeout: Duration,
}

impl RedisConfig {
    pub fn new(address: &str) -> Self {
        Self {
            address: address.to_string(),
            password: None,
            database: None,
            connect_timeout: Duration::from_millis(250),
            io_timeout: Duration::from_millis(250),
        }
    }

    pub fn with_timeouts(mut self, connect_timeout: Duration, io_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self.io_timeout = io_timeout;
        self
    }

    pub fn with_auth(mut self, password: Option<String>, database: Option<u32>) -> Self {
        self.password = password;
        self.database = database;
        self
    }
}

/// TCP stream whose reads all count against one per-command deadline.
struct DeadlineStream {
    stream: TcpStream,
    deadline: Instant,
}

impl DeadlineStream {
    fn remaining(&self) -> std::io::Result<Duration> {
        let remaining = self.deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(std::io::Error::new(
                ErrorKind::TimedOut,
                "command deadline exceeded",
            ));
        }
        Ok(remaining)
    }
}

impl Read for DeadlineStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let remaining = self.remaining()?;
        self.stream.set_read_timeout(Some(remaining))?;
        self.stream.read(buf)
    }
}

/// A live connection: reads go through a buffer, writes to the raw stream.
struct Connection {
    reader: BufReader<DeadlineStream>,
    io_timeout: Duration,
}

impl Connection {
    fn command(&mut self, args: &[&[u8]]) -> StoreResult<Reply> {
        let frame = encode_command(args);
        let inner = self.reader.get_mut();
        inner.deadline = Instant::now() + self.io_timeout;
        let remaining = inner
            .remaining()
            .map_err(|e| StoreError::from_io("write command", e))?;
        inner.stream.set_write_timeout(Some(remaining))?;
        inner
            .stream
            .write_all(&frame)
            .map_err(|e| StoreError::from_io("write command", e))?;
        inner
            .stream
            .flush()
            .map_err(|e| StoreError::from_io("flush command", e))?;
        read_reply(&mut self.reader)?.into_result()
    }
}

/// Resolve `address` within `timeout`. Literal socket addresses skip the
/// resolver.
fn resolve(address: &str, timeout: Duration) -> StoreResult<SocketAddr> {
    if let Ok(addr) = address.parse::<SocketAddr>() {
        return Ok(addr);
    }
    let (tx, rx) = mpsc::channel();
    let host = address.to_string();
    // The lookup cannot be cancelled; a timed-out thread finishes on its own.
    thread::spawn(move || {
        let _ = tx.send(host.to_socket_addrs().map(|mut addrs| addrs.next()));
    });
    match rx.recv_timeout(timeout) {
        Ok(Ok(Some(addr))) => Ok(addr),
        Ok(Ok(None)) => Err(StoreError::Connect {
            address: address.to_string(),
            reason: "no address found".to_string(),
        }),
        Ok(Err(e)) => Err(StoreError::Connect {
            address: address.to_string(),
            reason: format!("dns resolution failed: {e}"),
        }),
        Err(_) => Err(StoreError::Timeout(format!("resolve {address}"))),
    }
}

/// Lease store client for a single Redis server.
pub struct RedisStore {
    config: RedisConfig,
    conn: Mutex<Option<Connection>>,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("address", &self.config.address)
            .field("database", &self.config.database)
            .finish()
    }
}

impl RedisStore {
    /// Create a client. No connection is made until the first command.
    pub fn new(config: RedisConfig) -> Self {
        Self {
            config,
            conn: Mutex::new(None),
        }
    }

    /// Round-trip a `PING`.
    pub fn ping(&self) -> StoreResult<()> {
        match self.execute(&[b"PING"])? {
            Reply::Simple(s) if s == "PONG" => Ok(()),
            other => Err(StoreError::Protocol(format!("unexpected PING reply: {other:?}"))),
        }
    }

    fn connect(&self) -> StoreResult<Connection> {
        let address = &self.config.address;
        let started = Instant::now();
        let addr = resolve(address, self.config.connect_timeout)?;
        let budget = self
            .config
            .connect_timeout
            .saturating_sub(started.elapsed())
            .max(Duration::from_millis(1));

        let stream = TcpStream::connect_timeout(&addr, budget).map_err(|e| {
            match e.kind() {
                std::io::ErrorKind::TimedOut => {
                    StoreError::Timeout(format!("connect to {address}: {e}"))
                }
                _ => StoreError::Connect {
                    address: address.clone(),
                    reason: e.to_string(),
                },
            }
        })?;
        let _ = stream.set_nodelay(true);

        let mut conn = Connection {
            reader: BufReader::new(DeadlineStream {
                stream,
                deadline: Instant::now(),
            }),
            io_timeout: self.config.io_timeout,
        };

        if let Some(password) = &self.config.password {
            conn.command(&[b"AUTH", password.as_bytes()])?;
        }
        if let Some(db) = self.config.database {
            conn.command(&[b"SELECT", db.to_string().as_bytes()])?;
        }

        debug!(%address, "redis connection established");
        Ok(conn)
    }

    /// Run one command, connecting first if needed. Any failure drops
    /// the connection so the next call starts clean.
    fn execute(&self, args: &[&[u8]]) -> StoreResult<Reply> {
        let mut slot = self
            .conn
            .lock()
            .map_err(|_| StoreError::Backend("redis connection lock poisoned".to_string()))?;

        if slot.is_none() {
            *slot = Some(self.connect()?);
        }

        let result = match slot.as_mut() {
            Some(conn) => conn.command(args),
            None => Err(StoreError::Backend("redis connection missing".to_string())),
        };

        match result {
            Err(e @ StoreError::Server(_)) => Err(e),
            Err(e) => {
                warn!(address = %self.config.address, error = %e, "dropping redis connection");
                *slot = None;
                Err(e)
            }
            ok => ok,
        }
    }
}

impl LeaseStore for RedisStore {
    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        match self.execute(&[b"GET", key.as_bytes()])? {
            Reply::Bulk(value) => Ok(value),
            other => Err(StoreError::Protocol(format!("unexpected GET reply: {other:?}"))),
        }
    }

    fn set_with_ttl(&self, key: &str, value: &[u8], ttl: Duration) -> StoreResult<()> {
        // Redis rejects PX 0; round up to the smallest valid expiry.
        let ttl_ms = ttl.as_millis().max(1).to_string();
        match self.execute(&[b"SET", key.as_bytes(), value, b"PX", ttl_ms.as_bytes()])? {
            Reply::Simple(s) if s == "OK" => Ok(()),
            other => Err(StoreError::Protocol(format!("unexpected SET reply: {other:?}"))),
        }
    }

    fn delete(&self, key: &str) -> StoreResult<bool> {
        match self.execute(&[b"DEL", key.as_bytes()])? {
            Reply::Integer(n) => Ok(n > 0),
            other => Err(StoreError::Protocol(format!("unexpected DEL reply: {other:?}"))),
        }
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}
