//! Connection pool with scoped acquisition
//!
//! A bounded set of long-lived server connections. `acquire` hands out an
//! RAII guard that puts the connection back when dropped, on every exit path.
//! A connection whose request failed at the transport level is not reused;
//! the pool opens a replacement on demand. `shutdown` is irreversible and
//! makes every later `acquire` fail with `PoolShutDown`.

use std::ops::{Deref, DerefMut};
use std::time::{Duration, Instant};

use bytes::Bytes;
use parking_lot::{Condvar, Mutex};

use crate::config::{PoolConfig, SessionOptions};
use crate::data::{Table, Value};
use crate::{Result, WireError};

// ============================================================================
// Connection
// ============================================================================

/// Server reply to a script
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Void,
    Scalar(Value),
    Vector(Vec<Value>),
    Tuple(Vec<Response>),
    Table(Table),
}

impl Response {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Response::Void => "VOID",
            Response::Scalar(_) => "SCALAR",
            Response::Vector(_) => "VECTOR",
            Response::Tuple(_) => "TUPLE",
            Response::Table(_) => "TABLE",
        }
    }

    pub fn into_table(self) -> Result<Table> {
        match self {
            Response::Table(t) => Ok(t),
            other => Err(unexpected("TABLE", &other)),
        }
    }

    /// Elements of a vector, or a scalar as a single element
    pub fn into_values(self) -> Result<Vec<Value>> {
        match self {
            Response::Scalar(v) => Ok(vec![v]),
            Response::Vector(values) => Ok(values),
            other => Err(unexpected("VECTOR", &other)),
        }
    }
}

fn unexpected(wanted: &str, got: &Response) -> WireError {
    WireError::Server(format!("expected a {} reply, got {}", wanted, got.kind_name()))
}

/// One server session. Implementations are supplied by the transport layer.
pub trait Connection: Send {
    /// Run a script and return its result
    fn execute(&mut self, script: &str) -> Result<Response>;

    /// Bind an encoded table frame to a server variable
    fn upload(&mut self, name: &str, frame: Bytes) -> Result<()>;
}

// ============================================================================
// Connection Pool
// ============================================================================

struct PoolState<C> {
    idle: Vec<C>,
    /// Connections open, idle or handed out
    live: usize,
    shut_down: bool,
}

type Opener<C> = Box<dyn Fn(&SessionOptions) -> Result<C> + Send + Sync>;

/// Bounded pool of connections
pub struct ConnectionPool<C: Connection> {
    state: Mutex<PoolState<C>>,
    available: Condvar,
    config: PoolConfig,
    open: Opener<C>,
}

impl<C: Connection> ConnectionPool<C> {
    /// Open `config.size` connections up front. `open` receives the
    /// session options of `config` for every connection it creates.
    pub fn new<F>(config: PoolConfig, open: F) -> Result<Self>
    where
        F: Fn(&SessionOptions) -> Result<C> + Send + Sync + 'static,
    {
        if config.size == 0 {
            return Err(WireError::InvalidArgument(
                "connection pool size must be at least 1".to_string(),
            ));
        }
        let idle = (0..config.size).map(|_| open(&config.session)).collect::<Result<Vec<_>>>()?;
        log::info!("Connection pool opened with {} connections", idle.len());
        Ok(Self {
            state: Mutex::new(PoolState {
                live: idle.len(),
                idle,
                shut_down: false,
            }),
            available: Condvar::new(),
            config,
            open: Box::new(open),
        })
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn size(&self) -> usize {
        self.config.size
    }

    pub fn idle_count(&self) -> usize {
        self.state.lock().idle.len()
    }

    pub fn is_shut_down(&self) -> bool {
        self.state.lock().shut_down
    }

    /// Take a connection, waiting for one to come back when all are in use
    pub fn acquire(&self) -> Result<PooledConnection<'_, C>> {
        let deadline = self.config.acquire_timeout.map(|t| (t, Instant::now() + t));
        let mut state = self.state.lock();
        loop {
            if state.shut_down {
                return Err(WireError::PoolShutDown);
            }
            if let Some(conn) = state.idle.pop() {
                return Ok(PooledConnection::new(self, conn));
            }
            if state.live < self.config.size {
                state.live += 1;
                drop(state);
                return self.open_replacement();
            }
            match deadline {
                Some((timeout, at)) => {
                    let timed_out = self.available.wait_until(&mut state, at).timed_out();
                    if timed_out && state.idle.is_empty() && !state.shut_down {
                        return Err(WireError::AcquireTimeout(timeout));
                    }
                }
                None => self.available.wait(&mut state),
            }
        }
    }

    /// Open a connection in a slot already reserved in `live`
    fn open_replacement(&self) -> Result<PooledConnection<'_, C>> {
        match (self.open)(&self.config.session) {
            Ok(conn) => {
                log::debug!("Opened replacement pool connection");
                Ok(PooledConnection::new(self, conn))
            }
            Err(e) => {
                self.state.lock().live -= 1;
                self.available.notify_one();
                Err(e)
            }
        }
    }

    fn release(&self, conn: C, broken: bool) {
        let mut state = self.state.lock();
        if broken || state.shut_down {
            state.live -= 1;
            drop(state);
            if broken {
                log::warn!("Discarding pooled connection after a transport error");
            }
            drop(conn);
        } else {
            state.idle.push(conn);
            drop(state);
        }
        self.available.notify_one();
    }

    /// Close idle connections and refuse further acquisition. Connections in
    /// use are closed when their guards drop. Calling it again does nothing.
    pub fn shutdown(&self) {
        let closed = {
            let mut state = self.state.lock();
            if state.shut_down {
                return;
            }
            state.shut_down = true;
            let closed = std::mem::take(&mut state.idle);
            state.live -= closed.len();
            closed
        };
        self.available.notify_all();
        log::info!("Connection pool shut down ({} idle connections closed)", closed.len());
    }

    /// Time budget for one acquisition, if bounded
    pub fn acquire_timeout(&self) -> Option<Duration> {
        self.config.acquire_timeout
    }
}

impl<C: Connection> Drop for ConnectionPool<C> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ============================================================================
// Pooled Connection Guard
// ============================================================================

/// Connection borrowed from a pool; returned when dropped
pub struct PooledConnection<'a, C: Connection> {
    pool: &'a ConnectionPool<C>,
    conn: Option<C>,
    broken: bool,
}

impl<'a, C: Connection> PooledConnection<'a, C> {
    fn new(pool: &'a ConnectionPool<C>, conn: C) -> Self {
        Self {
            pool,
            conn: Some(conn),
            broken: false,
        }
    }

    pub fn is_broken(&self) -> bool {
        self.broken
    }

    fn track<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            if e.is_transport() {
                self.broken = true;
            }
        }
        result
    }
}

impl<C: Connection> Connection for PooledConnection<'_, C> {
    fn execute(&mut self, script: &str) -> Result<Response> {
        let result = (**self).execute(script);
        self.track(result)
    }

    fn upload(&mut self, name: &str, frame: Bytes) -> Result<()> {
        let result = (**self).upload(name, frame);
        self.track(result)
    }
}

impl<C: Connection> Deref for PooledConnection<'_, C> {
    type Target = C;

    fn deref(&self) -> &C {
        // Only `drop` empties the slot
        match &self.conn {
            Some(conn) => conn,
            None => unreachable!("pooled connection used after release"),
        }
    }
}

impl<C: Connection> DerefMut for PooledConnection<'_, C> {
    fn deref_mut(&mut self) -> &mut C {
        match &mut self.conn {
            Some(conn) => conn,
            None => unreachable!("pooled connection used after release"),
        }
    }
}

impl<C: Connection> Drop for PooledConnection<'_, C> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.release(conn, self.broken);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Dummy {
        fail_io: bool,
    }

    impl Connection for Dummy {
        fn execute(&mut self, _script: &str) -> Result<Response> {
            if self.fail_io {
                Err(WireError::Io(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone")))
            } else {
                Ok(Response::Void)
            }
        }

        fn upload(&mut self, _name: &str, _frame: Bytes) -> Result<()> {
            Ok(())
        }
    }

    fn pool(size: usize, opened: Arc<AtomicUsize>) -> ConnectionPool<Dummy> {
        ConnectionPool::new(PoolConfig::new().with_size(size), move |_| {
            opened.fetch_add(1, Ordering::SeqCst);
            Ok(Dummy { fail_io: false })
        })
        .unwrap()
    }

    #[test]
    fn test_guard_returns_connection() {
        let pool = pool(2, Arc::new(AtomicUsize::new(0)));
        {
            let mut a = pool.acquire().unwrap();
            let _b = pool.acquire().unwrap();
            assert_eq!(pool.idle_count(), 0);
            assert_eq!(a.execute("1+1").unwrap(), Response::Void);
        }
        assert_eq!(pool.idle_count(), 2);
    }

    #[test]
    fn test_broken_connection_replaced() {
        let opened = Arc::new(AtomicUsize::new(0));
        let pool = pool(1, Arc::clone(&opened));
        {
            let mut conn = pool.acquire().unwrap();
            conn.fail_io = true;
            assert!(conn.execute("x").unwrap_err().is_transport());
            assert!(conn.is_broken());
        }
        assert_eq!(pool.idle_count(), 0);
        let conn = pool.acquire().unwrap();
        assert!(!conn.fail_io);
        assert_eq!(opened.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let pool = pool(1, Arc::new(AtomicUsize::new(0)));
        let held = pool.acquire().unwrap();
        pool.shutdown();
        pool.shutdown();
        assert!(pool.is_shut_down());
        assert!(matches!(pool.acquire(), Err(WireError::PoolShutDown)));
        drop(held);
        assert_eq!(pool.idle_count(), 0);
    }

    #[test]
    fn test_shutdown_wakes_waiters() {
        let pool = Arc::new(pool(1, Arc::new(AtomicUsize::new(0))));
        let held = pool.acquire().unwrap();
        let waiter = {
            let pool = Arc::clone(&pool);
            std::thread::spawn(move || {
                let outcome = pool.acquire().map(|_| ());
                outcome
            })
        };
        std::thread::sleep(Duration::from_millis(50));
        pool.shutdown();
        assert!(matches!(waiter.join().unwrap(), Err(WireError::PoolShutDown)));
        drop(held);
    }

    #[test]
    fn test_acquire_timeout() {
        let pool = ConnectionPool::new(
            PoolConfig::new().with_size(1).with_acquire_timeout(Duration::from_millis(20)),
            |_| Ok(Dummy { fail_io: false }),
        )
        .unwrap();
        let _held = pool.acquire().unwrap();
        assert!(matches!(pool.acquire(), Err(WireError::AcquireTimeout(_))));
    }

    #[test]
    fn test_zero_size_rejected() {
        let err = ConnectionPool::new(PoolConfig::new().with_size(0), |_| Ok(Dummy { fail_io: false }));
        assert!(matches!(err, Err(WireError::InvalidArgument(_))));
    }

    #[test]
    fn test_session_options_reach_opener() {
        let config = PoolConfig::new()
            .with_size(2)
            .with_session(SessionOptions::new().compressed());
        let pool = ConnectionPool::new(config, |session| {
            Ok(Dummy {
                fail_io: !session.compress,
            })
        })
        .unwrap();
        let mut conn = pool.acquire().unwrap();
        assert_eq!(conn.execute("1").unwrap(), Response::Void);
    }
}
