// Bounded SQLite Connection Pool
// Fixed set of connections opened up front; callers wait in FIFO order when all are out

use couponsys_core::port::PoolError;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection};
use sqlx::{ConnectOptions, Connection};
use std::collections::VecDeque;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

const RETURNED_ERR: &str = "connection already handed back to the pool";

/// Pool usage snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    pub capacity: usize,
    pub idle: usize,
    pub checked_out: usize,
    pub closed: bool,
}

struct PoolState {
    idle: VecDeque<SqliteConnection>,
    checked_out: usize,
    closed: bool,
}

struct PoolShared {
    capacity: usize,
    state: Mutex<PoolState>,
    /// One permit per idle connection; fair, so waiters are served in arrival order
    available: Semaphore,
}

/// What happened to a connection handed back
enum PutBack {
    Pooled,
    /// Pool already closed; the connection must be closed by the caller
    Discard(SqliteConnection),
    /// Return beyond capacity; the pool closed itself
    Overflow(Vec<SqliteConnection>),
}

impl PoolShared {
    fn lock(&self) -> Result<MutexGuard<'_, PoolState>, PoolError> {
        self.state
            .lock()
            .map_err(|e| PoolError::Acquire(format!("pool state lock poisoned: {}", e)))
    }

    fn lock_for_close(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn put_back(&self, conn: SqliteConnection) -> PutBack {
        let mut state = self.lock_for_close();
        state.checked_out = state.checked_out.saturating_sub(1);

        if state.closed {
            return PutBack::Discard(conn);
        }

        if state.idle.len() >= self.capacity {
            let mut doomed: Vec<SqliteConnection> = state.idle.drain(..).collect();
            doomed.push(conn);
            state.closed = true;
            drop(state);

            self.available.close();
            error!(
                capacity = self.capacity,
                "Connection returned to a full pool, closing every connection"
            );
            return PutBack::Overflow(doomed);
        }

        state.idle.push_back(conn);
        drop(state);
        self.available.add_permits(1);
        PutBack::Pooled
    }
}

/// Bounded connection pool
///
/// Cloning shares the same pool.
#[derive(Clone)]
pub struct ConnectionPool {
    shared: Arc<PoolShared>,
}

impl ConnectionPool {
    /// Open `capacity` connections
    ///
    /// Nothing is kept when any of them fails to open.
    pub async fn connect(
        options: &SqliteConnectOptions,
        capacity: usize,
    ) -> Result<Self, PoolError> {
        if capacity == 0 {
            return Err(PoolError::Config(
                "pool capacity must be at least 1".to_string(),
            ));
        }

        let mut idle = VecDeque::with_capacity(capacity);
        for index in 0..capacity {
            match options.connect().await {
                Ok(conn) => idle.push_back(conn),
                Err(e) => {
                    error!(index, error = %e, "Failed to open pool connection");
                    close_connections(idle.into_iter().collect()).await;
                    return Err(PoolError::Connect {
                        index,
                        message: e.to_string(),
                    });
                }
            }
        }

        info!(capacity, "Connection pool initialized");

        Ok(Self {
            shared: Arc::new(PoolShared {
                capacity,
                state: Mutex::new(PoolState {
                    idle,
                    checked_out: 0,
                    closed: false,
                }),
                available: Semaphore::new(capacity),
            }),
        })
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    /// Take a connection, waiting for one to be returned if none is idle
    ///
    /// There is no deadline; see [`acquire_timeout`](Self::acquire_timeout).
    pub async fn acquire(&self) -> Result<PooledConnection, PoolError> {
        let permit = self
            .shared
            .available
            .acquire()
            .await
            .map_err(|_| PoolError::Closed)?;

        // early returns drop the permit, handing it back to the semaphore
        let mut state = self.shared.lock()?;
        if state.closed {
            return Err(PoolError::Closed);
        }

        match state.idle.pop_front() {
            Some(conn) => {
                // the permit travels with the connection and comes back in `put_back`
                permit.forget();
                state.checked_out += 1;
                debug!(
                    idle = state.idle.len(),
                    checked_out = state.checked_out,
                    "Connection acquired"
                );
                Ok(PooledConnection {
                    conn: Some(conn),
                    pool: Arc::clone(&self.shared),
                })
            }
            None => {
                permit.forget();
                Err(PoolError::Acquire(format!(
                    "permit granted but no idle connection ({} checked out)",
                    state.checked_out
                )))
            }
        }
    }

    /// [`acquire`](Self::acquire) bounded by `timeout`
    pub async fn acquire_timeout(&self, timeout: Duration) -> Result<PooledConnection, PoolError> {
        tokio::time::timeout(timeout, self.acquire())
            .await
            .map_err(|_| PoolError::Timeout(timeout))?
    }

    /// Hand a detached connection back to this pool
    ///
    /// Returning more connections than the pool holds closes the pool.
    pub async fn release(&self, conn: SqliteConnection) -> Result<(), PoolError> {
        match self.shared.put_back(conn) {
            PutBack::Pooled => Ok(()),
            PutBack::Discard(conn) => {
                close_connections(vec![conn]).await;
                Ok(())
            }
            PutBack::Overflow(doomed) => {
                close_connections(doomed).await;
                Err(PoolError::PoolFull {
                    capacity: self.shared.capacity,
                })
            }
        }
    }

    /// Close every idle connection and refuse further acquisitions
    ///
    /// Connections still checked out are closed when they come back.
    ///
    /// # Returns
    /// Number of connections closed
    pub async fn close_all(&self) -> usize {
        let idle: Vec<SqliteConnection> = {
            let mut state = self.shared.lock_for_close();
            state.closed = true;
            state.idle.drain(..).collect()
        };
        self.shared.available.close();

        let closed = close_connections(idle).await;
        info!(closed, "Connection pool closed");
        closed
    }

    pub fn status(&self) -> PoolStatus {
        let state = self.shared.lock_for_close();
        PoolStatus {
            capacity: self.shared.capacity,
            idle: state.idle.len(),
            checked_out: state.checked_out,
            closed: state.closed,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.shared.lock_for_close().closed
    }
}

/// Close connections one by one; failures are logged and skipped
async fn close_connections(conns: Vec<SqliteConnection>) -> usize {
    let mut closed = 0;
    for (index, conn) in conns.into_iter().enumerate() {
        match conn.close().await {
            Ok(()) => closed += 1,
            Err(e) => warn!(index, error = %e, "Failed to close connection"),
        }
    }
    closed
}

/// Connection checked out of a [`ConnectionPool`]
///
/// Goes back to the issuing pool when dropped.
pub struct PooledConnection {
    conn: Option<SqliteConnection>,
    pool: Arc<PoolShared>,
}

impl PooledConnection {
    /// Take the raw connection out of the guard
    ///
    /// The pool keeps counting it as checked out until it is handed back
    /// with [`ConnectionPool::release`].
    pub fn detach(mut self) -> SqliteConnection {
        self.conn.take().expect(RETURNED_ERR)
    }
}

impl fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("attached", &self.conn.is_some())
            .finish()
    }
}

impl Deref for PooledConnection {
    type Target = SqliteConnection;

    fn deref(&self) -> &Self::Target {
        self.conn.as_ref().expect(RETURNED_ERR)
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn.as_mut().expect(RETURNED_ERR)
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };

        // connections dropped here are closed by the driver in the background
        match self.pool.put_back(conn) {
            PutBack::Pooled => {}
            PutBack::Discard(conn) => drop(conn),
            PutBack::Overflow(doomed) => drop(doomed),
        }
    }
}
