//! Round-robin pool of read-only `DuckDB` connections.

use std::{
    path::Path,
    sync::{
        Mutex, MutexGuard, PoisonError,
        atomic::{AtomicUsize, Ordering},
    },
};

use crate::StoreError;

/// Simple round-robin pool of read-only `DuckDB` connections.
///
/// `duckdb::Connection` is `Send` but not `Sync`, so each connection is
/// wrapped in a `Mutex`. The pool hands out connections round-robin via
/// an atomic counter, allowing concurrent queries on different
/// connections. All connections share one database instance.
pub struct DuckDbPool {
    connections: Vec<Mutex<duckdb::Connection>>,
    next: AtomicUsize,
}

impl DuckDbPool {
    /// Opens `size` read-only connections to the `DuckDB` file at `path`.
    /// A `size` of zero opens one connection.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DuckDb`] if the file cannot be opened.
    pub fn open(path: &Path, size: usize) -> Result<Self, StoreError> {
        let conn = duckdb::Connection::open_with_flags(
            path,
            duckdb::Config::default().access_mode(duckdb::AccessMode::ReadOnly)?,
        )?;
        let pool = Self::from_connection(conn, size)?;

        log::info!(
            "Opened {} read-only DuckDB connection(s) to {}",
            pool.size(),
            path.display()
        );

        Ok(pool)
    }

    /// Builds a pool of `size` handles (at least one) onto the database
    /// behind `conn`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DuckDb`] if a handle cannot be cloned.
    pub fn from_connection(conn: duckdb::Connection, size: usize) -> Result<Self, StoreError> {
        let mut connections = Vec::with_capacity(size.max(1));
        for _ in 1..size.max(1) {
            connections.push(Mutex::new(conn.try_clone()?));
        }
        connections.push(Mutex::new(conn));

        Ok(Self {
            connections,
            next: AtomicUsize::new(0),
        })
    }

    /// Number of connections.
    #[must_use]
    pub fn size(&self) -> usize {
        self.connections.len()
    }

    /// Acquires the next connection from the pool (round-robin).
    ///
    /// A connection whose previous holder panicked is handed out anyway;
    /// the pool only reads, so there is no partial write to recover from.
    pub fn acquire(&self) -> MutexGuard<'_, duckdb::Connection> {
        let idx = self.next.fetch_add(1, Ordering::Relaxed) % self.connections.len();
        self.connections[idx]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
