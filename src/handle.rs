use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::driver::{ConnectionSource, DriverConnection, DriverError, Row, SqlValue};

static NEXT_HANDLE_ID: AtomicU64 = AtomicU64::new(1);

/// Owned reference to one physical connection.
///
/// A handle is released exactly once: [`release`](ResourceHandle::release) is
/// idempotent and never fails. If autocommit was switched off through this
/// handle it is switched back on before the connection goes back to its
/// source; when that is not possible the connection is closed instead so it
/// cannot be reused in transactional mode.
///
/// Dropping an unreleased handle inside a tokio runtime schedules the same
/// cleanup on a background task.
pub struct ResourceHandle {
    id: u64,
    source: Arc<dyn ConnectionSource>,
    connection: Option<Box<dyn DriverConnection>>,
    transactional: bool,
    // Work started in transactional mode that was neither committed nor rolled back.
    pending: bool,
}

impl ResourceHandle {
    /// Obtains a connection from `source`.
    pub async fn acquire(source: Arc<dyn ConnectionSource>) -> Result<Self, DriverError> {
        let connection = source.acquire().await?;
        let id = NEXT_HANDLE_ID.fetch_add(1, Ordering::Relaxed);
        debug!(handle = id, "acquired connection");
        Ok(Self {
            id,
            source,
            connection: Some(connection),
            transactional: false,
            pending: false,
        })
    }

    /// Process-unique identity of this handle.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_released(&self) -> bool {
        self.connection.is_none()
    }

    pub fn is_transactional(&self) -> bool {
        self.transactional
    }

    fn connection(&mut self) -> Result<&mut (dyn DriverConnection + 'static), DriverError> {
        self.connection.as_deref_mut().ok_or_else(DriverError::closed)
    }

    /// Switches autocommit off (`true`) or back on (`false`).
    pub async fn set_transactional(&mut self, on: bool) -> Result<(), DriverError> {
        self.connection()?.set_autocommit(!on).await?;
        self.transactional = on;
        self.pending = on;
        Ok(())
    }

    /// Commits pending work. The attempt counts as the end of the work even if
    /// it fails, so a failed commit is never followed by a rollback.
    pub async fn commit(&mut self) -> Result<(), DriverError> {
        let result = self.connection()?.commit().await;
        self.pending = false;
        result
    }

    /// Rolls back pending work. After a failed rollback the work still counts
    /// as pending, so [`release`](ResourceHandle::release) closes the
    /// connection rather than restoring autocommit on it.
    pub async fn rollback(&mut self) -> Result<(), DriverError> {
        self.connection()?.rollback().await?;
        self.pending = false;
        Ok(())
    }

    pub async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64, DriverError> {
        let id = self.id;
        let affected = self.connection()?.execute(sql, params).await?;
        debug!(handle = id, sql, affected, "executed statement");
        Ok(affected)
    }

    pub async fn query(&mut self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>, DriverError> {
        let id = self.id;
        let rows = self.connection()?.query(sql, params).await?;
        debug!(handle = id, sql, rows = rows.len(), "ran query");
        Ok(rows)
    }

    /// Gives the connection back to its source. Safe to call more than once.
    pub async fn release(&mut self) {
        let Some(connection) = self.connection.take() else {
            return;
        };
        relinquish(
            self.id,
            self.source.as_ref(),
            connection,
            self.transactional,
            self.pending,
        )
        .await;
        self.transactional = false;
        self.pending = false;
    }
}

async fn relinquish(
    id: u64,
    source: &dyn ConnectionSource,
    mut connection: Box<dyn DriverConnection>,
    transactional: bool,
    pending: bool,
) {
    if pending {
        let rolled_back = connection.rollback().await;
        if let Err(err) = rolled_back {
            // Restoring autocommit now would commit the unfinished work.
            warn!(handle = id, error = %err, "rollback of unfinished work failed; closing connection");
            close(id, connection).await;
            return;
        }
    }

    if transactional || !connection.autocommit() {
        let restored = connection.set_autocommit(true).await;
        if let Err(err) = restored {
            warn!(handle = id, error = %err, "could not restore autocommit; closing connection");
            close(id, connection).await;
            return;
        }
    }

    match source.release(connection).await {
        Ok(()) => debug!(handle = id, "released connection"),
        Err(err) => warn!(handle = id, error = %err, "releasing connection failed"),
    }
}

async fn close(id: u64, connection: Box<dyn DriverConnection>) {
    if let Err(err) = connection.close().await {
        warn!(handle = id, error = %err, "closing connection failed");
    }
}

impl Drop for ResourceHandle {
    fn drop(&mut self) {
        let Some(connection) = self.connection.take() else {
            return;
        };
        warn!(handle = self.id, "resource handle dropped without release");
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let source = Arc::clone(&self.source);
                let (id, transactional, pending) = (self.id, self.transactional, self.pending);
                runtime.spawn(async move {
                    relinquish(id, source.as_ref(), connection, transactional, pending).await;
                });
            }
            // No runtime to finish the cleanup on; the driver's own drop handling applies.
            Err(_) => drop(connection),
        }
    }
}

impl fmt::Debug for ResourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceHandle")
            .field("id", &self.id)
            .field("released", &self.is_released())
            .field("transactional", &self.transactional)
            .field("pending", &self.pending)
            .finish()
    }
}
