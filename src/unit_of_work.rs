use async_trait::async_trait;
use parking_lot::RwLock;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::classifier::classify;
use crate::driver::ConnectionSource;
use crate::handle::ResourceHandle;
use crate::{Executor, TransactionAware, TransactionError, TransactionResult};

/// Unit of Work pattern for grouping data access into one transaction.
///
/// The UnitOfWork hands out sessions; each session owns exactly one
/// connection for its whole lifetime.
#[async_trait]
pub trait UnitOfWork: Send + Sync {
    type Session: UnitOfWorkSession;

    /// Begin a new unit of work.
    async fn begin(&self) -> TransactionResult<Self::Session>;
}

/// Lifecycle of a session. A session starts out active; `begin` is the only
/// way to obtain one. Only `Active` is observable through
/// [`UnitOfWorkSession::status`]; the other states exist after the session
/// has been consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    Active,
    Committed,
    RolledBack,
    /// Commit was attempted and failed; the outcome in storage is unknown.
    CommitFailed,
}

/// Represents a single active unit of work.
///
/// `commit` and `rollback` consume the session, so at most one of them runs.
/// Both release the handle before returning. A session dropped while still
/// active rolls back and releases its handle in the background.
#[async_trait]
pub trait UnitOfWorkSession: Send + Sync {
    /// Get the executor for this session (provides access to the shared handle).
    fn executor(&self) -> &Executor;

    /// Always `Active` for a session a caller still holds, since `commit` and
    /// `rollback` consume it. The terminal states are recorded internally so
    /// dropping a finished session does not roll back again.
    fn status(&self) -> TransactionStatus;

    /// Register a component that needs to be notified of the outcome.
    fn register_transaction_aware(&self, observer: Arc<dyn TransactionAware>);

    /// Commit and notify all registered observers. A failed commit is
    /// reported as-is and never followed by a rollback.
    async fn commit(self) -> TransactionResult<()>;

    /// Roll back and notify all registered observers. A failing rollback is
    /// logged, not returned, so it cannot mask the failure that caused it.
    async fn rollback(self);
}

/// Runs `body` inside a fresh unit of work.
///
/// Commits when `body` succeeds; rolls back and hands back the body's error
/// otherwise. Begin and commit failures are converted into `E`.
pub async fn with_unit_of_work<U, T, E, F, Fut>(uow: &U, body: F) -> Result<T, E>
where
    U: UnitOfWork,
    F: FnOnce(Executor) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: From<TransactionError>,
{
    let session = uow.begin().await?;
    match body(session.executor().clone()).await {
        Ok(value) => {
            session.commit().await?;
            Ok(value)
        }
        Err(err) => {
            session.rollback().await;
            Err(err)
        }
    }
}

/// Default implementation of UnitOfWork over any [`ConnectionSource`].
pub struct ConnectionUnitOfWork {
    source: Arc<dyn ConnectionSource>,
}

impl ConnectionUnitOfWork {
    /// Create a new ConnectionUnitOfWork drawing connections from `source`.
    pub fn new(source: Arc<dyn ConnectionSource>) -> Self {
        Self { source }
    }

    /// An executor outside any unit of work, sharing this source.
    pub fn standalone_executor(&self) -> Executor {
        Executor::standalone(Arc::clone(&self.source))
    }
}

#[async_trait]
impl UnitOfWork for ConnectionUnitOfWork {
    type Session = ConnectionSession;

    async fn begin(&self) -> TransactionResult<Self::Session> {
        let mut handle = ResourceHandle::acquire(Arc::clone(&self.source))
            .await
            .map_err(|err| TransactionError::Acquisition(classify(err)))?;

        if let Err(err) = handle.set_transactional(true).await {
            handle.release().await;
            return Err(TransactionError::Acquisition(classify(err)));
        }

        debug!(handle = handle.id(), "unit of work started");
        Ok(ConnectionSession::new(handle))
    }
}

/// Default implementation of UnitOfWorkSession.
pub struct ConnectionSession {
    executor: Executor,
    status: TransactionStatus,
    observers: Arc<RwLock<Vec<Arc<dyn TransactionAware>>>>,
}

impl ConnectionSession {
    fn new(handle: ResourceHandle) -> Self {
        Self {
            executor: Executor::session(handle),
            status: TransactionStatus::Active,
            observers: Arc::new(RwLock::new(Vec::new())),
        }
    }

    fn observers(&self) -> Vec<Arc<dyn TransactionAware>> {
        self.observers.read().clone()
    }
}

#[async_trait]
impl UnitOfWorkSession for ConnectionSession {
    fn executor(&self) -> &Executor {
        &self.executor
    }

    fn status(&self) -> TransactionStatus {
        self.status
    }

    fn register_transaction_aware(&self, observer: Arc<dyn TransactionAware>) {
        self.observers.write().push(observer);
    }

    async fn commit(mut self) -> TransactionResult<()> {
        // Take ownership of the handle; stale executor clones now see an inactive unit of work
        let mut handle = self
            .executor
            .take_handle()
            .await
            .ok_or(TransactionError::Inactive)?;
        let id = handle.id();

        let outcome = handle.commit().await;
        handle.release().await;

        if let Err(err) = outcome {
            self.status = TransactionStatus::CommitFailed;
            return Err(TransactionError::CommitFailed(classify(err)));
        }
        self.status = TransactionStatus::Committed;
        debug!(handle = id, "unit of work committed");

        for observer in self.observers() {
            observer.on_commit().await;
        }
        Ok(())
    }

    async fn rollback(mut self) {
        let Some(mut handle) = self.executor.take_handle().await else {
            return;
        };
        let id = handle.id();

        if let Err(err) = handle.rollback().await {
            warn!(handle = id, error = %err, "rollback failed");
        }
        handle.release().await;
        self.status = TransactionStatus::RolledBack;
        debug!(handle = id, "unit of work rolled back");

        for observer in self.observers() {
            observer.on_rollback().await;
        }
    }
}

impl Drop for ConnectionSession {
    fn drop(&mut self) {
        if self.status != TransactionStatus::Active {
            return;
        }
        if let Some(handle) = self.executor.try_take_handle() {
            warn!(
                handle = handle.id(),
                "unit of work dropped while active; rolling back"
            );
            // Dropping an unreleased handle rolls back and releases it.
            drop(handle);
        }
    }
}
