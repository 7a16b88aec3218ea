use std::fmt;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMappedMutexGuard, OwnedMutexGuard};

use crate::driver::ConnectionSource;
use crate::error::{RepositoryError, RepositoryResult};
use crate::handle::ResourceHandle;

/// Executor tells repositories where their statements run.
///
/// A standalone executor acquires a short-lived handle for every operation
/// and releases it afterwards. A session executor hands out the handle owned
/// by a unit of work; clones of it can be passed to any number of
/// repositories, and none of them ever releases that handle.
#[derive(Clone)]
pub struct Executor {
    target: Target,
}

#[derive(Clone)]
enum Target {
    Standalone(Arc<dyn ConnectionSource>),
    Session(Arc<Mutex<Option<ResourceHandle>>>),
}

impl Executor {
    /// Creates an executor that runs each operation on its own connection.
    pub fn standalone(source: Arc<dyn ConnectionSource>) -> Self {
        Self {
            target: Target::Standalone(source),
        }
    }

    pub(crate) fn session(handle: ResourceHandle) -> Self {
        Self {
            target: Target::Session(Arc::new(Mutex::new(Some(handle)))),
        }
    }

    pub fn is_session(&self) -> bool {
        matches!(self.target, Target::Session(_))
    }

    /// Identity of the shared handle while its unit of work is active.
    pub async fn handle_id(&self) -> Option<u64> {
        match &self.target {
            Target::Standalone(_) => None,
            Target::Session(slot) => slot.lock().await.as_ref().map(ResourceHandle::id),
        }
    }

    /// Takes ownership of the session handle, leaving None in its place.
    /// This should only be called when committing or rolling back.
    pub(crate) async fn take_handle(&self) -> Option<ResourceHandle> {
        match &self.target {
            Target::Standalone(_) => None,
            Target::Session(slot) => slot.lock().await.take(),
        }
    }

    /// Non-blocking variant of [`take_handle`](Self::take_handle) for drop paths.
    pub(crate) fn try_take_handle(&self) -> Option<ResourceHandle> {
        match &self.target {
            Target::Standalone(_) => None,
            Target::Session(slot) => slot.try_lock().ok().and_then(|mut slot| slot.take()),
        }
    }

    pub(crate) async fn checkout(&self) -> RepositoryResult<Checkout> {
        match &self.target {
            Target::Standalone(source) => {
                let handle = ResourceHandle::acquire(Arc::clone(source)).await?;
                Ok(Checkout::Owned(handle))
            }
            Target::Session(slot) => {
                let guard = Arc::clone(slot).lock_owned().await;
                OwnedMutexGuard::try_map(guard, Option::as_mut)
                    .map(Checkout::Shared)
                    .map_err(|_| RepositoryError::Inactive)
            }
        }
    }
}

impl fmt::Debug for Executor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.target {
            Target::Standalone(_) => f.write_str("Executor::Standalone"),
            Target::Session(_) => f.write_str("Executor::Session"),
        }
    }
}

/// A handle borrowed for the duration of one data access operation.
pub(crate) enum Checkout {
    Owned(ResourceHandle),
    Shared(OwnedMappedMutexGuard<Option<ResourceHandle>, ResourceHandle>),
}

impl Checkout {
    pub(crate) fn handle(&mut self) -> &mut ResourceHandle {
        match self {
            Checkout::Owned(handle) => handle,
            Checkout::Shared(guard) => &mut **guard,
        }
    }

    /// Releases a handle this checkout acquired itself. A shared handle is
    /// only unlocked; its unit of work releases it.
    pub(crate) async fn finish(self) {
        if let Checkout::Owned(mut handle) = self {
            handle.release().await;
        }
    }
}
