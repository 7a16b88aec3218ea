use async_trait::async_trait;

/// Trait for components that need to be notified of unit-of-work outcomes.
///
/// Components implementing this trait can be registered with a UnitOfWorkSession
/// to receive callbacks once the unit of work has committed or rolled back and
/// its handle has been released. Notifications cannot fail: by the time they
/// run the outcome is final.
#[async_trait]
pub trait TransactionAware: Send + Sync {
    /// Called after a successful commit.
    async fn on_commit(&self);

    /// Called after a rollback, including one whose driver call failed.
    async fn on_rollback(&self);
}
