use crate::classifier::{classify, ClassifiedError};
use crate::driver::DriverError;

/// Error type for unit-of-work boundaries.
#[derive(Debug, thiserror::Error)]
pub enum TransactionError {
    #[error("failed to begin unit of work: {0}")]
    Acquisition(#[source] ClassifiedError),

    #[error("unit of work commit failed: {0}")]
    CommitFailed(#[source] ClassifiedError),

    #[error("unit of work is no longer active")]
    Inactive,
}

/// Result type for unit-of-work boundaries.
pub type TransactionResult<T> = Result<T, TransactionError>;

/// Error type for data access operations.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    /// No row matched the identifier. An expected outcome, not an infrastructure failure.
    #[error("member not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    DataAccess(#[from] ClassifiedError),

    /// The executor belongs to a unit of work that already committed or rolled back.
    #[error("unit of work is no longer active")]
    Inactive,
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

impl From<DriverError> for RepositoryError {
    fn from(failure: DriverError) -> Self {
        RepositoryError::DataAccess(classify(failure))
    }
}
