//! Maps raw driver failures onto the small set of kinds callers branch on.
//!
//! Engine codes are SQLSTATE values. Nothing outside this module looks at them.

use std::fmt;

use crate::driver::{DriverError, FailureCategory};

/// SQLSTATE `unique_violation`.
const UNIQUE_VIOLATION: &str = "23505";

/// SQLSTATE class `connection_exception`.
const CONNECTION_EXCEPTION_CLASS: &str = "08";

/// SQLSTATE `admin_shutdown`, `crash_shutdown`, `cannot_connect_now`.
const SERVER_GONE: [&str; 3] = ["57P01", "57P02", "57P03"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The storage engine could not be reached or dropped the connection.
    Transient,
    /// A unique constraint rejected the statement.
    DuplicateKey,
    Unclassified,
}

impl ErrorKind {
    /// Pure mapping from a raw failure to its kind.
    pub fn of(failure: &DriverError) -> Self {
        if failure.category() == FailureCategory::Connectivity {
            return ErrorKind::Transient;
        }
        match failure.code() {
            Some(UNIQUE_VIOLATION) => ErrorKind::DuplicateKey,
            Some(code)
                if code.starts_with(CONNECTION_EXCEPTION_CLASS) || SERVER_GONE.contains(&code) =>
            {
                ErrorKind::Transient
            }
            _ => ErrorKind::Unclassified,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ErrorKind::Transient => "transient data access failure",
            ErrorKind::DuplicateKey => "duplicate key",
            ErrorKind::Unclassified => "data access failure",
        })
    }
}

/// A data-access failure after classification. Only [`classify`] builds one.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind}: {source}")]
pub struct ClassifiedError {
    kind: ErrorKind,
    source: DriverError,
}

impl ClassifiedError {
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn is_duplicate_key(&self) -> bool {
        self.kind == ErrorKind::DuplicateKey
    }

    pub fn driver_error(&self) -> &DriverError {
        &self.source
    }
}

pub fn classify(failure: DriverError) -> ClassifiedError {
    ClassifiedError {
        kind: ErrorKind::of(&failure),
        source: failure,
    }
}

impl From<DriverError> for ClassifiedError {
    fn from(failure: DriverError) -> Self {
        classify(failure)
    }
}
