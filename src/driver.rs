use async_trait::async_trait;
use std::fmt;

/// Broad category of a low-level driver failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureCategory {
    /// The storage engine rejected a statement and reported an engine code.
    Database,
    /// The connection to the storage engine could not be used or obtained.
    Connectivity,
    /// A value could not be converted between the driver and this crate.
    Decode,
    /// The connection was already relinquished.
    Closed,
    Other,
}

/// Raw failure surfaced by a [`DriverConnection`] or [`ConnectionSource`].
///
/// The engine `code` is opaque to everything except
/// [`classify`](crate::classifier::classify).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct DriverError {
    category: FailureCategory,
    code: Option<String>,
    message: String,
}

impl DriverError {
    pub fn new(category: FailureCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            code: None,
            message: message.into(),
        }
    }

    /// A statement failure tagged with an engine-specific code.
    pub fn database(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            category: FailureCategory::Database,
            code: Some(code.into()),
            message: message.into(),
        }
    }

    pub fn connectivity(message: impl Into<String>) -> Self {
        Self::new(FailureCategory::Connectivity, message)
    }

    pub fn closed() -> Self {
        Self::new(FailureCategory::Closed, "connection already released")
    }

    pub fn category(&self) -> FailureCategory {
        self.category
    }

    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<sqlx::Error> for DriverError {
    fn from(err: sqlx::Error) -> Self {
        let message = err.to_string();
        match err {
            sqlx::Error::Database(db) => Self {
                category: FailureCategory::Database,
                code: db.code().map(|code| code.into_owned()),
                message,
            },
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => Self::new(FailureCategory::Connectivity, message),
            sqlx::Error::ColumnDecode { .. }
            | sqlx::Error::Decode(_)
            | sqlx::Error::ColumnNotFound(_)
            | sqlx::Error::ColumnIndexOutOfBounds { .. }
            | sqlx::Error::TypeNotFound { .. } => Self::new(FailureCategory::Decode, message),
            _ => Self::new(FailureCategory::Other, message),
        }
    }
}

/// A bound statement parameter or a column value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlValue {
    Text(String),
    Int(i64),
    Null,
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_owned())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        SqlValue::Text(value)
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::Int(value)
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Text(text) => write!(f, "'{text}'"),
            SqlValue::Int(value) => write!(f, "{value}"),
            SqlValue::Null => f.write_str("NULL"),
        }
    }
}

/// One result row, columns addressed by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row {
    columns: Vec<(String, SqlValue)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.push(name, value);
        self
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<SqlValue>) {
        self.columns.push((name.into(), value.into()));
    }

    pub fn get(&self, name: &str) -> Option<&SqlValue> {
        self.columns
            .iter()
            .find(|(column, _)| column.eq_ignore_ascii_case(name))
            .map(|(_, value)| value)
    }

    pub fn get_text(&self, name: &str) -> Result<&str, DriverError> {
        match self.get(name) {
            Some(SqlValue::Text(text)) => Ok(text),
            other => Err(decode_error(name, "text", other)),
        }
    }

    pub fn get_int(&self, name: &str) -> Result<i64, DriverError> {
        match self.get(name) {
            Some(SqlValue::Int(value)) => Ok(*value),
            other => Err(decode_error(name, "integer", other)),
        }
    }
}

fn decode_error(column: &str, expected: &str, found: Option<&SqlValue>) -> DriverError {
    let message = match found {
        Some(value) => format!("column `{column}`: expected {expected}, found {value}"),
        None => format!("column `{column}` not present in row"),
    };
    DriverError::new(FailureCategory::Decode, message)
}

/// One physical connection as exposed by the driver.
///
/// Autocommit follows the usual driver contract: with autocommit on, every
/// statement is durable on its own; with it off, effects are deferred until
/// [`commit`](DriverConnection::commit). Turning autocommit back on commits
/// any open work.
#[async_trait]
pub trait DriverConnection: Send {
    fn autocommit(&self) -> bool;

    async fn set_autocommit(&mut self, enabled: bool) -> Result<(), DriverError>;

    async fn commit(&mut self) -> Result<(), DriverError>;

    async fn rollback(&mut self) -> Result<(), DriverError>;

    /// Runs a statement and reports the number of affected rows.
    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64, DriverError>;

    async fn query(&mut self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>, DriverError>;

    /// Relinquishes the physical resource.
    async fn close(self: Box<Self>) -> Result<(), DriverError>;
}

/// The pool (or plain driver) that hands out connections.
#[async_trait]
pub trait ConnectionSource: Send + Sync {
    async fn acquire(&self) -> Result<Box<dyn DriverConnection>, DriverError>;

    /// Takes a connection back. Sources without pooling close it.
    async fn release(&self, connection: Box<dyn DriverConnection>) -> Result<(), DriverError> {
        connection.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_lookup_is_case_insensitive() {
        let row = Row::new().with("MEMBER_ID", "memberA").with("money", 10_000i64);
        assert_eq!(row.get_text("member_id").unwrap(), "memberA");
        assert_eq!(row.get_int("MONEY").unwrap(), 10_000);
    }

    #[test]
    fn row_type_mismatch_is_a_decode_failure() {
        let row = Row::new().with("money", "lots");
        let err = row.get_int("money").unwrap_err();
        assert_eq!(err.category(), FailureCategory::Decode);

        let err = row.get_text("missing").unwrap_err();
        assert_eq!(err.category(), FailureCategory::Decode);
        assert!(err.message().contains("missing"));
    }

    #[test]
    fn pool_timeout_is_a_connectivity_failure() {
        let err = DriverError::from(sqlx::Error::PoolTimedOut);
        assert_eq!(err.category(), FailureCategory::Connectivity);
        assert_eq!(err.code(), None);
    }

    #[test]
    fn row_not_found_has_no_special_category() {
        let err = DriverError::from(sqlx::Error::RowNotFound);
        assert_eq!(err.category(), FailureCategory::Other);
    }
}
