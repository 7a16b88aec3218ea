//! PostgreSQL connection sources.
//!
//! Postgres has no autocommit switch on the wire, so [`PgDriverConnection`]
//! tracks the mode itself: with autocommit off, the first statement after
//! acquire, commit or rollback opens a transaction with `BEGIN`.

use async_trait::async_trait;
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgArguments, PgConnectOptions, PgPool, PgRow};
use sqlx::query::Query;
use sqlx::{Column, Connection, Executor as _, PgConnection, Postgres, Row as _, TypeInfo};

use crate::driver::{ConnectionSource, DriverConnection, DriverError, Row, SqlValue};

/// Pooled data source. Released connections go back to the pool.
#[derive(Debug, Clone)]
pub struct PgPoolSource {
    pool: PgPool,
}

impl PgPoolSource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl ConnectionSource for PgPoolSource {
    async fn acquire(&self) -> Result<Box<dyn DriverConnection>, DriverError> {
        let connection = self.pool.acquire().await?;
        Ok(Box::new(PgDriverConnection::new(PgLink::Pooled(connection))))
    }

    async fn release(&self, connection: Box<dyn DriverConnection>) -> Result<(), DriverError> {
        // Dropping a pooled connection returns it to the pool.
        drop(connection);
        Ok(())
    }
}

/// Plain driver source: a new physical connection per acquire, closed on release.
#[derive(Debug, Clone)]
pub struct PgDirectSource {
    options: PgConnectOptions,
}

impl PgDirectSource {
    pub fn new(options: PgConnectOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl ConnectionSource for PgDirectSource {
    async fn acquire(&self) -> Result<Box<dyn DriverConnection>, DriverError> {
        let connection = PgConnection::connect_with(&self.options).await?;
        Ok(Box::new(PgDriverConnection::new(PgLink::Direct(connection))))
    }
}

enum PgLink {
    Pooled(PoolConnection<Postgres>),
    Direct(PgConnection),
}

impl PgLink {
    fn raw(&mut self) -> &mut PgConnection {
        match self {
            PgLink::Pooled(connection) => &mut **connection,
            PgLink::Direct(connection) => connection,
        }
    }
}

pub struct PgDriverConnection {
    link: PgLink,
    autocommit: bool,
    // A `BEGIN` has been sent and not yet ended.
    open: bool,
}

impl PgDriverConnection {
    fn new(link: PgLink) -> Self {
        Self {
            link,
            autocommit: true,
            open: false,
        }
    }

    async fn begin_if_needed(&mut self) -> Result<(), DriverError> {
        if !self.autocommit && !self.open {
            self.link.raw().execute("BEGIN").await?;
            self.open = true;
        }
        Ok(())
    }

    async fn end(&mut self, statement: &str) -> Result<(), DriverError> {
        if !self.open {
            return Ok(());
        }
        // Stays open on failure; the server state is unknown.
        self.link.raw().execute(statement).await?;
        self.open = false;
        Ok(())
    }
}

#[async_trait]
impl DriverConnection for PgDriverConnection {
    fn autocommit(&self) -> bool {
        self.autocommit
    }

    async fn set_autocommit(&mut self, enabled: bool) -> Result<(), DriverError> {
        if enabled && !self.autocommit {
            self.end("COMMIT").await?;
        }
        self.autocommit = enabled;
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), DriverError> {
        self.end("COMMIT").await
    }

    async fn rollback(&mut self) -> Result<(), DriverError> {
        self.end("ROLLBACK").await
    }

    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64, DriverError> {
        self.begin_if_needed().await?;
        let done = bind_all(sqlx::query(sql), params)
            .execute(self.link.raw())
            .await?;
        Ok(done.rows_affected())
    }

    async fn query(&mut self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>, DriverError> {
        self.begin_if_needed().await?;
        let rows = bind_all(sqlx::query(sql), params)
            .fetch_all(self.link.raw())
            .await?;
        rows.iter().map(convert_row).collect()
    }

    async fn close(self: Box<Self>) -> Result<(), DriverError> {
        match self.link {
            PgLink::Pooled(connection) => connection.close().await?,
            PgLink::Direct(connection) => connection.close().await?,
        }
        Ok(())
    }
}

fn bind_all<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    params: &'q [SqlValue],
) -> Query<'q, Postgres, PgArguments> {
    for param in params {
        query = match param {
            SqlValue::Text(text) => query.bind(text.as_str()),
            SqlValue::Int(value) => query.bind(*value),
            SqlValue::Null => query.bind(None::<String>),
        };
    }
    query
}

fn convert_row(row: &PgRow) -> Result<Row, DriverError> {
    let mut converted = Row::new();
    for column in row.columns() {
        let index = column.ordinal();
        let value = match column.type_info().name() {
            "INT8" => row.try_get::<Option<i64>, _>(index)?.map(SqlValue::Int),
            "INT4" => row
                .try_get::<Option<i32>, _>(index)?
                .map(|value| SqlValue::Int(value.into())),
            "INT2" => row
                .try_get::<Option<i16>, _>(index)?
                .map(|value| SqlValue::Int(value.into())),
            _ => row.try_get::<Option<String>, _>(index)?.map(SqlValue::Text),
        };
        converted.push(column.name(), value.unwrap_or(SqlValue::Null));
    }
    Ok(converted)
}
