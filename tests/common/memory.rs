use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use member_transfer_uow::repository::statements;
use member_transfer_uow::{ConnectionSource, DriverConnection, DriverError, Row, SqlValue};

/// Committed member table shared by every connection of one source.
#[derive(Default)]
struct Table {
    members: BTreeMap<String, i64>,
    next_connection: u64,
    // (connection id, statement) in execution order
    log: Vec<(u64, String)>,
    closed: usize,
}

/// Failures to inject into the next operations.
#[derive(Default, Clone)]
pub struct Faults {
    pub exhausted: bool,
    pub fail_autocommit_off: bool,
    pub fail_commit: bool,
    pub fail_rollback: bool,
    pub fail_release: bool,
    /// Updates of this member fail with the given error.
    pub fail_update_of: Option<(String, DriverError)>,
}

/// In-memory stand-in for a connection pool and its storage engine.
///
/// Each connection in transactional mode keeps its writes in a private
/// overlay until commit, so other connections never see them early.
#[derive(Default)]
pub struct MemorySource {
    table: Arc<Mutex<Table>>,
    faults: Arc<Mutex<Faults>>,
    acquired: AtomicUsize,
    released: AtomicUsize,
    // autocommit state of every connection handed back, in order
    returned_autocommit: Mutex<Vec<bool>>,
}

impl MemorySource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn as_source(self: &Arc<Self>) -> Arc<dyn ConnectionSource> {
        Arc::clone(self) as Arc<dyn ConnectionSource>
    }

    /// Seeds a committed member.
    pub fn insert(&self, id: &str, money: i64) {
        self.table.lock().members.insert(id.to_owned(), money);
    }

    /// Committed balance, as any other connection would see it.
    pub fn balance(&self, id: &str) -> Option<i64> {
        self.table.lock().members.get(id).copied()
    }

    pub fn inject(&self, configure: impl FnOnce(&mut Faults)) {
        configure(&mut self.faults.lock());
    }

    pub fn acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    /// Connections closed outright instead of being handed back.
    pub fn closed(&self) -> usize {
        self.table.lock().closed
    }

    pub fn returned_autocommit(&self) -> Vec<bool> {
        self.returned_autocommit.lock().clone()
    }

    /// Distinct connection ids that ran statements, in first-use order.
    pub fn statement_connections(&self) -> Vec<u64> {
        let mut seen = Vec::new();
        for (connection, _) in &self.table.lock().log {
            if !seen.contains(connection) {
                seen.push(*connection);
            }
        }
        seen
    }

    pub fn statement_count(&self) -> usize {
        self.table.lock().log.len()
    }
}

#[async_trait]
impl ConnectionSource for MemorySource {
    async fn acquire(&self) -> Result<Box<dyn DriverConnection>, DriverError> {
        if self.faults.lock().exhausted {
            return Err(DriverError::connectivity("connection pool exhausted"));
        }
        self.acquired.fetch_add(1, Ordering::SeqCst);
        let id = {
            let mut table = self.table.lock();
            table.next_connection += 1;
            table.next_connection
        };
        Ok(Box::new(MemoryConnection {
            id,
            table: Arc::clone(&self.table),
            faults: Arc::clone(&self.faults),
            autocommit: true,
            overlay: BTreeMap::new(),
        }))
    }

    async fn release(&self, connection: Box<dyn DriverConnection>) -> Result<(), DriverError> {
        self.released.fetch_add(1, Ordering::SeqCst);
        self.returned_autocommit.lock().push(connection.autocommit());
        if self.faults.lock().fail_release {
            return Err(DriverError::connectivity("pool refused connection"));
        }
        Ok(())
    }
}

pub struct MemoryConnection {
    id: u64,
    table: Arc<Mutex<Table>>,
    faults: Arc<Mutex<Faults>>,
    autocommit: bool,
    // uncommitted writes; None marks a delete
    overlay: BTreeMap<String, Option<i64>>,
}

impl MemoryConnection {
    fn lookup(&self, id: &str) -> Option<i64> {
        match self.overlay.get(id) {
            Some(staged) => *staged,
            None => self.table.lock().members.get(id).copied(),
        }
    }

    fn write(&mut self, id: &str, money: Option<i64>) {
        if self.autocommit {
            let mut table = self.table.lock();
            match money {
                Some(money) => table.members.insert(id.to_owned(), money),
                None => table.members.remove(id),
            };
        } else {
            self.overlay.insert(id.to_owned(), money);
        }
    }

    fn apply_overlay(&mut self) {
        let mut table = self.table.lock();
        for (id, money) in std::mem::take(&mut self.overlay) {
            match money {
                Some(money) => table.members.insert(id, money),
                None => table.members.remove(&id),
            };
        }
    }

    fn record(&self, sql: &str) {
        self.table.lock().log.push((self.id, sql.to_owned()));
    }
}

fn text(params: &[SqlValue], index: usize) -> Result<String, DriverError> {
    match params.get(index) {
        Some(SqlValue::Text(text)) => Ok(text.clone()),
        other => Err(DriverError::database("22023", format!("expected text parameter, got {other:?}"))),
    }
}

fn int(params: &[SqlValue], index: usize) -> Result<i64, DriverError> {
    match params.get(index) {
        Some(SqlValue::Int(value)) => Ok(*value),
        other => Err(DriverError::database("22023", format!("expected integer parameter, got {other:?}"))),
    }
}

#[async_trait]
impl DriverConnection for MemoryConnection {
    fn autocommit(&self) -> bool {
        self.autocommit
    }

    async fn set_autocommit(&mut self, enabled: bool) -> Result<(), DriverError> {
        if !enabled && self.faults.lock().fail_autocommit_off {
            return Err(DriverError::connectivity("connection reset"));
        }
        if enabled && !self.autocommit {
            self.apply_overlay();
        }
        self.autocommit = enabled;
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), DriverError> {
        if self.faults.lock().fail_commit {
            self.overlay.clear();
            return Err(DriverError::connectivity("connection lost during commit"));
        }
        self.apply_overlay();
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), DriverError> {
        // A failed rollback leaves the staged writes in place.
        if self.faults.lock().fail_rollback {
            return Err(DriverError::connectivity("connection lost during rollback"));
        }
        self.overlay.clear();
        Ok(())
    }

    async fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64, DriverError> {
        self.record(sql);
        match sql {
            statements::INSERT => {
                let id = text(params, 0)?;
                let money = int(params, 1)?;
                if self.lookup(&id).is_some() {
                    return Err(DriverError::database(
                        "23505",
                        format!("duplicate key value violates unique constraint: member_id={id}"),
                    ));
                }
                self.write(&id, Some(money));
                Ok(1)
            }
            statements::UPDATE_MONEY => {
                let money = int(params, 0)?;
                let id = text(params, 1)?;
                let failing = self.faults.lock().fail_update_of.clone();
                if let Some((target, err)) = failing {
                    if target == id {
                        return Err(err);
                    }
                }
                if self.lookup(&id).is_none() {
                    return Ok(0);
                }
                self.write(&id, Some(money));
                Ok(1)
            }
            statements::DELETE_BY_ID => {
                let id = text(params, 0)?;
                if self.lookup(&id).is_none() {
                    return Ok(0);
                }
                self.write(&id, None);
                Ok(1)
            }
            other => Err(DriverError::database("42601", format!("unsupported statement: {other}"))),
        }
    }

    async fn query(&mut self, sql: &str, params: &[SqlValue]) -> Result<Vec<Row>, DriverError> {
        self.record(sql);
        match sql {
            statements::SELECT_BY_ID => {
                let id = text(params, 0)?;
                Ok(self
                    .lookup(&id)
                    .map(|money| Row::new().with("member_id", id).with("money", money))
                    .into_iter()
                    .collect())
            }
            other => Err(DriverError::database("42601", format!("unsupported query: {other}"))),
        }
    }

    async fn close(self: Box<Self>) -> Result<(), DriverError> {
        // Staged writes die with the connection.
        self.table.lock().closed += 1;
        Ok(())
    }
}
