use tracing::debug;

use crate::driver::{Row, SqlValue};
use crate::error::{RepositoryError, RepositoryResult};
use crate::executor::Executor;
use crate::member::Member;

/// Statements issued against the `member(member_id, money)` table.
pub mod statements {
    pub const INSERT: &str = "insert into member(member_id, money) values ($1, $2)";
    pub const SELECT_BY_ID: &str = "select member_id, money from member where member_id = $1";
    pub const UPDATE_MONEY: &str = "update member set money = $1 where member_id = $2";
    pub const DELETE_BY_ID: &str = "delete from member where member_id = $1";
}

/// Member repository.
///
/// Runs on whatever its [`Executor`] provides: inside a unit of work every
/// call shares the session's handle; standalone, each call acquires and
/// releases its own. Failures are returned, never logged here.
#[derive(Debug, Clone)]
pub struct MemberRepository {
    executor: Executor,
}

impl MemberRepository {
    pub fn new(executor: Executor) -> Self {
        Self { executor }
    }

    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    /// Inserts `member`; a taken identifier surfaces as a duplicate-key failure.
    pub async fn save(&self, member: &Member) -> RepositoryResult<u64> {
        let params = [SqlValue::from(member.id.as_str()), SqlValue::from(member.money)];
        let affected = self.execute(statements::INSERT, &params).await?;
        debug!(member = %member.id, affected, "saved member");
        Ok(affected)
    }

    /// Looks a member up; no matching row is [`RepositoryError::NotFound`].
    pub async fn find_by_id(&self, id: &str) -> RepositoryResult<Member> {
        let rows = self.query(statements::SELECT_BY_ID, &[SqlValue::from(id)]).await?;
        let row = rows
            .first()
            .ok_or_else(|| RepositoryError::NotFound(id.to_owned()))?;
        Ok(Member::try_from(row)?)
    }

    /// Sets a member's balance. Zero affected rows means no such member.
    pub async fn update(&self, id: &str, money: i64) -> RepositoryResult<u64> {
        let params = [SqlValue::from(money), SqlValue::from(id)];
        let affected = self.execute(statements::UPDATE_MONEY, &params).await?;
        debug!(member = %id, money, affected, "updated member");
        Ok(affected)
    }

    pub async fn delete(&self, id: &str) -> RepositoryResult<u64> {
        let affected = self
            .execute(statements::DELETE_BY_ID, &[SqlValue::from(id)])
            .await?;
        debug!(member = %id, affected, "deleted member");
        Ok(affected)
    }

    async fn execute(&self, sql: &str, params: &[SqlValue]) -> RepositoryResult<u64> {
        let mut checkout = self.executor.checkout().await?;
        let outcome = checkout.handle().execute(sql, params).await;
        checkout.finish().await;
        Ok(outcome?)
    }

    async fn query(&self, sql: &str, params: &[SqlValue]) -> RepositoryResult<Vec<Row>> {
        let mut checkout = self.executor.checkout().await?;
        let outcome = checkout.handle().query(sql, params).await;
        checkout.finish().await;
        Ok(outcome?)
    }
}
