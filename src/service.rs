use tracing::{debug, error, info};
use uuid::Uuid;

use crate::classifier::ClassifiedError;
use crate::error::{RepositoryError, TransactionError};
use crate::member::Member;
use crate::repository::MemberRepository;
use crate::unit_of_work::{with_unit_of_work, UnitOfWork, UnitOfWorkSession};

/// A business rule rejected the operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{reason}")]
pub struct ValidationError {
    reason: String,
}

impl ValidationError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

/// Business validation applied to the receiving member of a transfer.
pub trait TransferPolicy: Send + Sync {
    fn validate(&self, to: &Member) -> Result<(), ValidationError>;
}

impl<F> TransferPolicy for F
where
    F: Fn(&Member) -> Result<(), ValidationError> + Send + Sync,
{
    fn validate(&self, to: &Member) -> Result<(), ValidationError> {
        self(to)
    }
}

/// Rejects transfers to one sentinel member.
#[derive(Debug, Clone)]
pub struct RejectMember {
    id: String,
}

impl RejectMember {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

impl TransferPolicy for RejectMember {
    fn validate(&self, to: &Member) -> Result<(), ValidationError> {
        if to.id == self.id {
            return Err(ValidationError::new(format!(
                "transfers to member `{}` are not allowed",
                to.id
            )));
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("transfer rejected: {0}")]
    Rejected(#[from] ValidationError),

    #[error("member not found: {0}")]
    MemberNotFound(String),

    #[error("transfer failed: {0}")]
    DataAccess(#[source] ClassifiedError),

    #[error(transparent)]
    Transaction(#[from] TransactionError),
}

impl From<RepositoryError> for TransferError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(id) => TransferError::MemberNotFound(id),
            RepositoryError::DataAccess(err) => TransferError::DataAccess(err),
            RepositoryError::Inactive => TransferError::Transaction(TransactionError::Inactive),
        }
    }
}

/// Member operations: account creation and funds transfer.
pub struct MemberService<U> {
    uow: U,
    repository: MemberRepository,
    policy: Box<dyn TransferPolicy>,
}

impl<U: UnitOfWork> MemberService<U> {
    /// `repository` serves operations that run outside a unit of work.
    pub fn new(uow: U, repository: MemberRepository, policy: impl TransferPolicy + 'static) -> Self {
        Self {
            uow,
            repository,
            policy: Box::new(policy),
        }
    }

    pub fn repository(&self) -> &MemberRepository {
        &self.repository
    }

    /// Saves a new member with a zero balance.
    ///
    /// If the identifier is taken, retries once under a regenerated one and
    /// returns the member actually stored.
    pub async fn create_member(&self, id: &str) -> Result<Member, RepositoryError> {
        let member = Member::new(id, 0);
        match self.repository.save(&member).await {
            Ok(_) => {
                info!(member = %member.id, "member saved");
                Ok(member)
            }
            Err(RepositoryError::DataAccess(err)) if err.is_duplicate_key() => {
                let retry = Member::new(regenerate_id(id), 0);
                info!(member = %id, retry = %retry.id, "duplicate key, retrying");
                match self.repository.save(&retry).await {
                    Ok(_) => Ok(retry),
                    Err(err) => {
                        error!(member = %retry.id, error = %err, "saving member failed");
                        Err(err)
                    }
                }
            }
            Err(err) => {
                error!(member = %id, error = %err, "saving member failed");
                Err(err)
            }
        }
    }

    /// Moves `amount` from one member to another: both balances change or neither does.
    pub async fn transfer(&self, from_id: &str, to_id: &str, amount: i64) -> Result<(), TransferError> {
        let result = with_unit_of_work(&self.uow, |executor| async move {
            let repository = MemberRepository::new(executor);
            self.transfer_with(&repository, from_id, to_id, amount).await
        })
        .await;
        self.report(from_id, to_id, result)
    }

    /// Same as [`transfer`](Self::transfer), driving begin, commit and
    /// rollback by hand.
    pub async fn transfer_explicit(
        &self,
        from_id: &str,
        to_id: &str,
        amount: i64,
    ) -> Result<(), TransferError> {
        let result = self.run_explicit(from_id, to_id, amount).await;
        self.report(from_id, to_id, result)
    }

    async fn run_explicit(&self, from_id: &str, to_id: &str, amount: i64) -> Result<(), TransferError> {
        let session = self.uow.begin().await?;
        let repository = MemberRepository::new(session.executor().clone());

        match self.transfer_with(&repository, from_id, to_id, amount).await {
            Ok(()) => {
                session.commit().await?;
                Ok(())
            }
            Err(err) => {
                session.rollback().await;
                Err(err)
            }
        }
    }

    async fn transfer_with(
        &self,
        repository: &MemberRepository,
        from_id: &str,
        to_id: &str,
        amount: i64,
    ) -> Result<(), TransferError> {
        let from = repository.find_by_id(from_id).await?;
        let to = repository.find_by_id(to_id).await?;
        let debited = from.money.checked_sub(amount).ok_or_else(|| overflow(from_id))?;
        let credited = to.money.checked_add(amount).ok_or_else(|| overflow(to_id))?;

        repository.update(from_id, debited).await?;
        self.policy.validate(&to)?;
        repository.update(to_id, credited).await?;
        Ok(())
    }

    // The one place a failed transfer is logged.
    fn report(&self, from_id: &str, to_id: &str, result: Result<(), TransferError>) -> Result<(), TransferError> {
        match &result {
            Ok(()) => info!(from = %from_id, to = %to_id, "transfer committed"),
            Err(TransferError::MemberNotFound(id)) => {
                debug!(from = %from_id, to = %to_id, member = %id, "transfer aborted, member not found")
            }
            Err(TransferError::Rejected(err)) => {
                info!(from = %from_id, to = %to_id, reason = %err, "transfer rejected, rolled back")
            }
            Err(TransferError::DataAccess(err)) => {
                error!(from = %from_id, to = %to_id, kind = %err.kind(), error = %err, "transfer failed, rolled back")
            }
            Err(TransferError::Transaction(err)) => {
                error!(from = %from_id, to = %to_id, error = %err, "transfer failed at unit of work boundary")
            }
        }
        result
    }
}

fn overflow(id: &str) -> ValidationError {
    ValidationError::new(format!("balance overflow for member {id}"))
}

fn regenerate_id(id: &str) -> String {
    let suffix = Uuid::new_v4().as_u128() % 10_000;
    format!("{id}{suffix}")
}
