//! Member Transfer Unit of Work
//!
//! Transaction-scoped connection handling for a member repository: several
//! data access calls share one connection and commit or roll back together,
//! and low-level failures are classified into a closed set of kinds.

pub mod classifier;
pub mod config;
pub mod driver;
pub mod error;
pub mod executor;
pub mod handle;
pub mod member;
pub mod postgres;
pub mod repository;
pub mod service;
pub mod transaction_aware;
pub mod unit_of_work;

pub use classifier::{classify, ClassifiedError, ErrorKind};
pub use config::{ConfigError, DatabaseConfig};
pub use driver::{ConnectionSource, DriverConnection, DriverError, FailureCategory, Row, SqlValue};
pub use error::{RepositoryError, RepositoryResult, TransactionError, TransactionResult};
pub use executor::Executor;
pub use handle::ResourceHandle;
pub use member::Member;
pub use postgres::{PgDirectSource, PgDriverConnection, PgPoolSource};
pub use repository::MemberRepository;
pub use service::{MemberService, RejectMember, TransferError, TransferPolicy, ValidationError};
pub use transaction_aware::TransactionAware;
pub use unit_of_work::{
    with_unit_of_work, ConnectionSession, ConnectionUnitOfWork, TransactionStatus, UnitOfWork,
    UnitOfWorkSession,
};
