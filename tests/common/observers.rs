use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;

use member_transfer_uow::TransactionAware;

/// Transaction-aware probe recording which outcome it was told about.
#[derive(Default)]
pub struct OutcomeProbe {
    // Track notifications for verification in tests
    committed: RwLock<u32>,
    rolled_back: RwLock<u32>,
}

impl OutcomeProbe {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn commits(&self) -> u32 {
        *self.committed.read()
    }

    pub fn rollbacks(&self) -> u32 {
        *self.rolled_back.read()
    }
}

#[async_trait]
impl TransactionAware for OutcomeProbe {
    async fn on_commit(&self) {
        *self.committed.write() += 1;
    }

    async fn on_rollback(&self) {
        *self.rolled_back.write() += 1;
    }
}
