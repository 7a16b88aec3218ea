#![allow(dead_code)]

pub mod memory;
pub mod observers;

pub use memory::{Faults, MemorySource};
pub use observers::OutcomeProbe;

use tracing_subscriber::EnvFilter;

pub const MEMBER_A: &str = "memberA";
pub const MEMBER_B: &str = "memberB";
pub const MEMBER_EX: &str = "ex";

/// Install a test-writer subscriber once; later calls are no-ops.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
