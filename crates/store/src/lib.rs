#![doc = include_str!("../README.md")]

pub mod batch;
pub mod lock;
pub mod query;
pub mod store;

// --- Public API Re-exports ---

pub use batch::{Batcher, DEFAULT_BATCH_DEADLINE, DEFAULT_BATCH_SIZE};
pub use lock::LeaseLock;
pub use store::SqliteStore;
