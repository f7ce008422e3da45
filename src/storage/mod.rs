//! Storage contract: the operation set every backend implements and the
//! policy wrapper that validates, connects and recovers around it.

pub mod config;
pub mod contract;
pub mod engine;

pub use config::{ConnectionConfig, DEFAULT_BATCH_SIZE};
pub use contract::Storage;
pub use engine::StorageBackend;
