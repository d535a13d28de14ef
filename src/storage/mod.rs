pub mod memory;
pub mod retry;
pub mod snapshot;
pub mod store;

pub use memory::MemoryStore;
pub use retry::{with_backoff, RetryPolicy, Retryable};
pub use snapshot::{load_snapshot, persist_snapshot, write_snapshot, SnapshotWorker, StoreSnapshot};
pub use store::{Store, StoreError};
