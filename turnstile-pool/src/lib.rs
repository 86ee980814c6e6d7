pub mod bucket;
pub mod error;
pub mod pool;
pub mod slot;
pub mod worker;

pub use bucket::Bucket;
pub use error::PoolError;
pub use pool::WorkerPool;
pub use slot::SlotState;
pub use worker::{WorkerSocket, WorkerStatus};
