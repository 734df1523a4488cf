pub mod coordinator;
pub mod local;
pub mod protocol;
pub mod worker;

pub use coordinator::{ClusterPool, workers_to_start};
pub use worker::DEFAULT_TASK_CONCURRENCY;
