pub mod job;
pub mod pool;

pub use job::{Job, JobSource, JobSpec};
pub use pool::{PoolEvent, StepTask, WorkerPool};
