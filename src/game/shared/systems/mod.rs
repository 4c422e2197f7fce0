pub mod job_system;
pub use job_system::{Job, JobScheduler, DEFAULT_WORKER_COUNT};
