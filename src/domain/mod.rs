pub mod client;
pub mod job;
pub mod job_group;
pub mod optimizing_job;
pub mod parameter;

pub use client::ClientRecord;
pub use job::{DependencyId, Job, JobState};
pub use job_group::JobGroup;
pub use optimizing_job::OptimizingJob;
pub use parameter::Parameter;
