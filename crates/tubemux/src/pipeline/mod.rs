//! Per-video jobs and the bounded playlist fan-out.
//!
//! Every job runs resolve, select, the idempotence check, both downloads and
//! the merge in sequence. A failing job is cleaned up and recorded without
//! affecting its siblings.

mod job;
mod orchestrator;

pub use job::{DownloadJob, JobOutcome, JobStatus, JobStep};
pub use orchestrator::{Pipeline, RunReport};
