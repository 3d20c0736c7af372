mod pull_request;

pub use pull_request::{ProcessPullRequestJob, RunSummary, process_pull_request_job};
