use std::path::PathBuf;

use thiserror::Error;

/// Failures that end a pipeline run, or that are reported per item.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("installation token exchange failed: {0:#}")]
    UpstreamAuth(anyhow::Error),
    #[error("failed to prepare workspace: {0:#}")]
    Workspace(anyhow::Error),
    #[error("failed to fetch pull request files: {0:#}")]
    Fetch(anyhow::Error),
    #[error("checker {checker} failed on {path}: {reason}")]
    CheckerExecution { checker: String, path: String, reason: String },
    #[error("failed to post comment for {path}: {error:#}")]
    Publish { path: String, error: anyhow::Error },
    #[error("failed to remove workspace {}: {source}", path.display())]
    Cleanup { path: PathBuf, source: std::io::Error },
    #[error("run exceeded its deadline of {0} seconds")]
    Timeout(u64),
}

impl PipelineError {
    /// The state the run was in when it aborted.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::UpstreamAuth(_) => "authenticating",
            Self::Workspace(_) => "preparing the workspace",
            Self::Fetch(_) => "fetching",
            Self::CheckerExecution { .. } => "checking",
            Self::Publish { .. } => "publishing",
            Self::Cleanup { .. } => "cleaning",
            Self::Timeout(_) => "timed out",
        }
    }
}
