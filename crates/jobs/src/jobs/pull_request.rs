use code_checker_core::{
    error::PipelineError,
    models::WebhookEvent,
    workspace::Workspace,
};
use tokio::time::{Instant, timeout_at};
use tracing::Instrument;

use crate::JobContext;

/// Job to check the files changed by a pull request and comment on the issues found.
#[derive(Debug, Clone)]
pub struct ProcessPullRequestJob {
    /// The `X-GitHub-Delivery` identifier, if the delivery carried one.
    pub delivery: Option<String>,
    pub event: WebhookEvent,
}

#[derive(Debug, Default, Clone, Eq, PartialEq)]
pub struct RunSummary {
    pub retrieved: usize,
    pub failed_downloads: usize,
    pub findings: usize,
    pub comments_posted: usize,
    pub comments_failed: usize,
}

/// Point in time after which a run gives up.
#[derive(Debug, Clone, Copy)]
struct Deadline {
    at: Instant,
    seconds: u64,
}

impl Deadline {
    async fn bound<F: Future>(self, future: F) -> Result<F::Output, PipelineError> {
        timeout_at(self.at, future).await.map_err(|_| self.expired())
    }

    fn check(self) -> Result<(), PipelineError> {
        if Instant::now() >= self.at { Err(self.expired()) } else { Ok(()) }
    }

    fn expired(self) -> PipelineError { PipelineError::Timeout(self.seconds) }
}

/// Process a pull request job within the configured run deadline.
///
/// Runs through authenticating, fetching, checking and publishing. The workspace is
/// acquired after the token is minted and released exactly once on every exit path,
/// including the deadline firing mid-run. Downloads are joined before the release, so
/// nothing recreates files inside a removed workspace.
pub async fn process_pull_request_job(
    job: ProcessPullRequestJob,
    ctx: &JobContext,
) -> Result<RunSummary, PipelineError> {
    let pull_request = &job.event.pull_request;
    let span = tracing::info_span!(
        "run",
        delivery = job.delivery.as_deref().unwrap_or("-"),
        pr = %pull_request,
    );
    async {
        if !job.event.action.triggers_run() {
            tracing::debug!("Ignoring action {:?}", job.event.action);
            return Ok(RunSummary::default());
        }
        let start = Instant::now();
        let deadline = Deadline {
            at: start + ctx.config.pipeline.run_timeout(),
            seconds: ctx.config.pipeline.run_timeout,
        };
        let result = run(&job.event, ctx, deadline).await;
        match &result {
            Ok(summary) => tracing::info!(
                "Run completed in {}ms: {} files, {} findings, {} comments ({} failed)",
                start.elapsed().as_millis(),
                summary.retrieved,
                summary.findings,
                summary.comments_posted,
                summary.comments_failed,
            ),
            Err(e) => tracing::error!("Run aborted while {}: {}", e.stage(), e),
        }
        result
    }
    .instrument(span)
    .await
}

async fn run(
    event: &WebhookEvent,
    ctx: &JobContext,
    deadline: Deadline,
) -> Result<RunSummary, PipelineError> {
    let pull_request = &event.pull_request;
    let token = deadline.bound(ctx.github.mint_installation_token(event.installation_id)).await??;
    tracing::debug!("Authenticated for installation {}", event.installation_id);

    let workspace = Workspace::acquire(&ctx.config.pipeline.workspace_root())
        .await
        .map_err(PipelineError::Workspace)?;
    let result = async {
        // Not cancelled: the fetcher stops at the deadline itself and joins its tasks
        let fetched = ctx
            .github
            .fetch_changed_files(
                pull_request,
                &token,
                &workspace,
                ctx.config.pipeline.download_concurrency,
                deadline.at,
            )
            .await;
        deadline.check()?;
        let files = fetched?;
        let mut summary = RunSummary {
            retrieved: files.retrieved.len(),
            failed_downloads: files.failed.len(),
            ..Default::default()
        };

        let findings =
            deadline.bound(ctx.dispatcher.run_checks(&files.retrieved, workspace.root())).await?;
        summary.findings = findings.len();
        if findings.is_empty() {
            tracing::info!("No issues found");
            return Ok(summary);
        }

        let published =
            deadline.bound(ctx.github.publish_findings(pull_request, &findings, &token)).await?;
        summary.comments_posted = published.posted;
        summary.comments_failed = published.failed;
        Ok(summary)
    }
    .await;

    if let Err(e) = workspace.release().await {
        tracing::error!("{e}");
    }
    result
}
