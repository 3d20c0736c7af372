mod jobs;

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use anyhow::{Result, bail};
use code_checker_checks::Dispatcher;
use code_checker_core::config::Config;
use code_checker_github::GitHub;
pub use jobs::{ProcessPullRequestJob, RunSummary, process_pull_request_job};
use tokio::{sync::Semaphore, task::JoinSet};

/// Shared context available to all job handlers.
#[derive(Clone)]
pub struct JobContext {
    pub config: Arc<Config>,
    pub github: Arc<GitHub>,
    pub dispatcher: Arc<Dispatcher>,
}

/// Runs pull request jobs in the background, at most `max_concurrent_runs` at a time.
///
/// Jobs are not persisted and a failed run is never retried.
#[derive(Clone)]
pub struct PipelineRunner {
    context: JobContext,
    permits: Arc<Semaphore>,
    tasks: Arc<Mutex<JoinSet<()>>>,
    draining: Arc<AtomicBool>,
}

impl PipelineRunner {
    pub fn new(context: JobContext) -> Self {
        let concurrency = context.config.pipeline.max_concurrent_runs.max(1);
        Self {
            context,
            permits: Arc::new(Semaphore::new(concurrency)),
            tasks: Arc::new(Mutex::new(JoinSet::new())),
            draining: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Queue a job and return immediately. Fails once the runner is draining.
    pub fn submit(&self, job: ProcessPullRequestJob) -> Result<()> {
        if self.draining.load(Ordering::Acquire) {
            bail!("Shutting down, not accepting {}", job.event.pull_request);
        }
        let permits = self.permits.clone();
        let context = self.context.clone();
        let mut tasks = match self.tasks.lock() {
            Ok(tasks) => tasks,
            Err(poisoned) => poisoned.into_inner(),
        };
        while let Some(result) = tasks.try_join_next() {
            log_join_result(result);
        }
        tasks.spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                tracing::warn!("Runner closed, dropping job for {}", job.event.pull_request);
                return;
            };
            // Outcome is logged inside the run span
            let _ = process_pull_request_job(job, &context).await;
        });
        Ok(())
    }

    /// Number of queued or running jobs.
    pub fn pending(&self) -> usize {
        match self.tasks.lock() {
            Ok(tasks) => tasks.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    /// Wait for in-flight jobs to finish. Jobs still running after `timeout` are aborted,
    /// which releases their workspaces.
    pub async fn drain(&self, timeout: Duration) {
        self.draining.store(true, Ordering::Release);
        let mut tasks = {
            let mut guard = match self.tasks.lock() {
                Ok(tasks) => tasks,
                Err(poisoned) => poisoned.into_inner(),
            };
            std::mem::take(&mut *guard)
        };
        if tasks.is_empty() {
            return;
        }
        tracing::info!("Waiting for {} pipeline runs", tasks.len());
        let joined = tokio::time::timeout(timeout, async {
            while let Some(result) = tasks.join_next().await {
                log_join_result(result);
            }
        })
        .await;
        if joined.is_err() {
            tracing::warn!("Aborting {} pipeline runs after {:?}", tasks.len(), timeout);
            tasks.shutdown().await;
        }
    }
}

fn log_join_result(result: Result<(), tokio::task::JoinError>) {
    if let Err(e) = result
        && e.is_panic()
    {
        tracing::error!("Pipeline run panicked: {:?}", e);
    }
}
