use anyhow::{Context, Result, anyhow};
use code_checker_core::{
    error::PipelineError,
    models::{AccessToken, Finding, PullRequestRef},
};
use reqwest::header::AUTHORIZATION;
use serde::Serialize;

use crate::GitHub;

#[derive(Debug, Default, Clone, Copy, Eq, PartialEq)]
pub struct PublishSummary {
    pub posted: usize,
    pub failed: usize,
}

#[derive(Serialize)]
struct CommentBody<'a> {
    body: &'a str,
}

/// Render a finding as a pull request comment.
pub fn format_comment(finding: &Finding) -> String {
    format!(
        "### 🚨Code formatting issues detected!🚨\n\nFile: `{}`\n\n**{}**\n\n{}",
        finding.path,
        finding.message,
        finding.issues.join("\n")
    )
}

impl GitHub {
    async fn post_comment(
        &self,
        pull_request: &PullRequestRef,
        token: &AccessToken,
        body: &str,
    ) -> Result<()> {
        let mut segments = vec!["repos"];
        segments.extend(pull_request.repo_full_name.split('/'));
        let number = pull_request.number.to_string();
        segments.extend(["issues", number.as_str(), "comments"]);
        let url = self.api(&segments)?;
        let response = self
            .client
            .post(url)
            .header(AUTHORIZATION, token.authorization())
            .json(&CommentBody { body })
            .send()
            .await
            .context("Request failed")?;
        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("Comment endpoint returned {status}"));
        }
        Ok(())
    }

    /// Post one comment per finding, in order. Failures are logged and skipped.
    pub async fn publish_findings(
        &self,
        pull_request: &PullRequestRef,
        findings: &[Finding],
        token: &AccessToken,
    ) -> PublishSummary {
        let mut summary = PublishSummary::default();
        for finding in findings {
            match self.post_comment(pull_request, token, &format_comment(finding)).await {
                Ok(()) => {
                    tracing::info!("Posted comment for {} on {}", finding.path, pull_request);
                    summary.posted += 1;
                }
                Err(error) => {
                    let err = PipelineError::Publish { path: finding.path.clone(), error };
                    tracing::error!("{err}");
                    summary.failed += 1;
                }
            }
        }
        summary
    }
}
