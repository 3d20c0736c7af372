use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use code_checker_github::{
    payload::{Delivery, parse_delivery},
    webhook::GitHubEvent,
};
use code_checker_jobs::{PipelineRunner, ProcessPullRequestJob};

/// Webhook handler that hands pull request runs to the background runner.
///
/// Anything past signature verification is acknowledged with 200, whatever happens to the
/// run afterwards.
pub async fn webhook(
    State(runner): State<PipelineRunner>,
    GitHubEvent { kind, delivery, body }: GitHubEvent,
) -> Response {
    let event = match parse_delivery(kind.as_deref(), &body) {
        Delivery::PullRequest(event) => event,
        Delivery::Ignored(reason) => {
            tracing::info!("Ignoring delivery {}: {}", delivery.as_deref().unwrap_or("-"), reason);
            return (StatusCode::OK, "Event ignored").into_response();
        }
    };
    if !event.action.triggers_run() {
        tracing::debug!("Ignoring {:?} for {}", event.action, event.pull_request);
        return (StatusCode::OK, "Action ignored").into_response();
    }

    tracing::info!(
        "Received {:?} for {} from installation {}",
        event.action,
        event.pull_request,
        event.installation_id
    );
    if let Err(e) = runner.submit(ProcessPullRequestJob { delivery, event }) {
        tracing::error!("{e:#}");
        return (StatusCode::OK, "Service shutting down").into_response();
    }
    (StatusCode::OK, "Webhook processed").into_response()
}
