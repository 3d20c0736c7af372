use code_checker_core::models::{PullRequestAction, PullRequestRef, WebhookEvent};
use serde::Deserialize;
use url::Url;

/// Outcome of parsing a verified delivery.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Delivery {
    PullRequest(WebhookEvent),
    Ignored(String),
}

#[derive(Deserialize)]
struct PullRequestPayload {
    action: PullRequestAction,
    pull_request: PullRequestBody,
    installation: Installation,
}

#[derive(Deserialize)]
struct PullRequestBody {
    number: u64,
    #[serde(default)]
    url: Option<Url>,
    #[serde(rename = "_links", default)]
    links: Option<Links>,
    base: Base,
}

#[derive(Deserialize)]
struct Links {
    #[serde(rename = "self")]
    this: Link,
}

#[derive(Deserialize)]
struct Link {
    href: Url,
}

#[derive(Deserialize)]
struct Base {
    repo: BaseRepo,
}

#[derive(Deserialize)]
struct BaseRepo {
    full_name: String,
}

#[derive(Deserialize)]
struct Installation {
    id: u64,
}

/// Parse a delivery body. Anything that is not a well-formed `pull_request` event is ignored.
pub fn parse_delivery(kind: Option<&str>, body: &[u8]) -> Delivery {
    if let Some(kind) = kind
        && kind != "pull_request"
    {
        return Delivery::Ignored(format!("unhandled event {kind}"));
    }
    let payload: PullRequestPayload = match serde_json::from_slice(body) {
        Ok(payload) => payload,
        Err(e) => return Delivery::Ignored(format!("malformed pull_request payload: {e}")),
    };
    let pull_request = payload.pull_request;
    let Some(base) = pull_request.links.map(|l| l.this.href).or(pull_request.url) else {
        return Delivery::Ignored("pull request has no API URL".to_string());
    };
    let Some(files_url) = files_url(&base) else {
        return Delivery::Ignored(format!("pull request URL {base} cannot be extended"));
    };
    Delivery::PullRequest(WebhookEvent {
        action: payload.action,
        pull_request: PullRequestRef {
            files_url,
            repo_full_name: pull_request.base.repo.full_name,
            number: pull_request.number,
        },
        installation_id: payload.installation.id,
    })
}

fn files_url(pull_request_url: &Url) -> Option<Url> {
    let mut url = pull_request_url.clone();
    url.path_segments_mut().ok()?.pop_if_empty().push("files");
    Some(url)
}
