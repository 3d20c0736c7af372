use std::{fmt, path::PathBuf};

use serde::Deserialize;
use time::OffsetDateTime;
use url::Url;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PullRequestAction {
    Opened,
    Synchronize,
    #[serde(other)]
    Other,
}

impl PullRequestAction {
    /// Whether this action changes the pull request contents and should be checked.
    pub fn triggers_run(self) -> bool { matches!(self, Self::Opened | Self::Synchronize) }
}

/// A validated `pull_request` delivery.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct WebhookEvent {
    pub action: PullRequestAction,
    pub pull_request: PullRequestRef,
    pub installation_id: u64,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct PullRequestRef {
    /// The pull request's `/files` endpoint.
    pub files_url: Url,
    /// `owner/repo` of the base repository, where comments are posted.
    pub repo_full_name: String,
    pub number: u64,
}

impl fmt::Display for PullRequestRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.repo_full_name, self.number)
    }
}

/// Installation access token. Owned by a single run and never persisted.
#[derive(Clone, Deserialize)]
pub struct AccessToken {
    #[serde(rename = "token")]
    pub value: String,
    #[serde(rename = "expires_at", with = "time::serde::rfc3339::option", default)]
    pub expiry: Option<OffsetDateTime>,
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("value", &"[redacted]")
            .field("expiry", &self.expiry)
            .finish()
    }
}

impl AccessToken {
    pub fn authorization(&self) -> String { format!("token {}", self.value) }
}

/// File kind, keyed by lowercase extension.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct LanguageKind(String);

impl LanguageKind {
    pub fn new(ext: &str) -> Self { Self(ext.trim_start_matches('.').to_ascii_lowercase()) }

    pub fn from_path(path: &str) -> Option<Self> {
        let name = path.rsplit('/').next()?;
        let (stem, ext) = name.rsplit_once('.')?;
        if stem.is_empty() || ext.is_empty() {
            return None;
        }
        Some(Self::new(ext))
    }

    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for LanguageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, ".{}", self.0) }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct RetrievedFile {
    /// Path relative to the repository root, exactly as reported upstream.
    pub relative_path: String,
    pub local_path: PathBuf,
    pub kind: Option<LanguageKind>,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Finding {
    pub path: String,
    pub message: String,
    pub issues: Vec<String>,
}
