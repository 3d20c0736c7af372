use std::{path::Path, sync::Arc};

use anyhow::{Context, Result, anyhow};
use code_checker_core::{
    error::PipelineError,
    models::{AccessToken, LanguageKind, PullRequestRef, RetrievedFile},
    util::join_normalized,
    workspace::Workspace,
};
use reqwest::header::AUTHORIZATION;
use serde::Deserialize;
use tokio::{
    io::AsyncWriteExt,
    sync::Semaphore,
    task::JoinSet,
    time::{Instant, timeout_at},
};
use url::Url;

use crate::GitHub;

const PER_PAGE: usize = 100;
/// The files endpoint stops paginating at 3000 entries.
const MAX_PAGES: u32 = 30;

#[derive(Debug, Clone, Deserialize)]
pub struct ChangedFile {
    pub filename: String,
    pub raw_url: Option<Url>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug)]
pub struct DownloadFailure {
    pub path: String,
    pub error: anyhow::Error,
}

/// Files retrieved into a workspace, in listing order.
#[derive(Debug, Default)]
pub struct ChangedFiles {
    pub retrieved: Vec<RetrievedFile>,
    pub failed: Vec<DownloadFailure>,
}

impl GitHub {
    /// List the pull request's changed files, following pagination.
    pub async fn list_changed_files(
        &self,
        pull_request: &PullRequestRef,
        token: &AccessToken,
    ) -> Result<Vec<ChangedFile>> {
        let mut files = Vec::new();
        for page in 1..=MAX_PAGES {
            let mut url = pull_request.files_url.clone();
            url.query_pairs_mut()
                .append_pair("per_page", &PER_PAGE.to_string())
                .append_pair("page", &page.to_string());
            let response = self
                .client
                .get(url)
                .header(AUTHORIZATION, token.authorization())
                .send()
                .await
                .with_context(|| format!("Failed to list files for {pull_request}"))?;
            let status = response.status();
            if !status.is_success() {
                return Err(anyhow!("Listing files for {pull_request} returned {status}"));
            }
            let items: Vec<ChangedFile> = response
                .json()
                .await
                .with_context(|| format!("Failed to parse file list page {page}"))?;
            let len = items.len();
            files.extend(items);
            if len < PER_PAGE {
                break;
            }
        }
        Ok(files)
    }

    /// Retrieve every changed file into `workspace`, preserving relative paths.
    ///
    /// A listing failure aborts; a failed download is reported and excluded. Network waits
    /// end at `deadline`, but every download task is joined before this returns, so nothing
    /// writes into the workspace afterwards.
    pub async fn fetch_changed_files(
        &self,
        pull_request: &PullRequestRef,
        token: &AccessToken,
        workspace: &Workspace,
        concurrency: usize,
        deadline: Instant,
    ) -> Result<ChangedFiles, PipelineError> {
        let listed = match timeout_at(deadline, self.list_changed_files(pull_request, token)).await
        {
            Ok(listed) => listed.map_err(PipelineError::Fetch)?,
            Err(_) => return Err(PipelineError::Fetch(deadline_reached())),
        };
        tracing::info!("{} lists {} changed files", pull_request, listed.len());

        let sem = Arc::new(Semaphore::new(concurrency.max(1)));
        let mut set = JoinSet::new();
        struct TaskResult {
            index: usize,
            path: String,
            result: Result<RetrievedFile>,
        }
        for (index, file) in listed.into_iter().enumerate() {
            if file.status.as_deref() == Some("removed") {
                tracing::debug!("Skipping removed file {}", file.filename);
                continue;
            }
            let sem = sem.clone();
            let client = self.client.clone();
            let authorization = token.authorization();
            let root = workspace.root().to_path_buf();
            set.spawn(async move {
                let result = match sem.acquire_owned().await {
                    Ok(_permit) => {
                        download_file(&client, &authorization, &root, &file, deadline).await
                    }
                    Err(e) => Err(e.into()),
                };
                TaskResult { index, path: file.filename, result }
            });
        }

        let mut completed = Vec::new();
        let mut out = ChangedFiles::default();
        while let Some(join_result) = set.join_next().await {
            match join_result {
                Ok(TaskResult { index, result: Ok(file), .. }) => {
                    tracing::debug!("Downloaded {}", file.relative_path);
                    completed.push((index, file));
                }
                Ok(TaskResult { path, result: Err(error), .. }) => {
                    tracing::error!("Failed to download {}: {:?}", path, error);
                    out.failed.push(DownloadFailure { path, error });
                }
                Err(e) => {
                    tracing::error!("Download task failed: {:?}", e);
                    out.failed.push(DownloadFailure {
                        path: "[unknown]".to_string(),
                        error: e.into(),
                    });
                }
            }
        }
        completed.sort_by_key(|(index, _)| *index);
        out.retrieved = completed.into_iter().map(|(_, file)| file).collect();
        Ok(out)
    }
}

fn deadline_reached() -> anyhow::Error { anyhow!("Run deadline reached") }

async fn download_file(
    client: &reqwest::Client,
    authorization: &str,
    root: &Path,
    file: &ChangedFile,
    deadline: Instant,
) -> Result<RetrievedFile> {
    let url = file.raw_url.clone().context("File has no raw URL")?;
    let local_path = join_normalized(root, &file.filename);
    if local_path == root {
        return Err(anyhow!("Invalid file name {:?}", file.filename));
    }
    let request = client.get(url).header(AUTHORIZATION, authorization).send();
    let mut response = timeout_at(deadline, request)
        .await
        .map_err(|_| deadline_reached())?
        .context("Request failed")?
        .error_for_status()?;
    if let Some(parent) = local_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut out = tokio::fs::File::create(&local_path)
        .await
        .with_context(|| format!("Failed to create {}", local_path.display()))?;
    let written: Result<()> = async {
        loop {
            let chunk =
                timeout_at(deadline, response.chunk()).await.map_err(|_| deadline_reached())??;
            let Some(chunk) = chunk else { break };
            out.write_all(&chunk).await?;
        }
        out.flush().await?;
        Ok(())
    }
    .await;
    if let Err(e) = written {
        drop(out);
        let _ = tokio::fs::remove_file(&local_path).await;
        return Err(e.context("Failed to stream file contents"));
    }
    Ok(RetrievedFile {
        kind: LanguageKind::from_path(&file.filename),
        relative_path: file.filename.clone(),
        local_path,
    })
}

#[cfg(test)]
mod tests {
    use mockito::{Matcher, Server};
    use serde_json::json;

    use super::*;
    use crate::test_support::{CountingServer, github};

    fn later() -> Instant { Instant::now() + std::time::Duration::from_secs(30) }

    fn token() -> AccessToken {
        serde_json::from_value(json!({ "token": "ghs_test" })).unwrap()
    }

    fn pull_request(server: &Server) -> PullRequestRef {
        PullRequestRef {
            files_url: Url::parse(&format!("{}/repos/octo/hello/pulls/1/files", server.url()))
                .unwrap(),
            repo_full_name: "octo/hello".to_string(),
            number: 1,
        }
    }

    fn page(page: &str) -> Matcher {
        Matcher::AllOf(vec![
            Matcher::UrlEncoded("per_page".into(), "100".into()),
            Matcher::UrlEncoded("page".into(), page.into()),
        ])
    }

    #[tokio::test]
    async fn test_fetch_preserves_nested_paths() {
        let mut server = Server::new_async().await;
        let listing = json!([
            { "filename": "a/util.py", "raw_url": format!("{}/raw/a/util.py", server.url()) },
            { "filename": "b/util.py", "raw_url": format!("{}/raw/b/util.py", server.url()) },
            {
                "filename": "gone.js",
                "raw_url": format!("{}/raw/gone.js", server.url()),
                "status": "removed"
            },
        ]);
        let list = server
            .mock("GET", "/repos/octo/hello/pulls/1/files")
            .match_query(page("1"))
            .match_header("authorization", "token ghs_test")
            .with_header("content-type", "application/json")
            .with_body(listing.to_string())
            .create_async()
            .await;
        let a = server.mock("GET", "/raw/a/util.py").with_body("import os\n").create_async().await;
        let b = server.mock("GET", "/raw/b/util.py").with_body("x=1\n").create_async().await;
        let gone = server.mock("GET", "/raw/gone.js").expect(0).create_async().await;

        let parent = tempfile::tempdir().unwrap();
        let workspace = Workspace::acquire(parent.path()).await.unwrap();
        let github = github(&server.url());
        let files = github
            .fetch_changed_files(&pull_request(&server), &token(), &workspace, 2, later())
            .await
            .unwrap();

        assert!(files.failed.is_empty());
        let paths: Vec<_> = files.retrieved.iter().map(|f| f.relative_path.as_str()).collect();
        assert_eq!(paths, ["a/util.py", "b/util.py"]);
        assert_eq!(files.retrieved[0].local_path, workspace.root().join("a/util.py"));
        assert_eq!(files.retrieved[0].kind, Some(LanguageKind::new("py")));
        let read = |path: &str| std::fs::read_to_string(workspace.root().join(path)).unwrap();
        assert_eq!(read("a/util.py"), "import os\n");
        assert_eq!(read("b/util.py"), "x=1\n");
        for mock in [list, a, b, gone] {
            mock.assert_async().await;
        }
    }

    #[tokio::test]
    async fn test_failed_download_is_reported_not_fatal() {
        let mut server = Server::new_async().await;
        let listing = json!([
            { "filename": "one.py", "raw_url": format!("{}/raw/one.py", server.url()) },
            { "filename": "two.py", "raw_url": format!("{}/raw/two.py", server.url()) },
            { "filename": "three.js", "raw_url": format!("{}/raw/three.js", server.url()) },
        ]);
        let _list = server
            .mock("GET", "/repos/octo/hello/pulls/1/files")
            .match_query(page("1"))
            .with_body(listing.to_string())
            .create_async()
            .await;
        let _one = server.mock("GET", "/raw/one.py").with_body("a = 1\n").create_async().await;
        let _two = server.mock("GET", "/raw/two.py").with_status(500).create_async().await;
        let _three =
            server.mock("GET", "/raw/three.js").with_body("let b;\n").create_async().await;

        let parent = tempfile::tempdir().unwrap();
        let workspace = Workspace::acquire(parent.path()).await.unwrap();
        let files = github(&server.url())
            .fetch_changed_files(&pull_request(&server), &token(), &workspace, 4, later())
            .await
            .unwrap();

        let paths: Vec<_> = files.retrieved.iter().map(|f| f.relative_path.as_str()).collect();
        assert_eq!(paths, ["one.py", "three.js"]);
        assert_eq!(files.failed.len(), 1);
        assert_eq!(files.failed[0].path, "two.py");
        assert!(!workspace.root().join("two.py").exists());
    }

    #[tokio::test]
    async fn test_listing_failure_aborts() {
        let mut server = Server::new_async().await;
        let _list = server
            .mock("GET", "/repos/octo/hello/pulls/1/files")
            .match_query(Matcher::Any)
            .with_status(404)
            .create_async()
            .await;
        let parent = tempfile::tempdir().unwrap();
        let workspace = Workspace::acquire(parent.path()).await.unwrap();
        let err = github(&server.url())
            .fetch_changed_files(&pull_request(&server), &token(), &workspace, 4, later())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Fetch(_)));
    }

    #[tokio::test]
    async fn test_listing_follows_pages() {
        let mut server = Server::new_async().await;
        let first: Vec<_> = (0..PER_PAGE)
            .map(|i| json!({ "filename": format!("f{i}.py"), "raw_url": null }))
            .collect();
        let first = server
            .mock("GET", "/repos/octo/hello/pulls/1/files")
            .match_query(page("1"))
            .with_body(serde_json::to_string(&first).unwrap())
            .create_async()
            .await;
        let second = server
            .mock("GET", "/repos/octo/hello/pulls/1/files")
            .match_query(page("2"))
            .with_body(json!([{ "filename": "last.js", "raw_url": null }]).to_string())
            .create_async()
            .await;
        let files = github(&server.url())
            .list_changed_files(&pull_request(&server), &token())
            .await
            .unwrap();
        assert_eq!(files.len(), PER_PAGE + 1);
        assert_eq!(files.last().unwrap().filename, "last.js");
        first.assert_async().await;
        second.assert_async().await;
    }

    #[tokio::test]
    async fn test_downloads_respect_concurrency_limit() {
        let mut server = Server::new_async().await;
        let raw = CountingServer::start(
            std::time::Duration::from_millis(150),
            "HTTP/1.1 200 OK\r\ncontent-length: 6\r\nconnection: close\r\n\r\nx = 1\n",
        )
        .await;
        let listing: Vec<_> = (0..6)
            .map(|i| json!({
                "filename": format!("f{i}.py"),
                "raw_url": format!("{}/f{i}", raw.url)
            }))
            .collect();
        let _list = server
            .mock("GET", "/repos/octo/hello/pulls/1/files")
            .match_query(page("1"))
            .with_body(serde_json::to_string(&listing).unwrap())
            .create_async()
            .await;
        let parent = tempfile::tempdir().unwrap();
        let workspace = Workspace::acquire(parent.path()).await.unwrap();
        let files = github(&server.url())
            .fetch_changed_files(&pull_request(&server), &token(), &workspace, 2, later())
            .await
            .unwrap();
        assert_eq!(files.retrieved.len(), 6);
        assert_eq!(raw.peak(), 2);
    }

    #[tokio::test]
    async fn test_deadline_fails_downloads_and_joins_tasks() {
        let mut server = Server::new_async().await;
        let raw = CountingServer::start(std::time::Duration::from_secs(10), "").await;
        let listing = json!([
            { "filename": "pkg/slow.py", "raw_url": format!("{}/slow.py", raw.url) },
        ]);
        let _list = server
            .mock("GET", "/repos/octo/hello/pulls/1/files")
            .match_query(page("1"))
            .with_body(listing.to_string())
            .create_async()
            .await;
        let parent = tempfile::tempdir().unwrap();
        let workspace = Workspace::acquire(parent.path()).await.unwrap();
        let started = Instant::now();
        let deadline = started + std::time::Duration::from_millis(300);
        let files = github(&server.url())
            .fetch_changed_files(&pull_request(&server), &token(), &workspace, 4, deadline)
            .await
            .unwrap();
        assert!(started.elapsed() < std::time::Duration::from_secs(5));
        assert!(files.retrieved.is_empty());
        assert_eq!(files.failed.len(), 1);
        assert!(files.failed[0].error.to_string().contains("deadline"), "{:?}", files.failed);
        assert!(!workspace.root().join("pkg").exists());
    }
}
