pub mod auth;
pub mod comments;
pub mod files;
pub mod payload;
pub mod webhook;

use std::sync::Arc;

use anyhow::{Context, Result};
use code_checker_core::config::GitHubConfig;
use jsonwebtoken::EncodingKey;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use url::Url;

const ACCEPT_V3: &str = "application/vnd.github.v3+json";

/// Process-wide GitHub API access. Immutable after startup.
#[derive(Clone)]
pub struct GitHub {
    pub client: reqwest::Client,
    pub api_url: Url,
    pub app_id: u64,
    key: Arc<EncodingKey>,
}

impl GitHub {
    pub fn new(config: &GitHubConfig) -> Result<Arc<Self>> {
        let key = EncodingKey::from_rsa_pem(config.app.private_key.as_bytes())
            .context("Failed to parse GitHub app private key")?;
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_V3));
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .timeout(config.http_timeout())
            .build()
            .context("Failed to create HTTP client")?;
        tracing::info!("GitHub app {} using API {}", config.app.id, config.api_url);
        Ok(Arc::new(Self {
            client,
            api_url: config.api_url.clone(),
            app_id: config.app.id,
            key: Arc::new(key),
        }))
    }

    /// Build an API URL from path segments, keeping any base path (GitHub Enterprise).
    pub fn api(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.api_url.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("API URL {} cannot be a base", self.api_url))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::github;

    #[test]
    fn test_api_url_keeps_base_path() {
        let ghe = "https://ghe.example.com/api/v3/repos/o/r/issues/1/comments";
        let cases: &[(&str, &str)] = &[
            ("https://api.github.com", "https://api.github.com/repos/o/r/issues/1/comments"),
            ("https://ghe.example.com/api/v3", ghe),
            ("https://ghe.example.com/api/v3/", ghe),
        ];
        for &(base, expected) in cases {
            let url = github(base).api(&["repos", "o", "r", "issues", "1", "comments"]).unwrap();
            assert_eq!(url.as_str(), expected);
        }
    }
}
