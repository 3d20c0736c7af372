use std::{collections::HashMap, path::PathBuf, time::Duration};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use url::Url;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub github: GitHubConfig,
    pub pipeline: PipelineConfig,
    pub checkers: CheckersConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    /// Timeout for inbound requests, in seconds.
    pub request_timeout: u64,
}

impl Default for ServerConfig {
    fn default() -> Self { Self { port: 3000, request_timeout: 30 } }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GitHubConfig {
    pub api_url: Url,
    pub user_agent: String,
    /// Timeout for every outbound request, in seconds.
    pub http_timeout: u64,
    pub app: GitHubAppConfig,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_url: Url::parse("https://api.github.com").expect("valid default URL"),
            user_agent: concat!("github-code-checker/", env!("CARGO_PKG_VERSION")).to_string(),
            http_timeout: 30,
            app: GitHubAppConfig::default(),
        }
    }
}

impl GitHubConfig {
    pub fn http_timeout(&self) -> Duration { Duration::from_secs(self.http_timeout) }
}

#[derive(Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct GitHubAppConfig {
    pub id: u64,
    pub webhook_secret: String,
    pub private_key: String,
}

impl std::fmt::Debug for GitHubAppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubAppConfig")
            .field("id", &self.id)
            .field("webhook_secret", &"[redacted]")
            .field("private_key", &"[redacted]")
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Parent directory for per-run workspaces. Defaults to the system temp dir.
    pub workspace_root: Option<PathBuf>,
    pub download_concurrency: usize,
    /// Deadline for a whole run, in seconds.
    pub run_timeout: u64,
    pub max_concurrent_runs: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workspace_root: None,
            download_concurrency: 4,
            run_timeout: 300,
            max_concurrent_runs: 8,
        }
    }
}

impl PipelineConfig {
    pub fn workspace_root(&self) -> PathBuf {
        self.workspace_root.clone().unwrap_or_else(std::env::temp_dir)
    }

    pub fn run_timeout(&self) -> Duration { Duration::from_secs(self.run_timeout) }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(transparent)]
pub struct CheckersConfig(pub Vec<CheckerConfig>);

impl Default for CheckersConfig {
    fn default() -> Self {
        Self(vec![
            CheckerConfig {
                name: "flake8".to_string(),
                program: "flake8".to_string(),
                args: vec![],
                extensions: vec!["py".to_string()],
                message: "PEP8 issues detected".to_string(),
                timeout: default_checker_timeout(),
            },
            CheckerConfig {
                name: "eslint".to_string(),
                program: "eslint".to_string(),
                args: vec!["--config".to_string(), "eslint.config.js".to_string()],
                extensions: vec!["js".to_string()],
                message: "ESLint issues detected".to_string(),
                timeout: default_checker_timeout(),
            },
        ])
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CheckerConfig {
    pub name: String,
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// File extensions (without the leading dot) routed to this checker.
    pub extensions: Vec<String>,
    /// Summary line posted with every finding.
    pub message: String,
    /// Per-invocation timeout, in seconds.
    #[serde(default = "default_checker_timeout")]
    pub timeout: u64,
}

fn default_checker_timeout() -> u64 { 60 }

impl CheckerConfig {
    pub fn timeout(&self) -> Duration { Duration::from_secs(self.timeout) }
}

impl Config {
    /// Load the config file if it exists, then apply environment overrides.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let mut config = Self::read(path)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse the config file alone. A missing file yields the defaults.
    pub fn read(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        match std::fs::read_to_string(&path) {
            Ok(contents) => serde_yaml::from_str(&contents)
                .with_context(|| format!("Failed to parse {}", path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No config file at {}, using defaults", path.display());
                Ok(Config::default())
            }
            Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
        }
    }

    /// Apply `APP_ID`, `PRIVATE_KEY`, `WEBHOOK_SECRET`, `PORT` and `GITHUB_API_URL`.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(id) = var("APP_ID") {
            self.github.app.id = id.trim().parse().context("APP_ID must be numeric")?;
        }
        if let Some(key) = var("PRIVATE_KEY") {
            // Keys passed through env files usually have escaped newlines
            self.github.app.private_key = key.replace("\\n", "\n");
        }
        if let Some(secret) = var("WEBHOOK_SECRET") {
            self.github.app.webhook_secret = secret;
        }
        if let Some(port) = var("PORT") {
            self.server.port = port.trim().parse().context("PORT must be a port number")?;
        }
        if let Some(url) = var("GITHUB_API_URL") {
            self.github.api_url = Url::parse(&url).context("GITHUB_API_URL must be a URL")?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let app = &self.github.app;
        if app.id == 0 {
            bail!("GitHub app ID is not configured");
        }
        if app.private_key.trim().is_empty() {
            bail!("GitHub app private key is not configured");
        }
        if app.webhook_secret.is_empty() {
            bail!("Webhook secret is not configured");
        }
        if self.pipeline.download_concurrency == 0 || self.pipeline.max_concurrent_runs == 0 {
            bail!("Pipeline concurrency limits must be at least 1");
        }
        self.checkers.validate()
    }
}

impl CheckersConfig {
    /// Every extension must map to exactly one checker.
    pub fn validate(&self) -> Result<()> {
        let mut claimed = HashMap::new();
        for checker in &self.0 {
            if checker.program.is_empty() {
                bail!("Checker {} has no program", checker.name);
            }
            for ext in &checker.extensions {
                let ext = ext.trim_start_matches('.').to_ascii_lowercase();
                if let Some(other) = claimed.insert(ext.clone(), checker.name.as_str()) {
                    bail!("Extension .{ext} is claimed by both {other} and {}", checker.name);
                }
            }
        }
        Ok(())
    }
}
