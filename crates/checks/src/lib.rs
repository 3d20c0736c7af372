pub mod checker;

use std::{collections::HashMap, path::Path};

use code_checker_core::{
    config::{CheckerConfig, CheckersConfig},
    error::PipelineError,
    models::{Finding, LanguageKind, RetrievedFile},
    util::strip_path_prefix,
};
use futures_util::future::join_all;

use crate::checker::{Verdict, classify, invoke};

/// Routes retrieved files to their checker by extension.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    checkers: Vec<CheckerConfig>,
    by_kind: HashMap<LanguageKind, usize>,
}

/// The files handed to one checker.
pub struct Bucket<'a> {
    pub checker: &'a CheckerConfig,
    pub files: Vec<&'a RetrievedFile>,
}

impl Dispatcher {
    pub fn new(config: &CheckersConfig) -> Self {
        let checkers = config.0.clone();
        let mut by_kind = HashMap::new();
        for (idx, checker) in checkers.iter().enumerate() {
            for ext in &checker.extensions {
                by_kind.entry(LanguageKind::new(ext)).or_insert(idx);
            }
        }
        Self { checkers, by_kind }
    }

    /// Split files into disjoint per-checker buckets, in checker order. Files of unknown
    /// kind are dropped.
    pub fn partition<'a>(&'a self, files: &'a [RetrievedFile]) -> Vec<Bucket<'a>> {
        let mut buckets: Vec<Bucket<'a>> =
            self.checkers.iter().map(|checker| Bucket { checker, files: vec![] }).collect();
        for file in files {
            let Some(&idx) = file.kind.as_ref().and_then(|kind| self.by_kind.get(kind)) else {
                tracing::debug!("No checker for {}", file.relative_path);
                continue;
            };
            buckets[idx].files.push(file);
        }
        buckets.retain(|bucket| !bucket.files.is_empty());
        buckets
    }

    /// Run every bucket concurrently and collect findings in bucket, then file, order.
    pub async fn run_checks(
        &self,
        files: &[RetrievedFile],
        workspace_root: &Path,
    ) -> Vec<Finding> {
        // Longest first: a symlinked temp dir resolves to a path ending in the original
        let mut prefixes = vec![];
        if let Ok(canonical) = std::fs::canonicalize(workspace_root)
            && canonical != workspace_root
        {
            prefixes.push(canonical);
        }
        prefixes.push(workspace_root.to_path_buf());
        let buckets = self.partition(files);
        let results =
            join_all(buckets.into_iter().map(|bucket| run_bucket(bucket, &prefixes))).await;
        results.into_iter().flatten().collect()
    }
}

async fn run_bucket(bucket: Bucket<'_>, prefixes: &[std::path::PathBuf]) -> Vec<Finding> {
    let checker = bucket.checker;
    let mut findings = Vec::new();
    for file in bucket.files {
        let verdict = match invoke(checker, &file.local_path).await {
            Ok(output) => classify(&output),
            Err(e) => Verdict::Failed(format!("{e:#}")),
        };
        match verdict {
            Verdict::Clean => {
                tracing::debug!("{} passed {}", file.relative_path, checker.name);
            }
            Verdict::Issues(stdout) => {
                let stdout = prefixes
                    .iter()
                    .fold(stdout, |text, prefix| strip_path_prefix(&text, prefix));
                tracing::info!("{} reported issues in {}", checker.name, file.relative_path);
                findings.push(Finding {
                    path: file.relative_path.clone(),
                    message: checker.message.clone(),
                    issues: stdout.split('\n').map(str::to_string).collect(),
                });
            }
            Verdict::Failed(reason) => {
                let err = PipelineError::CheckerExecution {
                    checker: checker.name.clone(),
                    path: file.relative_path.clone(),
                    reason,
                };
                tracing::error!("{err}");
            }
        }
    }
    findings
}
