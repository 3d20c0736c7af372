use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rand::Rng;
use time::OffsetDateTime;

use crate::error::PipelineError;

const PREFIX: &str = "github-code-checker";

/// Per-run scratch directory.
///
/// Removal happens exactly once: either through [`Workspace::release`], or on drop if the
/// run was cancelled before reaching it.
#[derive(Debug)]
#[must_use]
pub struct Workspace {
    root: PathBuf,
    created_at: OffsetDateTime,
    released: bool,
}

impl Workspace {
    /// Create a uniquely named directory under `parent`.
    pub async fn acquire(parent: &Path) -> Result<Self> {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
        let mut attempt = 0;
        loop {
            let created_at = OffsetDateTime::now_utc();
            let suffix: u32 = rand::rng().random();
            let root = parent.join(format!(
                "{PREFIX}-{}-{suffix:08x}",
                created_at.unix_timestamp_nanos() / 1_000_000
            ));
            match tokio::fs::create_dir(&root).await {
                Ok(()) => {
                    tracing::debug!("Created workspace {}", root.display());
                    return Ok(Self { root, created_at, released: false });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists && attempt < 3 => {
                    attempt += 1;
                }
                Err(e) => {
                    return Err(e)
                        .with_context(|| format!("Failed to create workspace {}", root.display()));
                }
            }
        }
    }

    pub fn root(&self) -> &Path { &self.root }

    pub fn created_at(&self) -> OffsetDateTime { self.created_at }

    /// Recursively remove the workspace. If this is cancelled midway, drop finishes the job.
    pub async fn release(mut self) -> Result<(), PipelineError> {
        let result = tokio::fs::remove_dir_all(&self.root).await;
        self.released = true;
        match result {
            Ok(()) => {
                tracing::info!("Workspace {} deleted", self.root.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!("Workspace {} was already removed", self.root.display());
                Ok(())
            }
            Err(source) => Err(PipelineError::Cleanup { path: self.root.clone(), source }),
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        let root = std::mem::take(&mut self.root);
        // Keep blocking removal off the async workers when a runtime is around
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(move || remove_on_abort(&root));
            }
            Err(_) => remove_on_abort(&root),
        }
    }
}

fn remove_on_abort(root: &Path) {
    match std::fs::remove_dir_all(root) {
        Ok(()) => tracing::info!("Workspace {} deleted on abort", root.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::error!("Leaked workspace {}: {}", root.display(), e),
    }
}
