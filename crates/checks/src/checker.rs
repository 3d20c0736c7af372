use std::{path::Path, process::Stdio};

use anyhow::{Context, Result, anyhow};
use code_checker_core::config::CheckerConfig;
use tokio::process::Command;

/// Raw result of one checker invocation.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct CheckerOutput {
    /// Exit code, `None` if the process was terminated by a signal.
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Verdict {
    Clean,
    Issues(String),
    Failed(String),
}

/// Decide whether a checker reported issues, passed, or failed to run properly.
///
/// Linters report problems on stdout, with or without a non-zero exit (eslint exits 0 on
/// warnings). A non-zero exit with nothing on stdout is a crash or usage error.
pub fn classify(output: &CheckerOutput) -> Verdict {
    let stdout = output.stdout.trim();
    match output.status {
        None => Verdict::Failed("terminated by signal".to_string()),
        Some(_) if !stdout.is_empty() => Verdict::Issues(stdout.to_string()),
        Some(0) => Verdict::Clean,
        Some(code) => {
            let stderr = output.stderr.trim();
            if stderr.is_empty() {
                Verdict::Failed(format!("exited with {code} and no output"))
            } else {
                Verdict::Failed(format!("exited with {code}: {stderr}"))
            }
        }
    }
}

/// Run `<program> <args...> <path>` and capture its output.
///
/// Errors only when the process could not be run to completion.
pub async fn invoke(checker: &CheckerConfig, path: &Path) -> Result<CheckerOutput> {
    let mut command = Command::new(&checker.program);
    command
        .args(&checker.args)
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    let output = tokio::time::timeout(checker.timeout(), command.output())
        .await
        .map_err(|_| anyhow!("timed out after {}s", checker.timeout))?
        .with_context(|| format!("failed to run {}", checker.program))?;
    Ok(CheckerOutput {
        status: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}
