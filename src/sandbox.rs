use std::collections::HashMap;
use std::time::Duration;

use tokio::process::Command;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::error::{AppError, AppResult};

/// Result of a sandboxed command invocation. A non-zero exit code is data, not
/// a Rust error; the caller decides whether that counts as a failed step.
#[derive(Debug, Clone)]
pub struct CommandOutcome {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutcome {
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }
}

/// Executes `COMMAND` steps. Every invocation spawns an isolated child process with
/// a curated environment (never the daemon's own inherited environment) and shares
/// no state across invocations.
pub struct Sandbox {
    curated_env: HashMap<String, String>,
}

impl Sandbox {
    pub fn new() -> Self {
        let mut curated_env = HashMap::new();
        if let Ok(path) = std::env::var("PATH") {
            curated_env.insert("PATH".to_string(), path);
        }
        curated_env.insert("HOME".to_string(), std::env::var("HOME").unwrap_or_default());
        Self { curated_env }
    }

    pub async fn run(
        &self,
        command: &str,
        run_timeout: Duration,
        cancel: &CancellationToken,
    ) -> AppResult<CommandOutcome> {
        let mut cmd = Command::new("/bin/sh");
        cmd.arg("-c").arg(command);
        cmd.env_clear();
        for (k, v) in &self.curated_env {
            cmd.env(k, v);
        }
        cmd.stdout(std::process::Stdio::piped());
        cmd.stderr(std::process::Stdio::piped());

        let child = cmd
            .spawn()
            .map_err(|e| AppError::Action(format!("failed to spawn `{command}`: {e}")))?;

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(AppError::Cancelled),
            result = timeout(run_timeout, child.wait_with_output()) => {
                let output = result
                    .map_err(|_| AppError::Timeout(format!("command `{command}`")))?
                    .map_err(|e| AppError::Action(format!("command `{command}` failed: {e}")))?;
                Ok(CommandOutcome {
                    exit_code: output.status.code().unwrap_or(-1),
                    stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                    stderr: String::from_utf8_lossy(&output.stderr).to_string(),
                })
            }
        }
    }
}

impl Default for Sandbox {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn runs_simple_command() {
        let sandbox = Sandbox::new();
        let cancel = CancellationToken::new();
        let outcome = sandbox
            .run("echo hello", Duration::from_secs(5), &cancel)
            .await
            .unwrap();
        assert!(outcome.succeeded());
        assert!(outcome.stdout.contains("hello"));
    }

    #[tokio::test]
    async fn reports_nonzero_exit_as_data() {
        let sandbox = Sandbox::new();
        let cancel = CancellationToken::new();
        let outcome = sandbox
            .run("exit 7", Duration::from_secs(5), &cancel)
            .await
            .unwrap();
        assert!(!outcome.succeeded());
        assert_eq!(outcome.exit_code, 7);
    }

    #[tokio::test]
    async fn cancellation_short_circuits() {
        let sandbox = Sandbox::new();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = sandbox.run("sleep 1", Duration::from_secs(5), &cancel).await;
        assert!(matches!(result, Err(AppError::Cancelled)));
    }
}
