/// External tool execution with a hard timeout and cooperative cancellation

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::error::{BackupError, BackupResult};
use super::tool_locator::ToolPath;
use crate::utils::captured_text;

/// A handle for cancelling a running tool.
///
/// Clones share state, so the request handler can keep one and hand another
/// to the runner.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    state: Arc<watch::Sender<bool>>,
}

impl CancellationToken {
    pub fn new() -> Self {
        let (state, _) = watch::channel(false);
        Self {
            state: Arc::new(state),
        }
    }

    pub fn cancel(&self) {
        self.state.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.state.borrow()
    }

    /// Resolves once `cancel` has been called
    pub async fn cancelled(&self) {
        let mut rx = self.state.subscribe();
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Successful run of a tool
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub status: ExitStatus,
    /// Captured stdout (unless redirected to a file) followed by stderr
    pub output: String,
}

/// One invocation of an external tool
#[derive(Debug, Clone)]
pub struct ToolCommand {
    tool: String,
    program: PathBuf,
    args: Vec<OsString>,
    envs: Vec<(String, String)>,
    stdin_file: Option<PathBuf>,
    stdout_file: Option<PathBuf>,
}

enum Outcome {
    Exited(std::io::Result<ExitStatus>),
    TimedOut,
    Cancelled,
}

impl ToolCommand {
    pub fn new(tool: impl Into<String>, path: &ToolPath) -> Self {
        Self {
            tool: tool.into(),
            program: path.program(),
            args: Vec::new(),
            envs: Vec::new(),
            stdin_file: None,
            stdout_file: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Set an environment variable for the child only
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// Feed the file's content to the tool's stdin
    pub fn stdin_file(mut self, path: impl AsRef<Path>) -> Self {
        self.stdin_file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Redirect the tool's stdout into a file, truncating it
    pub fn stdout_file(mut self, path: impl AsRef<Path>) -> Self {
        self.stdout_file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Program and arguments for logs; environment values are never shown
    pub fn describe(&self) -> String {
        let mut parts = vec![self.program.display().to_string()];
        parts.extend(self.args.iter().map(|a| a.to_string_lossy().to_string()));
        parts.join(" ")
    }

    /// Run to completion. A nonzero exit is a `ToolFailure` carrying the
    /// captured output; a spawn failure because the program does not exist
    /// is `ToolUnavailable`.
    pub async fn run(&self, timeout: Duration, cancel: &CancellationToken) -> BackupResult<ToolOutput> {
        if cancel.is_cancelled() {
            return Err(BackupError::Cancelled { tool: self.tool.clone() });
        }

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .envs(self.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        match &self.stdin_file {
            Some(path) => {
                let file = std::fs::File::open(path).map_err(|e| BackupError::io(path, e))?;
                cmd.stdin(Stdio::from(file));
            }
            None => {
                cmd.stdin(Stdio::null());
            }
        }

        match &self.stdout_file {
            Some(path) => {
                let file = std::fs::File::create(path).map_err(|e| BackupError::io(path, e))?;
                cmd.stdout(Stdio::from(file));
            }
            None => {
                cmd.stdout(Stdio::piped());
            }
        }

        debug!(tool = %self.tool, command = %self.describe(), "Spawning external tool");

        let mut child = cmd.spawn().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => {
                BackupError::ToolUnavailable { tool: self.tool.clone() }
            }
            _ => BackupError::io(&self.program, e),
        })?;

        let stdout_task = child.stdout.take().map(drain);
        let stderr_task = child.stderr.take().map(drain);

        let outcome = tokio::select! {
            status = child.wait() => Outcome::Exited(status),
            _ = tokio::time::sleep(timeout) => Outcome::TimedOut,
            _ = cancel.cancelled() => Outcome::Cancelled,
        };

        let status = match outcome {
            Outcome::Exited(status) => status.map_err(|e| BackupError::io(&self.program, e))?,
            Outcome::TimedOut => {
                warn!(tool = %self.tool, timeout = ?timeout, "External tool timed out, killing it");
                let _ = child.kill().await;
                return Err(BackupError::ToolTimeout {
                    tool: self.tool.clone(),
                    after: timeout,
                });
            }
            Outcome::Cancelled => {
                warn!(tool = %self.tool, "External tool cancelled, killing it");
                let _ = child.kill().await;
                return Err(BackupError::Cancelled { tool: self.tool.clone() });
            }
        };

        let mut captured = Vec::new();
        for task in [stdout_task, stderr_task].into_iter().flatten() {
            if let Ok(bytes) = task.await {
                if !captured.is_empty() && !bytes.is_empty() {
                    captured.push(b'\n');
                }
                captured.extend_from_slice(&bytes);
            }
        }
        let output = captured_text(&captured);

        if !status.success() {
            return Err(BackupError::ToolFailure {
                tool: self.tool.clone(),
                status: status.to_string(),
                output,
            });
        }

        Ok(ToolOutput { status, output })
    }
}

fn drain<R>(mut reader: R) -> JoinHandle<Vec<u8>>
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        let _ = reader.read_to_end(&mut buf).await;
        buf
    })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Instant;
    use tempfile::TempDir;

    fn sh(script: &str) -> ToolCommand {
        ToolCommand::new("sh", &ToolPath::Assumed("sh".to_string()))
            .arg("-c")
            .arg(script)
    }

    #[tokio::test]
    async fn test_captures_output() {
        let out = sh("echo hello; echo oops >&2")
            .run(Duration::from_secs(10), &CancellationToken::new())
            .await
            .unwrap();

        assert!(out.status.success());
        assert_eq!(out.output, "hello\n\noops");
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_failure_with_output() {
        let err = sh("echo 'ERROR 1045: Access denied' >&2; exit 3")
            .run(Duration::from_secs(10), &CancellationToken::new())
            .await
            .unwrap_err();

        match err {
            BackupError::ToolFailure { output, status, .. } => {
                assert_eq!(output, "ERROR 1045: Access denied");
                assert!(status.contains('3'));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_program_is_unavailable() {
        let cmd = ToolCommand::new(
            "mysqldump",
            &ToolPath::Assumed("store-admin-no-such-tool".to_string()),
        );
        let err = cmd
            .run(Duration::from_secs(10), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, BackupError::ToolUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_timeout_kills_child() {
        let started = Instant::now();
        let err = sh("sleep 30")
            .run(Duration::from_millis(200), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, BackupError::ToolTimeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_cancellation() {
        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let err = sh("sleep 30")
            .run(Duration::from_secs(30), &token)
            .await
            .unwrap_err();
        assert!(matches!(err, BackupError::Cancelled { .. }));
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_file_redirection_and_env() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("in.sql");
        let output = dir.path().join("out.sql");
        std::fs::write(&input, "SELECT 1;\n").unwrap();

        sh("cat; echo \"-- $MYSQL_PWD\"")
            .env("MYSQL_PWD", "hunter2")
            .stdin_file(&input)
            .stdout_file(&output)
            .run(Duration::from_secs(10), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(std::fs::read_to_string(&output).unwrap(), "SELECT 1;\n-- hunter2\n");
    }

    #[test]
    fn test_describe_hides_env() {
        let cmd = sh("true").env("MYSQL_PWD", "hunter2");
        assert_eq!(cmd.describe(), "sh -c true");
    }
}
