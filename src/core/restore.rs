/// Restore of a backup artifact through the `mysql` client
///
/// There is no in-process restore. A restore that fails part way may leave
/// the database partially loaded; callers are told so instead of it being
/// hidden.

use tracing::{info, warn};

use super::backup::{ActionResult, BackupManager};
use super::error::{BackupError, BackupResult};
use super::process::CancellationToken;

/// Note added to failures that happened after the client started loading
pub const PARTIAL_RESTORE_WARNING: &str =
    "The database may be partially restored; verify it before relying on it.";

/// Outcome of a successful restore
#[derive(Debug, Clone)]
pub struct RestoreReport {
    pub filename: String,
    /// Whatever the client printed; usually empty
    pub output: String,
}

impl BackupManager {
    /// Load an artifact into the configured database
    pub async fn restore_backup(
        &self,
        filename: &str,
        cancel: &CancellationToken,
    ) -> BackupResult<RestoreReport> {
        // Existence is checked before any tool lookup or locking
        self.repository().resolve(filename)?;

        let _lock = self.lock().await?;
        // A delete may have won the lock first
        let path = self.repository().resolve(filename)?;

        let tool = self.settings().restore_tool.as_str();
        let program = self
            .locator()
            .locate(tool)
            .ok_or_else(|| BackupError::ToolUnavailable { tool: tool.to_string() })?;

        let cmd = self
            .client_command(tool, &program)
            .arg(self.database().name.as_str())
            .stdin_file(&path);

        info!(filename, tool = %program, "Restoring backup");
        match cmd.run(self.settings().tool_timeout, cancel).await {
            Ok(out) => {
                info!(filename, "Restore finished");
                Ok(RestoreReport {
                    filename: filename.to_string(),
                    output: out.output,
                })
            }
            Err(e) => {
                warn!(filename, error = %e, "Restore failed");
                Err(e)
            }
        }
    }
}

impl ActionResult {
    pub fn from_restore(outcome: BackupResult<RestoreReport>) -> Self {
        match outcome {
            Ok(report) => Self::ok(
                format!("Database restored from {}", report.filename),
                Some(report.output),
            ),
            Err(e) => {
                let mut result = Self::failed(&e);
                if may_be_partial(&e) {
                    result.message = format!("Restore failed: {}. {}", e, PARTIAL_RESTORE_WARNING);
                }
                if let Some(output) = &result.output {
                    result.message = format!("{}\n{}", result.message, output);
                }
                result
            }
        }
    }
}

/// Whether the client had already started loading when the error happened
pub fn may_be_partial(error: &BackupError) -> bool {
    matches!(
        error,
        BackupError::ToolFailure { .. } | BackupError::ToolTimeout { .. } | BackupError::Cancelled { .. }
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::backup::tests::{manager, scratch_settings};
    use crate::core::snapshot::MockSnapshotSource;
    use std::time::Duration;
    use tempfile::TempDir;

    const ARTIFACT: &str = "backup_2024-05-01_10-00-00.sql";

    fn with_artifact(scratch: &TempDir) -> crate::core::config::BackupSettings {
        let settings = scratch_settings(scratch.path());
        std::fs::create_dir_all(&settings.backup_dir).unwrap();
        std::fs::write(settings.backup_dir.join(ARTIFACT), "INSERT INTO `t` VALUES ('1');\n").unwrap();
        settings
    }

    #[tokio::test]
    async fn test_missing_file_skips_tool_lookup() {
        let scratch = TempDir::new().unwrap();
        let mut settings = scratch_settings(scratch.path());
        // Would fail loudly if a lookup or spawn happened
        settings.restore_tool = "/nonexistent/mysql".to_string();

        let result = ActionResult::from_restore(
            manager(settings.clone(), MockSnapshotSource::new())
                .restore_backup(ARTIFACT, &CancellationToken::new())
                .await,
        );

        assert_eq!(
            result,
            ActionResult {
                success: false,
                message: "Backup file not found".to_string(),
                output: None,
            }
        );
        // Nothing was created, not even the lock file
        assert!(!settings.backup_dir.exists());
    }

    #[tokio::test]
    async fn test_invalid_name_is_not_found() {
        let scratch = TempDir::new().unwrap();
        let settings = with_artifact(&scratch);

        let err = manager(settings, MockSnapshotSource::new())
            .restore_backup("../../etc/passwd", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_no_client_is_unavailable() {
        let scratch = TempDir::new().unwrap();
        let settings = with_artifact(&scratch);

        let result = ActionResult::from_restore(
            manager(settings, MockSnapshotSource::new())
                .restore_backup(ARTIFACT, &CancellationToken::new())
                .await,
        );
        assert!(!result.success);
        assert!(result.message.contains("not available"));
        assert!(!result.message.contains("partially"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_restore_feeds_artifact_to_client() {
        use crate::core::backup::tests::install_tool;

        let scratch = TempDir::new().unwrap();
        let settings = with_artifact(&scratch);
        let seen = scratch.path().join("seen.sql");
        install_tool(
            &scratch.path().join("vendor"),
            "mysql",
            &format!(
                "[ \"$MYSQL_PWD\" = \"s3cret\" ] || exit 9\ncat > '{}'\necho \"loaded into $4\"",
                seen.display()
            ),
        );

        let result = ActionResult::from_restore(
            manager(settings, MockSnapshotSource::new())
                .restore_backup(ARTIFACT, &CancellationToken::new())
                .await,
        );

        assert!(result.success, "{:?}", result);
        assert_eq!(result.message, format!("Database restored from {}", ARTIFACT));
        assert_eq!(result.output.as_deref(), Some("loaded into shop"));
        assert_eq!(
            std::fs::read_to_string(&seen).unwrap(),
            "INSERT INTO `t` VALUES ('1');\n"
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_client_failure_surfaces_output() {
        use crate::core::backup::tests::install_tool;

        let scratch = TempDir::new().unwrap();
        let settings = with_artifact(&scratch);
        install_tool(
            &scratch.path().join("vendor"),
            "mysql",
            "cat > /dev/null\necho \"ERROR 1064 (42000) at line 1: You have an error in your SQL syntax\" >&2\nexit 1",
        );

        let result = ActionResult::from_restore(
            manager(settings, MockSnapshotSource::new())
                .restore_backup(ARTIFACT, &CancellationToken::new())
                .await,
        );

        assert!(!result.success);
        assert!(result.message.contains(PARTIAL_RESTORE_WARNING));
        assert!(result
            .message
            .ends_with("\nERROR 1064 (42000) at line 1: You have an error in your SQL syntax"));
        assert_eq!(
            result.output.as_deref(),
            Some("ERROR 1064 (42000) at line 1: You have an error in your SQL syntax")
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_delete_while_waiting_for_lock_is_not_found() {
        use crate::core::backup::tests::install_tool;
        use std::sync::Arc;

        let scratch = TempDir::new().unwrap();
        let settings = with_artifact(&scratch);
        let artifact_path = settings.backup_dir.join(ARTIFACT);
        install_tool(&scratch.path().join("vendor"), "mysql", "cat > /dev/null");

        let manager = Arc::new(manager(settings, MockSnapshotSource::new()));
        let held = manager.lock().await.unwrap();

        let restore = tokio::spawn({
            let manager = Arc::clone(&manager);
            async move {
                manager
                    .restore_backup(ARTIFACT, &CancellationToken::new())
                    .await
            }
        });

        // The restore has passed its first check and is waiting on the lock
        tokio::time::sleep(Duration::from_millis(50)).await;
        std::fs::remove_file(&artifact_path).unwrap();
        drop(held);

        let err = restore.await.unwrap().unwrap_err();
        assert!(err.is_not_found(), "{:?}", err);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_client_timeout_is_hard_failure() {
        use crate::core::backup::tests::install_tool;

        let scratch = TempDir::new().unwrap();
        let mut settings = with_artifact(&scratch);
        settings.tool_timeout = Duration::from_millis(300);
        install_tool(&scratch.path().join("vendor"), "mysql", "sleep 30");

        let err = manager(settings, MockSnapshotSource::new())
            .restore_backup(ARTIFACT, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, BackupError::ToolTimeout { .. }));
        assert!(may_be_partial(&err));
    }
}
