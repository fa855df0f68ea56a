/// Backup creation and the operator-facing backup actions
///
/// `create_backup` prefers the installed `mysqldump`. When that tool is
/// missing, fails, produces nothing, or runs past its timeout, the partial
/// output is removed and the database is read in-process instead, producing
/// a plain artifact plus a portable `-remote` sibling from the same read.
///
/// Create, delete and restore run under the backup directory lock.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use super::config::{BackupSettings, DatabaseConfig};
use super::database::MySqlSource;
use super::error::{BackupError, BackupResult};
use super::lock::DirectoryLock;
use super::process::{CancellationToken, ToolCommand};
use super::repository::{BackupArtifact, BackupDownload, BackupRepository};
use super::snapshot::{compose, DumpMode, RecordCounts, SnapshotSource};
use super::tool_locator::{ToolLocator, ToolPath};
use crate::utils::{format_bytes, PARTIAL_EXTENSION};

/// How an artifact was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DumpMethod {
    ExternalTool,
    InProcess,
}

impl std::fmt::Display for DumpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DumpMethod::ExternalTool => write!(f, "external tool"),
            DumpMethod::InProcess => write!(f, "in-process exporter"),
        }
    }
}

/// Outcome of a successful dump
#[derive(Debug, Clone)]
pub struct DumpReport {
    pub artifact: BackupArtifact,
    /// Portable sibling; only written by the in-process path
    pub remote_artifact: Option<BackupArtifact>,
    pub method: DumpMethod,
    /// `None` when counting failed
    pub counts: Option<RecordCounts>,
}

/// Result of `create_backup` as reported to operators
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DumpResult {
    pub success: bool,
    pub message: String,
    pub artifact: Option<BackupArtifact>,
    pub remote_artifact: Option<BackupArtifact>,
    pub method: Option<DumpMethod>,
    pub table_count: Option<usize>,
    pub record_count: Option<u64>,
}

impl DumpResult {
    pub fn from_outcome(outcome: BackupResult<DumpReport>) -> Self {
        match outcome {
            Ok(report) => {
                let mut message = format!(
                    "Backup created: {} ({}) using the {}",
                    report.artifact.filename,
                    format_bytes(report.artifact.size_bytes),
                    report.method
                );
                match (&report.remote_artifact, report.method) {
                    (Some(remote), _) => {
                        message.push_str(&format!("; remote copy: {}", remote.filename));
                    }
                    (None, DumpMethod::InProcess) => {
                        message.push_str("; the remote copy could not be written");
                    }
                    (None, DumpMethod::ExternalTool) => {}
                }

                Self {
                    success: true,
                    message,
                    artifact: Some(report.artifact),
                    remote_artifact: report.remote_artifact,
                    method: Some(report.method),
                    table_count: report.counts.map(|c| c.tables),
                    record_count: report.counts.map(|c| c.records),
                }
            }
            Err(e) => Self {
                success: false,
                message: format!("Backup failed: {}", e),
                artifact: None,
                remote_artifact: None,
                method: None,
                table_count: None,
                record_count: None,
            },
        }
    }
}

/// Result of restore, delete and script actions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    pub success: bool,
    pub message: String,
    /// Raw diagnostic text from the tool, when there is any
    pub output: Option<String>,
}

impl ActionResult {
    pub fn ok(message: impl Into<String>, output: Option<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            output: output.filter(|o| !o.is_empty()),
        }
    }

    pub fn failed(error: &BackupError) -> Self {
        Self {
            success: false,
            message: error.to_string(),
            output: error.diagnostic_output().map(str::to_string),
        }
    }

    pub fn from_delete(outcome: BackupResult<BackupArtifact>) -> Self {
        match outcome {
            Ok(artifact) => Self::ok(format!("Deleted {}", artifact.filename), None),
            Err(e) => Self::failed(&e),
        }
    }
}

pub struct BackupManager {
    settings: BackupSettings,
    database: DatabaseConfig,
    source: Arc<dyn SnapshotSource>,
    locator: ToolLocator,
    repository: BackupRepository,
}

impl BackupManager {
    pub fn new(settings: BackupSettings, database: DatabaseConfig) -> BackupResult<Self> {
        let source = Arc::new(MySqlSource::new(&database));
        let locator = ToolLocator::from_settings(&settings);
        let repository = BackupRepository::new(&settings.backup_dir, &settings.prefix)?;

        Ok(Self {
            settings,
            database,
            source,
            locator,
            repository,
        })
    }

    /// Replace the database reader used by the in-process path and counting
    pub fn with_source(mut self, source: Arc<dyn SnapshotSource>) -> Self {
        self.source = source;
        self
    }

    pub fn with_locator(mut self, locator: ToolLocator) -> Self {
        self.locator = locator;
        self
    }

    pub fn settings(&self) -> &BackupSettings {
        &self.settings
    }

    pub fn database(&self) -> &DatabaseConfig {
        &self.database
    }

    pub fn repository(&self) -> &BackupRepository {
        &self.repository
    }

    pub(crate) fn locator(&self) -> &ToolLocator {
        &self.locator
    }

    pub(crate) async fn lock(&self) -> BackupResult<DirectoryLock> {
        DirectoryLock::acquire(&self.settings.backup_dir, self.settings.lock_wait).await
    }

    /// A MySQL client tool invocation with the connection arguments applied.
    /// The password travels in the child's environment only.
    pub(crate) fn client_command(&self, tool: &str, path: &ToolPath) -> ToolCommand {
        let mut cmd = ToolCommand::new(tool, path)
            .arg(format!("--host={}", self.database.host))
            .arg(format!("--port={}", self.database.port))
            .arg(format!("--user={}", self.database.user));

        if let Some(password) = &self.database.password {
            cmd = cmd.env("MYSQL_PWD", password.as_str());
        }

        cmd
    }

    /// Dump the database into a new artifact
    pub async fn create_backup(&self, cancel: &CancellationToken) -> BackupResult<DumpReport> {
        let _lock = self.lock().await?;

        let generated_at = Local::now();
        let filename = self.repository.naming().filename_for(generated_at);
        let target = self.settings.backup_dir.join(&filename);

        match self.dump_with_tool(&target, cancel).await {
            Ok(()) => {
                let counts = match self.source.count_records().await {
                    Ok(counts) => Some(counts),
                    Err(e) => {
                        warn!(error = %e, "Could not count records after dump");
                        None
                    }
                };
                let artifact = self.repository.artifact(&filename)?;
                info!(
                    filename = %artifact.filename,
                    size = artifact.size_bytes,
                    "Backup created with {}",
                    self.settings.dump_tool
                );

                Ok(DumpReport {
                    artifact,
                    remote_artifact: None,
                    method: DumpMethod::ExternalTool,
                    counts,
                })
            }
            Err(e) if e.triggers_fallback() => {
                warn!(error = %e, "External dump unusable, falling back to in-process dump");
                self.dump_in_process(&filename, generated_at).await
            }
            Err(e) => Err(e),
        }
    }

    async fn dump_with_tool(&self, target: &Path, cancel: &CancellationToken) -> BackupResult<()> {
        let tool = self.settings.dump_tool.as_str();
        let path = self
            .locator
            .locate(tool)
            .ok_or_else(|| BackupError::ToolUnavailable { tool: tool.to_string() })?;

        let partial = partial_path(target);
        let cmd = self
            .client_command(tool, &path)
            .arg("--single-transaction")
            .arg("--routines")
            .arg("--triggers")
            .arg("--add-drop-table")
            .arg(self.database.name.as_str())
            .stdout_file(&partial);

        let result = match cmd.run(self.settings.tool_timeout, cancel).await {
            Ok(out) => match std::fs::metadata(&partial) {
                Ok(meta) if meta.len() > 0 => Ok(()),
                _ => Err(BackupError::ToolFailure {
                    tool: tool.to_string(),
                    status: out.status.to_string(),
                    output: format!("{} produced an empty dump", tool),
                }),
            },
            Err(e) => Err(e),
        };

        let result = result.and_then(|()| {
            std::fs::rename(&partial, target).map_err(|e| BackupError::io(target, e))
        });

        if result.is_err() {
            remove_partial(&partial);
        }

        result
    }

    async fn dump_in_process(
        &self,
        filename: &str,
        generated_at: DateTime<Local>,
    ) -> BackupResult<DumpReport> {
        let tables = self.source.read_tables().await?;
        let counts = RecordCounts::of(&tables);
        let dir = &self.settings.backup_dir;

        let plain = compose(&tables, DumpMode::Plain, &self.database.name, generated_at);
        write_atomically(&dir.join(filename), plain.as_bytes()).await?;
        let artifact = self.repository.artifact(filename)?;

        let remote_name = self.repository.naming().remote_sibling(filename);
        let portable = compose(&tables, DumpMode::Portable, &self.database.name, generated_at);
        let remote_artifact = match write_atomically(&dir.join(&remote_name), portable.as_bytes()).await {
            Ok(()) => self.repository.artifact(&remote_name).ok(),
            Err(e) => {
                warn!(filename = %remote_name, error = %e, "Could not write remote copy");
                None
            }
        };

        info!(
            filename = %artifact.filename,
            tables = counts.tables,
            records = counts.records,
            "Backup created in-process"
        );

        Ok(DumpReport {
            artifact,
            remote_artifact,
            method: DumpMethod::InProcess,
            counts: Some(counts),
        })
    }

    /// Artifacts in the backup directory, newest first
    pub fn list_backups(&self) -> BackupResult<Vec<BackupArtifact>> {
        self.repository.list()
    }

    pub async fn delete_backup(&self, filename: &str) -> BackupResult<BackupArtifact> {
        // Reject unknown names before waiting on the lock
        self.repository.resolve(filename)?;
        let _lock = self.lock().await?;
        self.repository.delete(filename)
    }

    /// Open an artifact for download
    pub async fn open_backup(&self, filename: &str) -> BackupResult<BackupDownload> {
        self.repository.open(filename).await
    }
}

fn partial_path(target: &Path) -> PathBuf {
    let mut name = target.as_os_str().to_owned();
    name.push(".");
    name.push(PARTIAL_EXTENSION);
    PathBuf::from(name)
}

fn remove_partial(partial: &Path) {
    match std::fs::remove_file(partial) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %partial.display(), error = %e, "Could not remove partial dump"),
    }
}

/// Write under a `.part` name and rename into place
async fn write_atomically(target: &Path, contents: &[u8]) -> BackupResult<()> {
    let partial = partial_path(target);

    let result = async {
        tokio::fs::write(&partial, contents)
            .await
            .map_err(|e| BackupError::io(&partial, e))?;
        tokio::fs::rename(&partial, target)
            .await
            .map_err(|e| BackupError::io(target, e))
    }
    .await;

    if result.is_err() {
        remove_partial(&partial);
    }
    result
}
