/// Error kinds for the backup engine
///
/// Every expected failure of a dump, restore, or repository action is one of
/// these variants. The orchestrator branches on them (tool problems trigger
/// the in-process fallback) and the action boundary turns them into
/// structured results instead of letting them escape.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackupError {
    #[error("Cannot access backup directory {}: {source}", .path.display())]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} is not available on this host")]
    ToolUnavailable { tool: String },

    #[error("{tool} failed ({status})")]
    ToolFailure {
        tool: String,
        status: String,
        output: String,
    },

    #[error("{tool} did not finish within {}", format_timeout(.after))]
    ToolTimeout { tool: String, after: Duration },

    #[error("{tool} was cancelled")]
    Cancelled { tool: String },

    #[error("Backup file not found")]
    NotFound { filename: String },

    #[error("Backup prefix '{prefix}' cannot be used in file names: {source}")]
    InvalidPrefix {
        prefix: String,
        #[source]
        source: regex::Error,
    },

    #[error("Could not render table {table}: {details}")]
    Serialization { table: String, details: String },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Another backup operation is in progress")]
    Busy,

    #[error("Script '{0}' is not in the allow-list")]
    UnknownScript(String),

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn format_timeout(after: &Duration) -> String {
    humantime::format_duration(*after).to_string()
}

impl BackupError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        BackupError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn not_found(filename: &str) -> Self {
        BackupError::NotFound {
            filename: filename.to_string(),
        }
    }

    /// Whether the dump path should fall back to the in-process writer
    pub fn triggers_fallback(&self) -> bool {
        matches!(
            self,
            BackupError::ToolUnavailable { .. }
                | BackupError::ToolFailure { .. }
                | BackupError::ToolTimeout { .. }
        )
    }

    /// Captured tool output, if this error carries any
    pub fn diagnostic_output(&self) -> Option<&str> {
        match self {
            BackupError::ToolFailure { output, .. } if !output.is_empty() => Some(output),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, BackupError::NotFound { .. })
    }
}

pub type BackupResult<T> = std::result::Result<T, BackupError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_classification() {
        assert!(BackupError::ToolUnavailable { tool: "mysqldump".into() }.triggers_fallback());
        assert!(BackupError::ToolTimeout {
            tool: "mysqldump".into(),
            after: Duration::from_secs(5),
        }
        .triggers_fallback());
        assert!(!BackupError::Busy.triggers_fallback());
        assert!(!BackupError::Cancelled { tool: "mysqldump".into() }.triggers_fallback());
    }

    #[test]
    fn test_not_found_message() {
        let err = BackupError::not_found("backup_2024-01-01_00-00-00.sql");
        assert_eq!(err.to_string(), "Backup file not found");
        assert!(err.is_not_found());
    }

    #[test]
    fn test_diagnostic_output() {
        let err = BackupError::ToolFailure {
            tool: "mysql".into(),
            status: "exit status: 1".into(),
            output: "ERROR 1045 (28000): Access denied".into(),
        };
        assert_eq!(err.diagnostic_output(), Some("ERROR 1045 (28000): Access denied"));
        assert_eq!(BackupError::Busy.diagnostic_output(), None);
    }
}
