/// Backup artifacts on disk: naming, listing, deletion and download
///
/// Only names matching `<prefix>_<YYYY-MM-DD_HH-mm-ss>[-remote].sql` are ever
/// resolved to a path. Anything else, including names with path separators,
/// is reported as not found.

use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::SystemTime;
use tracing::info;

use super::error::{BackupError, BackupResult};
use crate::utils::{BACKUP_EXTENSION, REMOTE_SUFFIX, TIMESTAMP_FORMAT};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    /// Plain dump, or the external tool's output
    Local,
    /// Portable variant wrapped for loading on another server
    Remote,
}

impl ArtifactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Local => "local",
            ArtifactKind::Remote => "remote",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupArtifact {
    pub filename: String,
    pub size_bytes: u64,
    pub created_at: DateTime<Local>,
    pub modified_at: DateTime<Local>,
    pub kind: ArtifactKind,
}

/// Filename scheme for artifacts with a given prefix
#[derive(Debug, Clone)]
pub struct ArtifactNaming {
    prefix: String,
    pattern: Regex,
}

impl ArtifactNaming {
    pub fn new(prefix: &str) -> BackupResult<Self> {
        let pattern = format!(
            r"^{}_(\d{{4}}-\d{{2}}-\d{{2}}_\d{{2}}-\d{{2}}-\d{{2}})({})?\.{}$",
            regex::escape(prefix),
            regex::escape(REMOTE_SUFFIX),
            BACKUP_EXTENSION
        );
        let pattern = Regex::new(&pattern).map_err(|source| BackupError::InvalidPrefix {
            prefix: prefix.to_string(),
            source,
        })?;

        Ok(Self {
            prefix: prefix.to_string(),
            pattern,
        })
    }

    /// Local artifact name for a point in time
    pub fn filename_for(&self, at: DateTime<Local>) -> String {
        format!("{}_{}.{}", self.prefix, at.format(TIMESTAMP_FORMAT), BACKUP_EXTENSION)
    }

    /// `backup_2024-05-01_10-00-00.sql` -> `backup_2024-05-01_10-00-00-remote.sql`
    pub fn remote_sibling(&self, filename: &str) -> String {
        let ext = format!(".{}", BACKUP_EXTENSION);
        match filename.strip_suffix(&ext) {
            Some(stem) => format!("{}{}{}", stem, REMOTE_SUFFIX, ext),
            None => format!("{}{}", filename, REMOTE_SUFFIX),
        }
    }

    /// Timestamp and kind encoded in a valid artifact name
    pub fn parse(&self, filename: &str) -> Option<(NaiveDateTime, ArtifactKind)> {
        let caps = self.pattern.captures(filename)?;
        let timestamp = NaiveDateTime::parse_from_str(caps.get(1)?.as_str(), TIMESTAMP_FORMAT).ok()?;
        let kind = if caps.get(2).is_some() {
            ArtifactKind::Remote
        } else {
            ArtifactKind::Local
        };
        Some((timestamp, kind))
    }

    pub fn is_artifact(&self, filename: &str) -> bool {
        self.parse(filename).is_some()
    }
}

/// Artifact opened for download
#[derive(Debug)]
pub struct BackupDownload {
    pub artifact: BackupArtifact,
    pub file: tokio::fs::File,
}

#[derive(Debug, Clone)]
pub struct BackupRepository {
    dir: PathBuf,
    naming: ArtifactNaming,
}

impl BackupRepository {
    pub fn new(dir: impl Into<PathBuf>, prefix: &str) -> BackupResult<Self> {
        Ok(Self {
            dir: dir.into(),
            naming: ArtifactNaming::new(prefix)?,
        })
    }

    pub fn naming(&self) -> &ArtifactNaming {
        &self.naming
    }

    /// Path of an existing artifact
    pub fn resolve(&self, filename: &str) -> BackupResult<PathBuf> {
        if !self.naming.is_artifact(filename) {
            return Err(BackupError::not_found(filename));
        }

        let path = self.dir.join(filename);
        if path.is_file() {
            Ok(path)
        } else {
            Err(BackupError::not_found(filename))
        }
    }

    /// Metadata of one existing artifact
    pub fn artifact(&self, filename: &str) -> BackupResult<BackupArtifact> {
        let path = self.resolve(filename)?;
        let (timestamp, kind) = self
            .naming
            .parse(filename)
            .ok_or_else(|| BackupError::not_found(filename))?;

        let metadata = std::fs::metadata(&path).map_err(|e| BackupError::io(&path, e))?;
        let modified_at: DateTime<Local> = metadata
            .modified()
            .unwrap_or(SystemTime::UNIX_EPOCH)
            .into();
        let created_at = Local
            .from_local_datetime(&timestamp)
            .earliest()
            .unwrap_or(modified_at);

        Ok(BackupArtifact {
            filename: filename.to_string(),
            size_bytes: metadata.len(),
            created_at,
            modified_at,
            kind,
        })
    }

    /// All artifacts, most recent first. A missing directory is an empty list.
    pub fn list(&self) -> BackupResult<Vec<BackupArtifact>> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(BackupError::Directory {
                    path: self.dir.clone(),
                    source: e,
                })
            }
        };

        let mut artifacts: Vec<BackupArtifact> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
            .filter(|name| self.naming.is_artifact(name))
            .filter_map(|name| self.artifact(&name).ok())
            .collect();

        artifacts.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.filename.cmp(&a.filename))
        });

        Ok(artifacts)
    }

    /// Remove an artifact. Callers hold the directory lock.
    pub fn delete(&self, filename: &str) -> BackupResult<BackupArtifact> {
        let artifact = self.artifact(filename)?;
        let path = self.dir.join(filename);

        std::fs::remove_file(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => BackupError::not_found(filename),
            _ => BackupError::io(&path, e),
        })?;

        info!(filename, "Deleted backup");
        Ok(artifact)
    }

    /// Open an artifact for streaming
    pub async fn open(&self, filename: &str) -> BackupResult<BackupDownload> {
        let artifact = self.artifact(filename)?;
        let path = self.dir.join(filename);
        let file = tokio::fs::File::open(&path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => BackupError::not_found(filename),
            _ => BackupError::io(&path, e),
        })?;

        Ok(BackupDownload { artifact, file })
    }
}
