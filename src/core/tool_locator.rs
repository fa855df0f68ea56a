/// Discovery of the MySQL command-line tools
///
/// The tools may be on the search path, in a versioned vendor install such as
/// `/usr/local/mysql-8.0.36/bin`, or missing entirely. The locator only
/// answers where to look; whether the binary actually runs is decided when
/// it is spawned.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::config::BackupSettings;
use crate::utils::VENDOR_BIN_DIR;

/// Result of a successful lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolPath {
    /// A file that exists on disk
    Found(PathBuf),
    /// Bare executable name handed to the OS unchecked
    Assumed(String),
}

impl ToolPath {
    pub fn program(&self) -> PathBuf {
        match self {
            ToolPath::Found(path) => path.clone(),
            ToolPath::Assumed(name) => PathBuf::from(name),
        }
    }
}

impl std::fmt::Display for ToolPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ToolPath::Found(path) => write!(f, "{}", path.display()),
            ToolPath::Assumed(name) => write!(f, "{} (from PATH)", name),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ToolLocator {
    search_path: Option<OsString>,
    vendor_root: Option<PathBuf>,
    version_prefix: String,
    assume_on_path: bool,
}

impl ToolLocator {
    /// Build a locator from settings, capturing the current `PATH` once
    pub fn from_settings(settings: &BackupSettings) -> Self {
        Self {
            search_path: std::env::var_os("PATH"),
            vendor_root: settings.vendor_root.clone(),
            version_prefix: settings.version_prefix.clone(),
            assume_on_path: settings.assume_on_path,
        }
    }

    /// Replace the captured search path
    pub fn with_search_path(mut self, search_path: Option<OsString>) -> Self {
        self.search_path = search_path;
        self
    }

    /// Candidate paths in lookup order: the bare name, then versioned
    /// vendor installs from newest to oldest
    pub fn candidates(&self, tool: &str) -> Vec<PathBuf> {
        let mut candidates = vec![PathBuf::from(tool)];
        let file_name = executable_name(tool);

        let Some(root) = &self.vendor_root else {
            return candidates;
        };

        let entries = match std::fs::read_dir(root) {
            Ok(entries) => entries,
            Err(e) => {
                debug!(root = %root.display(), error = %e, "Vendor root not readable");
                return candidates;
            }
        };

        let mut versioned: Vec<(Vec<u64>, String, PathBuf)> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .filter_map(|entry| {
                let name = entry.file_name().to_string_lossy().to_string();
                let version = name.strip_prefix(&self.version_prefix)?;
                let key = version_key(version);
                Some((key, name, entry.path().join(VENDOR_BIN_DIR).join(&file_name)))
            })
            .collect();

        // Newest version first
        versioned.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| b.1.cmp(&a.1)));
        candidates.extend(versioned.into_iter().map(|(_, _, path)| path));

        candidates
    }

    /// Find a tool. `None` only when nothing was found and bare names are
    /// not assumed to resolve.
    pub fn locate(&self, tool: &str) -> Option<ToolPath> {
        // Explicit path in configuration
        if tool.contains(std::path::MAIN_SEPARATOR) || tool.contains('/') {
            let path = PathBuf::from(tool);
            return is_executable(&path).then_some(ToolPath::Found(path));
        }

        if let Some(found) = self.resolve_on_search_path(tool) {
            debug!(tool, path = %found.display(), "Found tool on search path");
            return Some(ToolPath::Found(found));
        }

        for candidate in self.candidates(tool).into_iter().skip(1) {
            if is_executable(&candidate) {
                debug!(tool, path = %candidate.display(), "Found tool in vendor install");
                return Some(ToolPath::Found(candidate));
            }
        }

        if self.assume_on_path {
            debug!(tool, "No installed copy found, assuming it resolves at spawn time");
            return Some(ToolPath::Assumed(tool.to_string()));
        }

        None
    }

    fn resolve_on_search_path(&self, tool: &str) -> Option<PathBuf> {
        let search_path = self.search_path.as_ref()?;
        let file_name = executable_name(tool);

        std::env::split_paths(search_path)
            .filter(|dir| !dir.as_os_str().is_empty())
            .map(|dir| dir.join(&file_name))
            .find(|path| is_executable(path))
    }
}

fn executable_name(tool: &str) -> String {
    let suffix = std::env::consts::EXE_SUFFIX;
    if suffix.is_empty() || tool.ends_with(suffix) {
        tool.to_string()
    } else {
        format!("{}{}", tool, suffix)
    }
}

/// Numeric sort key for a version string such as `8.0.36` or `5.7.44-log`
fn version_key(version: &str) -> Vec<u64> {
    version
        .split(|c: char| c == '.' || c == '-' || c == '_')
        .map(|part| {
            let digits: String = part.chars().take_while(|c| c.is_ascii_digit()).collect();
            digits.parse().unwrap_or(0)
        })
        .collect()
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
