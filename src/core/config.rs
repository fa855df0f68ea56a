/// Configuration management for .env files
///
/// Handles reading, writing, and validating the store-admin configuration,
/// and builds the typed views the backup engine is constructed from.

use anyhow::{anyhow, Context, Result};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::utils::{
    DEFAULT_BACKUP_DIR, DEFAULT_BACKUP_PREFIX, DEFAULT_DB_PORT,
    DEFAULT_DUMP_TOOL, DEFAULT_LOCK_WAIT, DEFAULT_RESTORE_TOOL, DEFAULT_TOOL_TIMEOUT,
    DEFAULT_VENDOR_ROOT, DEFAULT_VERSION_PREFIX, WEB_TOKEN_VAR,
};

pub struct ConfigManager {
    env_file: PathBuf,
    config: HashMap<String, String>,
}

impl ConfigManager {
    /// Load configuration from .env file
    pub fn load<P: AsRef<Path>>(env_file: P) -> Result<Self> {
        let env_file = env_file.as_ref().to_path_buf();

        if !env_file.exists() {
            return Err(anyhow!(".env file not found at {}", env_file.display()));
        }

        let content = fs::read_to_string(&env_file)
            .context("Failed to read .env file")?;

        let mut config = HashMap::new();

        for line in content.lines() {
            let line = line.trim();

            // Comments and blank lines are kept by `save`, which rewrites in place
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            // Parse key=value
            if let Some((key, value)) = line.split_once('=') {
                let key = key.trim().to_string();
                let value = unquote(value.trim()).to_string();
                config.insert(key, value);
            }
        }

        Ok(Self { env_file, config })
    }

    /// Save configuration to .env file
    pub fn save(&self) -> Result<()> {
        let mut lines = Vec::new();
        let mut written = Vec::new();

        // Preserve order by reading original file
        let original = fs::read_to_string(&self.env_file)?;
        for line in original.lines() {
            let line_trimmed = line.trim();

            if line_trimmed.starts_with('#') || line_trimmed.is_empty() {
                lines.push(line.to_string());
            } else if let Some((key, _)) = line_trimmed.split_once('=') {
                let key = key.trim();
                if let Some(value) = self.config.get(key) {
                    lines.push(format!("{}={}", key, value));
                    written.push(key.to_string());
                } else {
                    lines.push(line.to_string());
                }
            }
        }

        // Keys added since load go at the end
        for key in self.keys() {
            if !written.contains(&key) {
                if let Some(value) = self.config.get(&key) {
                    lines.push(format!("{}={}", key, value));
                }
            }
        }

        let mut content = lines.join("\n");
        content.push('\n');
        fs::write(&self.env_file, content)
            .context("Failed to write .env file")?;

        Ok(())
    }

    /// Path of the backing .env file
    pub fn env_file(&self) -> &Path {
        &self.env_file
    }

    /// Get a configuration value
    pub fn get(&self, key: &str) -> Option<&str> {
        self.config
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// Set a configuration value
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.config.insert(key.into(), value.into());
    }

    /// Database connection parameters
    pub fn database_config(&self) -> Result<DatabaseConfig> {
        let port = match self.get("DB_PORT") {
            Some(port) => port
                .parse::<u16>()
                .with_context(|| format!("DB_PORT is not a valid port: {}", port))?,
            None => DEFAULT_DB_PORT,
        };

        Ok(DatabaseConfig {
            host: self.get("DB_HOST").unwrap_or("localhost").to_string(),
            port,
            user: self
                .get("DB_USER")
                .ok_or_else(|| anyhow!("DB_USER is not set"))?
                .to_string(),
            password: self.get("DB_PASSWORD").map(|s| s.to_string()),
            name: self
                .get("DB_NAME")
                .ok_or_else(|| anyhow!("DB_NAME is not set"))?
                .to_string(),
        })
    }

    /// Backup engine settings
    ///
    /// A relative BACKUP_DIR is resolved against the directory of the .env file.
    pub fn backup_settings(&self) -> Result<BackupSettings> {
        let base = self
            .env_file
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();

        let backup_dir = PathBuf::from(self.get("BACKUP_DIR").unwrap_or(DEFAULT_BACKUP_DIR));
        let backup_dir = if backup_dir.is_relative() {
            base.join(backup_dir)
        } else {
            backup_dir
        };

        let vendor_root = match self.get("MYSQL_VENDOR_ROOT") {
            Some("none") => None,
            Some(root) => Some(PathBuf::from(root)),
            None => Some(PathBuf::from(DEFAULT_VENDOR_ROOT)),
        };

        Ok(BackupSettings {
            backup_dir,
            prefix: self.get("BACKUP_PREFIX").unwrap_or(DEFAULT_BACKUP_PREFIX).to_string(),
            vendor_root,
            version_prefix: self
                .get("MYSQL_VERSION_PREFIX")
                .unwrap_or(DEFAULT_VERSION_PREFIX)
                .to_string(),
            dump_tool: self.get("MYSQLDUMP_BIN").unwrap_or(DEFAULT_DUMP_TOOL).to_string(),
            restore_tool: self.get("MYSQL_BIN").unwrap_or(DEFAULT_RESTORE_TOOL).to_string(),
            assume_on_path: self
                .get("MYSQL_ASSUME_ON_PATH")
                .map(parse_bool)
                .transpose()?
                .unwrap_or(true),
            tool_timeout: self.duration("BACKUP_TOOL_TIMEOUT", DEFAULT_TOOL_TIMEOUT)?,
            lock_wait: self.duration("BACKUP_LOCK_WAIT", DEFAULT_LOCK_WAIT)?,
        })
    }

    /// Allow-listed maintenance scripts, `MAINTENANCE_SCRIPTS=name=path,name=path`
    pub fn maintenance_scripts(&self) -> Result<BTreeMap<String, PathBuf>> {
        let mut scripts = BTreeMap::new();

        if let Some(list) = self.get("MAINTENANCE_SCRIPTS") {
            for entry in list.split(',').map(str::trim).filter(|e| !e.is_empty()) {
                let (name, path) = entry
                    .split_once('=')
                    .ok_or_else(|| anyhow!("Malformed MAINTENANCE_SCRIPTS entry: {}", entry))?;
                scripts.insert(name.trim().to_string(), PathBuf::from(path.trim()));
            }
        }

        Ok(scripts)
    }

    /// Token required by the admin API, if configured
    pub fn web_token(&self) -> Option<String> {
        self.get(WEB_TOKEN_VAR)
            .map(|s| s.to_string())
            .or_else(|| std::env::var(WEB_TOKEN_VAR).ok().filter(|t| !t.is_empty()))
    }

    fn duration(&self, key: &str, default: &str) -> Result<Duration> {
        let raw = self.get(key).unwrap_or(default);
        humantime::parse_duration(raw).with_context(|| format!("{} is not a valid duration: {}", key, raw))
    }

    /// Validate configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        // Check required fields
        for key in ["DB_USER", "DB_NAME"] {
            if self.get(key).is_none() {
                errors.push(format!("{} is not set", key));
            }
        }

        if let Err(e) = self.database_config() {
            if self.get("DB_USER").is_some() && self.get("DB_NAME").is_some() {
                errors.push(e.to_string());
            }
        }

        if let Err(e) = self.backup_settings() {
            errors.push(e.to_string());
        }

        if let Some(prefix) = self.get("BACKUP_PREFIX") {
            if !prefix.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
                errors.push(format!("BACKUP_PREFIX may only contain letters, digits, '-' and '_': {}", prefix));
            }
        }

        match self.maintenance_scripts() {
            Ok(scripts) => {
                for (name, path) in scripts {
                    if !path.is_file() {
                        errors.push(format!("Maintenance script '{}' not found at {}", name, path.display()));
                    }
                }
            }
            Err(e) => errors.push(e.to_string()),
        }

        errors
    }

    /// Get all configuration keys
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.config.keys().cloned().collect();
        keys.sort();
        keys
    }
}

fn unquote(value: &str) -> &str {
    let bytes = value.as_bytes();
    if bytes.len() >= 2
        && ((bytes[0] == b'"' && bytes[bytes.len() - 1] == b'"')
            || (bytes[0] == b'\'' && bytes[bytes.len() - 1] == b'\''))
    {
        &value[1..value.len() - 1]
    } else {
        value
    }
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(anyhow!("Expected a boolean, got '{}'", other)),
    }
}

/// Whether a configuration key holds a secret that should be masked on display
pub fn is_sensitive_key(key: &str) -> bool {
    key.contains("PASSWORD") || key.contains("SECRET") || key.contains("TOKEN") || key.contains("KEY")
}

/// Connection parameters passed to the dump and restore tools
#[derive(Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: Option<String>,
    pub name: String,
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "****"))
            .field("name", &self.name)
            .finish()
    }
}

/// Where artifacts live and how the external tools are found and bounded
#[derive(Debug, Clone)]
pub struct BackupSettings {
    pub backup_dir: PathBuf,
    pub prefix: String,
    pub vendor_root: Option<PathBuf>,
    pub version_prefix: String,
    pub dump_tool: String,
    pub restore_tool: String,
    pub assume_on_path: bool,
    pub tool_timeout: Duration,
    pub lock_wait: Duration,
}

impl BackupSettings {
    /// Defaults for a given backup directory
    pub fn new(backup_dir: impl Into<PathBuf>) -> Self {
        Self {
            backup_dir: backup_dir.into(),
            prefix: DEFAULT_BACKUP_PREFIX.to_string(),
            vendor_root: Some(PathBuf::from(DEFAULT_VENDOR_ROOT)),
            version_prefix: DEFAULT_VERSION_PREFIX.to_string(),
            dump_tool: DEFAULT_DUMP_TOOL.to_string(),
            restore_tool: DEFAULT_RESTORE_TOOL.to_string(),
            assume_on_path: true,
            tool_timeout: humantime::parse_duration(DEFAULT_TOOL_TIMEOUT)
                .unwrap_or(Duration::from_secs(600)),
            lock_wait: humantime::parse_duration(DEFAULT_LOCK_WAIT)
                .unwrap_or(Duration::from_secs(30)),
        }
    }
}
