/// Defaults and fixed names used across store-admin

/// Prefix of artifact filenames, `<prefix>_<timestamp>.sql`
pub const DEFAULT_BACKUP_PREFIX: &str = "backup";

/// Backup directory, relative to the .env file
pub const DEFAULT_BACKUP_DIR: &str = "backups";

/// Suffix inserted before `.sql` for the portable variant
pub const REMOTE_SUFFIX: &str = "-remote";

pub const BACKUP_EXTENSION: &str = "sql";

/// chrono format of the timestamp embedded in artifact filenames
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// Lock file guarding create/delete/restore in the backup directory
pub const LOCK_FILE_NAME: &str = ".backup.lock";

/// Extension of in-flight writes, renamed away on success
pub const PARTIAL_EXTENSION: &str = "part";

pub const DEFAULT_DUMP_TOOL: &str = "mysqldump";
pub const DEFAULT_RESTORE_TOOL: &str = "mysql";

/// Vendor installation root scanned for versioned MySQL installs
pub const DEFAULT_VENDOR_ROOT: &str = "/usr/local";

/// Versioned installs look like `<root>/mysql-8.0.36/bin/mysqldump`
pub const DEFAULT_VERSION_PREFIX: &str = "mysql-";
pub const VENDOR_BIN_DIR: &str = "bin";

pub const DEFAULT_DB_PORT: u16 = 3306;

/// humantime strings
pub const DEFAULT_TOOL_TIMEOUT: &str = "10m";
pub const DEFAULT_LOCK_WAIT: &str = "30s";

/// Environment variable naming the .env file to use
pub const ENV_FILE_VAR: &str = "STORE_ADMIN_ENV";

/// Environment variable holding the admin API token
pub const WEB_TOKEN_VAR: &str = "STORE_ADMIN_WEB_TOKEN";

/// Upper bound on captured tool output kept in results
pub const MAX_CAPTURED_OUTPUT: usize = 64 * 1024;
