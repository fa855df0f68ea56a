pub mod config;
pub mod error;
pub mod sql_literal;
pub mod table_dump;
pub mod snapshot;
pub mod database;
pub mod tool_locator;
pub mod process;
pub mod lock;
pub mod repository;
pub mod backup;
pub mod restore;
pub mod scripts;

pub use backup::{ActionResult, BackupManager, DumpMethod, DumpReport, DumpResult};
pub use config::{BackupSettings, ConfigManager, DatabaseConfig};
pub use error::{BackupError, BackupResult};
pub use process::CancellationToken;
pub use repository::{ArtifactKind, BackupArtifact, BackupDownload};
pub use restore::RestoreReport;
pub use scripts::ScriptGateway;
