/// store-admin: back-office tooling for the shop database
///
/// The `core` module holds the backup engine; the binary and the optional
/// HTTP admin API are thin surfaces over `core::BackupManager`.

pub mod core;
pub mod utils;

#[cfg(feature = "server")]
pub mod server;
