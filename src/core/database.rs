/// MySQL side of the in-process dump
///
/// Queries are sent as plain text statements, so MySQL returns every value
/// in its text form and any column type can be read as bytes without a
/// per-type decoder. Binary column types are kept as raw bytes.

use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlRow};
use sqlx::{Column, ConnectOptions, Connection, Executor, Row as SqlRow, TypeInfo};
use tracing::{debug, info};

use super::config::DatabaseConfig;
use super::error::{BackupError, BackupResult};
use super::snapshot::{RecordCounts, SnapshotSource};
use super::sql_literal::{identifier, CellValue};
use super::table_dump::{Row, TableSnapshot};

pub struct MySqlSource {
    options: MySqlConnectOptions,
    database: String,
}

impl MySqlSource {
    pub fn new(config: &DatabaseConfig) -> Self {
        let mut options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.user)
            .database(&config.name)
            .disable_statement_logging();

        if let Some(password) = &config.password {
            options = options.password(password);
        }

        Self {
            options,
            database: config.name.clone(),
        }
    }

    async fn connect(&self) -> BackupResult<MySqlConnection> {
        self.options.connect().await.map_err(|e| {
            BackupError::Database(format!("Failed to connect to {}: {}", self.database, e))
        })
    }

    async fn table_names(&self, conn: &mut MySqlConnection) -> BackupResult<Vec<String>> {
        let rows = (&mut *conn)
            .fetch_all("SHOW FULL TABLES WHERE Table_type = 'BASE TABLE'")
            .await
            .map_err(|e| BackupError::Database(format!("Failed to list tables: {}", e)))?;

        rows.iter()
            .map(|row| {
                text_at(row, 0)
                    .ok()
                    .flatten()
                    .ok_or_else(|| BackupError::Database("Unreadable table name".to_string()))
            })
            .collect()
    }

    async fn read_table(&self, conn: &mut MySqlConnection, name: &str) -> BackupResult<TableSnapshot> {
        let serialization = |details: String| BackupError::Serialization {
            table: name.to_string(),
            details,
        };

        let create_sql = format!("SHOW CREATE TABLE {}", identifier(name));
        let create_row = (&mut *conn)
            .fetch_one(create_sql.as_str())
            .await
            .map_err(|e| serialization(e.to_string()))?;
        let create_statement = text_at(&create_row, 1)
            .map_err(|e| serialization(e.to_string()))?
            .ok_or_else(|| serialization("SHOW CREATE TABLE returned no DDL".to_string()))?;

        let select_sql = format!("SELECT * FROM {}", identifier(name));
        let rows = (&mut *conn)
            .fetch_all(select_sql.as_str())
            .await
            .map_err(|e| serialization(e.to_string()))?;

        let rows = rows
            .iter()
            .map(|row| {
                row.columns()
                    .iter()
                    .map(|column| {
                        let binary = is_binary_type(column.type_info().name());
                        let value = bytes_at(row, column.ordinal())?
                            .map(|bytes| CellValue::from_bytes(bytes, binary));
                        Ok((column.name().to_string(), value))
                    })
                    .collect::<Result<Row, sqlx::Error>>()
            })
            .collect::<Result<Vec<Row>, sqlx::Error>>()
            .map_err(|e| serialization(e.to_string()))?;

        debug!(table = name, rows = rows.len(), "Read table");
        Ok(TableSnapshot::new(name, create_statement).with_rows(rows))
    }
}

#[async_trait]
impl SnapshotSource for MySqlSource {
    async fn read_tables(&self) -> BackupResult<Vec<TableSnapshot>> {
        let mut conn = self.connect().await?;
        let names = self.table_names(&mut conn).await?;

        let mut tables = Vec::with_capacity(names.len());
        for name in &names {
            tables.push(self.read_table(&mut conn, name).await?);
        }

        let _ = conn.close().await;
        info!(database = %self.database, tables = tables.len(), "Read database for in-process dump");
        Ok(tables)
    }

    async fn count_records(&self) -> BackupResult<RecordCounts> {
        let mut conn = self.connect().await?;
        let names = self.table_names(&mut conn).await?;

        let mut records = 0u64;
        for name in &names {
            let sql = format!("SELECT COUNT(*) FROM {}", identifier(name));
            let row = (&mut conn)
                .fetch_one(sql.as_str())
                .await
                .map_err(|e| BackupError::Database(format!("Failed to count {}: {}", name, e)))?;
            records += parse_count(text_at(&row, 0)).map_err(|details| {
                BackupError::Database(format!("Failed to count {}: {}", name, details))
            })?;
        }

        let _ = conn.close().await;
        Ok(RecordCounts {
            tables: names.len(),
            records,
        })
    }
}

/// Column types whose values must not be treated as text
const BINARY_TYPES: &[&str] = &[
    "BINARY",
    "VARBINARY",
    "TINYBLOB",
    "BLOB",
    "MEDIUMBLOB",
    "LONGBLOB",
    "BIT",
    "GEOMETRY",
];

fn is_binary_type(name: &str) -> bool {
    BINARY_TYPES.contains(&name)
}

/// Raw bytes of a column, `None` for NULL
fn bytes_at(row: &MySqlRow, index: usize) -> Result<Option<Vec<u8>>, sqlx::Error> {
    row.try_get_unchecked(index)
}

/// Text form of a catalog column (table name, DDL, count)
fn text_at(row: &MySqlRow, index: usize) -> Result<Option<String>, sqlx::Error> {
    Ok(bytes_at(row, index)?.map(|b| String::from_utf8_lossy(&b).into_owned()))
}

fn parse_count(value: Result<Option<String>, sqlx::Error>) -> Result<u64, String> {
    match value {
        Ok(Some(count)) => count
            .trim()
            .parse::<u64>()
            .map_err(|_| format!("unexpected COUNT(*) value '{}'", count)),
        Ok(None) => Err("COUNT(*) returned NULL".to_string()),
        Err(e) => Err(e.to_string()),
    }
}
