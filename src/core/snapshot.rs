/// Whole-database snapshot rendering
///
/// The composer never talks to the database itself. A `SnapshotSource`
/// enumerates the tables once, and the resulting slice is rendered in either
/// mode, so the plain and portable artifacts of one dump always carry the
/// same logical content.

use async_trait::async_trait;
use chrono::{DateTime, Local};
use std::fmt::Write;

use super::error::BackupResult;
use super::sql_literal::identifier;
use super::table_dump::{write_rows, write_structure, TableSnapshot};

/// Table and row totals for a dump
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordCounts {
    pub tables: usize,
    pub records: u64,
}

impl RecordCounts {
    pub fn of(tables: &[TableSnapshot]) -> Self {
        Self {
            tables: tables.len(),
            records: tables.iter().map(|t| t.rows.len() as u64).sum(),
        }
    }
}

/// Read side of the in-process dump
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Every base table with its DDL and rows, in database enumeration order
    async fn read_tables(&self) -> BackupResult<Vec<TableSnapshot>>;

    /// Row totals of the live database, used after an external dump
    async fn count_records(&self) -> BackupResult<RecordCounts>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DumpMode {
    Plain,
    Portable,
}

impl DumpMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DumpMode::Plain => "plain",
            DumpMode::Portable => "portable",
        }
    }
}

/// Session directives that make a portable dump load on a server with
/// different defaults
const PORTABLE_PREAMBLE: &[&str] = &[
    "SET FOREIGN_KEY_CHECKS=0;",
    "SET SQL_MODE = \"NO_AUTO_VALUE_ON_ZERO\";",
    "SET AUTOCOMMIT = 0;",
    "START TRANSACTION;",
];

const PORTABLE_EPILOGUE: &[&str] = &["COMMIT;", "SET FOREIGN_KEY_CHECKS=1;"];

/// Render an enumerated table set as one SQL document
pub fn compose(
    tables: &[TableSnapshot],
    mode: DumpMode,
    database: &str,
    generated_at: DateTime<Local>,
) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "-- store-admin SQL dump");
    let _ = writeln!(out, "-- Database: {}", identifier(database));
    let _ = writeln!(out, "-- Generated: {}", generated_at.format("%Y-%m-%d %H:%M:%S"));
    let _ = writeln!(out, "-- Mode: {}", mode.as_str());
    out.push('\n');

    match mode {
        DumpMode::Plain => {
            for table in tables {
                write_structure(&mut out, table);
                write_rows(&mut out, table);
            }
        }
        DumpMode::Portable => {
            for line in PORTABLE_PREAMBLE {
                let _ = writeln!(out, "{}", line);
            }
            out.push('\n');

            for table in tables {
                write_structure(&mut out, table);
                let _ = writeln!(out, "LOCK TABLES {} WRITE;", identifier(&table.name));
                write_rows(&mut out, table);
                let _ = writeln!(out, "UNLOCK TABLES;");
                out.push('\n');
            }

            for line in PORTABLE_EPILOGUE {
                let _ = writeln!(out, "{}", line);
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::sql_literal::CellValue;
    use crate::core::table_dump::Row;

    fn row(id: &str, name: &str) -> Row {
        vec![
            ("id".to_string(), Some(CellValue::from(id))),
            ("name".to_string(), Some(CellValue::from(name))),
        ]
    }

    fn shop_tables() -> Vec<TableSnapshot> {
        vec![
            TableSnapshot::new("products", "CREATE TABLE `products` (`id` int, `name` text)")
                .with_rows(vec![row("1", "Tea"), row("2", "Coffee"), row("3", "Cocoa")]),
            TableSnapshot::new("settings", "CREATE TABLE `settings` (`k` text, `v` text)"),
        ]
    }

    fn count(haystack: &str, needle: &str) -> usize {
        haystack.lines().filter(|l| l.starts_with(needle)).count()
    }

    #[test]
    fn test_empty_database_both_modes() {
        let now = Local::now();
        let plain = compose(&[], DumpMode::Plain, "shop", now);
        let portable = compose(&[], DumpMode::Portable, "shop", now);

        assert!(plain.starts_with("-- store-admin SQL dump"));
        assert!(!plain.contains("CREATE TABLE"));
        assert!(portable.contains("START TRANSACTION;"));
        assert!(portable.contains("COMMIT;"));
    }

    #[test]
    fn test_plain_shop_scenario() {
        let plain = compose(&shop_tables(), DumpMode::Plain, "shop", Local::now());

        assert_eq!(count(&plain, "CREATE TABLE"), 2);
        assert_eq!(count(&plain, "DROP TABLE IF EXISTS"), 2);
        assert_eq!(count(&plain, "INSERT INTO"), 3);
        assert!(!plain.contains("FOREIGN_KEY_CHECKS"));
        assert!(!plain.contains("LOCK TABLES"));
    }

    #[test]
    fn test_portable_shop_scenario() {
        let portable = compose(&shop_tables(), DumpMode::Portable, "shop", Local::now());

        assert_eq!(count(&portable, "INSERT INTO"), 3);
        assert!(portable.contains("SET FOREIGN_KEY_CHECKS=0;"));
        assert!(portable.contains("SET SQL_MODE = \"NO_AUTO_VALUE_ON_ZERO\";"));
        assert!(portable.contains("SET AUTOCOMMIT = 0;"));
        assert!(portable.contains("START TRANSACTION;"));
        assert_eq!(count(&portable, "LOCK TABLES"), 2);
        assert_eq!(count(&portable, "UNLOCK TABLES;"), 2);

        let commit_at = portable.find("COMMIT;").unwrap();
        let fk_on_at = portable.find("SET FOREIGN_KEY_CHECKS=1;").unwrap();
        let last_insert = portable.rfind("INSERT INTO").unwrap();
        assert!(last_insert < commit_at && commit_at < fk_on_at);
    }

    #[test]
    fn test_modes_share_content() {
        let tables = shop_tables();
        let now = Local::now();
        let plain = compose(&tables, DumpMode::Plain, "shop", now);
        let portable = compose(&tables, DumpMode::Portable, "shop", now);

        let statements = |doc: &str| -> Vec<String> {
            doc.lines()
                .filter(|l| l.starts_with("INSERT") || l.starts_with("CREATE") || l.starts_with("DROP"))
                .map(str::to_string)
                .collect()
        };
        assert_eq!(statements(&plain), statements(&portable));
    }

    #[test]
    fn test_table_order_is_enumeration_order() {
        let plain = compose(&shop_tables(), DumpMode::Plain, "shop", Local::now());
        assert!(plain.find("`products`").unwrap() < plain.find("`settings`").unwrap());
    }

    #[test]
    fn test_record_counts() {
        let counts = RecordCounts::of(&shop_tables());
        assert_eq!(counts, RecordCounts { tables: 2, records: 3 });
    }
}
