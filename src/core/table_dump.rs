/// Per-table DDL and DML generation for the in-process dump

use std::fmt::Write;

use super::sql_literal::{identifier, literal, CellValue};

/// One row: ordered column/value pairs, `None` meaning SQL NULL
pub type Row = Vec<(String, Option<CellValue>)>;

/// Schema and full contents of one table, read during a dump pass
#[derive(Debug, Clone, PartialEq)]
pub struct TableSnapshot {
    pub name: String,
    pub create_statement: String,
    pub rows: Vec<Row>,
}

impl TableSnapshot {
    pub fn new(name: impl Into<String>, create_statement: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            create_statement: create_statement.into(),
            rows: Vec::new(),
        }
    }

    pub fn with_rows(mut self, rows: Vec<Row>) -> Self {
        self.rows = rows;
        self
    }

    /// Column names, taken from the first row
    pub fn columns(&self) -> Vec<&str> {
        self.rows
            .first()
            .map(|row| row.iter().map(|(column, _)| column.as_str()).collect())
            .unwrap_or_default()
    }
}

/// Write the comment banner, `DROP TABLE IF EXISTS` and the DDL
pub fn write_structure(out: &mut String, table: &TableSnapshot) {
    let name = identifier(&table.name);
    let ddl = table.create_statement.trim().trim_end_matches(';').trim_end();

    let _ = writeln!(out, "--");
    let _ = writeln!(out, "-- Table structure for table {}", name);
    let _ = writeln!(out, "--");
    out.push('\n');
    let _ = writeln!(out, "DROP TABLE IF EXISTS {};", name);
    let _ = writeln!(out, "{};", ddl);
    out.push('\n');
}

/// Write one INSERT per row, preserving row order. Returns the row count.
pub fn write_rows(out: &mut String, table: &TableSnapshot) -> usize {
    if table.rows.is_empty() {
        return 0;
    }

    let name = identifier(&table.name);
    let columns = table
        .columns()
        .into_iter()
        .map(identifier)
        .collect::<Vec<_>>()
        .join(", ");

    for row in &table.rows {
        let values = row
            .iter()
            .map(|(_, value)| literal(value.as_ref()))
            .collect::<Vec<_>>()
            .join(", ");
        let _ = writeln!(out, "INSERT INTO {} ({}) VALUES ({});", name, columns, values);
    }
    out.push('\n');

    table.rows.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dump_table(table: &TableSnapshot) -> String {
        let mut out = String::new();
        write_structure(&mut out, table);
        write_rows(&mut out, table);
        out
    }

    fn row(values: &[(&str, Option<&str>)]) -> Row {
        values
            .iter()
            .map(|(c, v)| (c.to_string(), v.map(CellValue::from)))
            .collect()
    }

    fn products() -> TableSnapshot {
        TableSnapshot::new(
            "products",
            "CREATE TABLE `products` (\n  `id` int NOT NULL,\n  `name` varchar(64) DEFAULT NULL\n)",
        )
        .with_rows(vec![
            row(&[("id", Some("1")), ("name", Some("Tea"))]),
            row(&[("id", Some("2")), ("name", None)]),
            row(&[("id", Some("3")), ("name", Some("Bob's mug"))]),
        ])
    }

    #[test]
    fn test_empty_table_is_ddl_only() {
        let table = TableSnapshot::new("settings", "CREATE TABLE `settings` (`k` varchar(32))");
        let dump = dump_table(&table);

        assert!(dump.contains("DROP TABLE IF EXISTS `settings`;"));
        assert!(dump.contains("CREATE TABLE `settings` (`k` varchar(32));"));
        assert!(!dump.contains("INSERT"));
    }

    #[test]
    fn test_one_insert_per_row_in_order() {
        let dump = dump_table(&products());
        let inserts: Vec<&str> = dump.lines().filter(|l| l.starts_with("INSERT")).collect();

        assert_eq!(inserts.len(), 3);
        assert_eq!(
            inserts[0],
            "INSERT INTO `products` (`id`, `name`) VALUES ('1', 'Tea');"
        );
        assert_eq!(
            inserts[1],
            "INSERT INTO `products` (`id`, `name`) VALUES ('2', NULL);"
        );
        assert_eq!(
            inserts[2],
            r"INSERT INTO `products` (`id`, `name`) VALUES ('3', 'Bob\'s mug');"
        );
    }

    #[test]
    fn test_binary_column_is_hex() {
        let table = TableSnapshot::new(
            "images",
            "CREATE TABLE `images` (`id` int, `data` blob)",
        )
        .with_rows(vec![vec![
            ("id".to_string(), Some(CellValue::from("7"))),
            ("data".to_string(), Some(CellValue::Bytes(vec![0x89, b'P', 0xff, 0x00]))),
        ]]);

        let dump = dump_table(&table);
        assert!(dump.contains("INSERT INTO `images` (`id`, `data`) VALUES ('7', X'8950FF00');"));
    }

    #[test]
    fn test_trailing_semicolon_not_doubled() {
        let table = TableSnapshot::new("t", "CREATE TABLE `t` (`a` int);\n");
        let dump = dump_table(&table);
        assert!(dump.contains("CREATE TABLE `t` (`a` int);\n"));
        assert!(!dump.contains(";;"));
    }

    #[test]
    fn test_structure_precedes_data() {
        let dump = dump_table(&products());
        let drop_at = dump.find("DROP TABLE").unwrap();
        let create_at = dump.find("CREATE TABLE").unwrap();
        let insert_at = dump.find("INSERT").unwrap();
        assert!(drop_at < create_at && create_at < insert_at);
    }
}
