/// SQL literal rendering for generated dumps
///
/// Every non-null text value is emitted as a quoted string, numbers included.
/// MySQL coerces quoted numerics on insert, so the output stays loadable.
/// Binary values are emitted as hex literals so every byte survives.

use std::fmt::Write;

/// One column value as read from the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellValue {
    Text(String),
    /// Binary column content, or text that is not valid UTF-8
    Bytes(Vec<u8>),
}

impl CellValue {
    /// Classify raw column bytes. Binary columns always stay bytes.
    pub fn from_bytes(bytes: Vec<u8>, binary: bool) -> Self {
        if binary {
            return CellValue::Bytes(bytes);
        }
        match String::from_utf8(bytes) {
            Ok(text) => CellValue::Text(text),
            Err(e) => CellValue::Bytes(e.into_bytes()),
        }
    }
}

impl From<&str> for CellValue {
    fn from(text: &str) -> Self {
        CellValue::Text(text.to_string())
    }
}

/// Render an optional value as a SQL literal
pub fn literal(value: Option<&CellValue>) -> String {
    match value {
        None => "NULL".to_string(),
        Some(CellValue::Text(text)) => quote(text),
        Some(CellValue::Bytes(bytes)) => hex(bytes),
    }
}

/// `X'..'` hex literal; `X''` for an empty value
pub fn hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2 + 3);
    out.push_str("X'");
    for byte in bytes {
        let _ = write!(out, "{:02X}", byte);
    }
    out.push('\'');
    out
}

/// Quote and escape a text value the way `mysql_real_escape_string` does
pub fn quote(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('\'');
    for c in text.chars() {
        match c {
            '\0' => out.push_str("\\0"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '"' => out.push_str("\\\""),
            '\x1a' => out.push_str("\\Z"),
            other => out.push(other),
        }
    }
    out.push('\'');
    out
}

/// Quote an identifier (table or column name) with backticks
pub fn identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}
