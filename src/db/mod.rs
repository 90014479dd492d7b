//! SQLite storage for the QC and water-barcode trackers
//!
//! Both tools keep a small database next to their spreadsheets. Connections
//! are opened with foreign keys enabled and migrations applied before any
//! data is read or written.

pub mod migrations;
mod open;

pub use open::{open_db, open_db_in_memory};

use anyhow::{bail, Result};
use rusqlite::types::ValueRef;
use rusqlite::Connection;
use std::io::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schema {
    StampQc,
    WaterBarcode,
}

/// Timestamp stored in `last_modified` columns
pub fn now_timestamp() -> String {
    chrono::Local::now()
        .format("%Y-%m-%d %H:%M:%S%.6f")
        .to_string()
}

/// Text form of a column value. NULL becomes an empty string.
pub fn value_text(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => String::new(),
        ValueRef::Integer(v) => v.to_string(),
        ValueRef::Real(v) => crate::format_decimal(v),
        ValueRef::Text(t) => String::from_utf8_lossy(t).into_owned(),
        ValueRef::Blob(b) => format!("<{} bytes>", b.len()),
    }
}

/// Names of the user tables in the database
pub fn table_names(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
    )?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(names)
}

/// Write every row of `table` with a header line. NULL is written as an
/// empty field. Returns the number of rows.
pub fn export_table<W: Write>(conn: &Connection, table: &str, delim: &str, out: &mut W) -> Result<usize> {
    if !table_names(conn)?.iter().any(|t| t == table) {
        bail!("no table named '{table}'");
    }
    let mut stmt = conn.prepare(&format!("SELECT * FROM \"{table}\""))?;
    let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
    writeln!(out, "{}", columns.join(delim))?;

    let mut rows = stmt.query([])?;
    let mut n = 0;
    while let Some(row) = rows.next()? {
        let mut fields = Vec::with_capacity(columns.len());
        for i in 0..columns.len() {
            fields.push(value_text(row.get_ref(i)?));
        }
        writeln!(out, "{}", fields.join(delim))?;
        n += 1;
    }
    Ok(n)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_create_tables() {
        let conn = open_db_in_memory(Schema::StampQc).unwrap();
        assert_eq!(table_names(&conn).unwrap(), vec!["mutation", "run", "vaf"]);
        assert_eq!(
            migrations::current_user_version(&conn).unwrap(),
            migrations::latest_version(Schema::StampQc)
        );

        let conn = open_db_in_memory(Schema::WaterBarcode).unwrap();
        assert_eq!(
            table_names(&conn).unwrap(),
            vec!["barcode", "barcode_counts", "run"]
        );
    }

    #[test]
    fn test_newer_schema_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("qc.db");
        {
            let (conn, is_new) = open_db(&path, Schema::StampQc).unwrap();
            assert!(is_new);
            conn.execute_batch("PRAGMA user_version = 99;").unwrap();
        }
        let err = open_db(&path, Schema::StampQc).unwrap_err();
        assert!(err.to_string().contains("newer than supported"));
    }

    #[test]
    fn test_export_table() {
        let conn = open_db_in_memory(Schema::WaterBarcode).unwrap();
        conn.execute(
            "INSERT INTO barcode (barcode) VALUES (?1), (?2)",
            ["NNNNGTCA", "NNNNACGT"],
        )
        .unwrap();
        let mut out = Vec::new();
        let n = export_table(&conn, "barcode", "\t", &mut out).unwrap();
        assert_eq!(n, 2);
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "id\tbarcode\n1\tNNNNGTCA\n2\tNNNNACGT\n"
        );

        let mut out = Vec::new();
        assert!(export_table(&conn, "nope", "\t", &mut out).is_err());
    }
}
