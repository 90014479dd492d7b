use super::migrations::apply_migrations;
use super::Schema;
use anyhow::{Context, Result};
use rusqlite::Connection;
use std::path::Path;
use std::time::{Duration, Instant};

/// Open (creating if needed) a database file and bring its schema up to date.
/// Returns the connection and whether the file was newly created.
pub fn open_db(path: impl AsRef<Path>, schema: Schema) -> Result<(Connection, bool)> {
    let path = path.as_ref();
    let started_at = Instant::now();
    let is_new = !path.exists();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("cannot create {}", parent.display()))?;
    }

    let mut conn = Connection::open(path).with_context(|| format!("cannot open {}", path.display()))?;
    if let Err(err) = bootstrap_connection(&mut conn, schema) {
        tracing::error!(
            db = %path.display(),
            duration_ms = started_at.elapsed().as_millis() as u64,
            error = %err,
            "database bootstrap failed"
        );
        return Err(err);
    }
    tracing::debug!(
        db = %path.display(),
        new = is_new,
        duration_ms = started_at.elapsed().as_millis() as u64,
        "database open"
    );
    Ok((conn, is_new))
}

/// Open an in-memory database with the schema applied
pub fn open_db_in_memory(schema: Schema) -> Result<Connection> {
    let mut conn = Connection::open_in_memory()?;
    bootstrap_connection(&mut conn, schema)?;
    Ok(conn)
}

fn bootstrap_connection(conn: &mut Connection, schema: Schema) -> Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_secs(5))?;
    apply_migrations(conn, schema)?;
    Ok(())
}
