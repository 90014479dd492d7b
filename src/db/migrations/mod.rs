//! Schema migrations, tracked in `PRAGMA user_version`.

use super::Schema;
use crate::error::StampError;
use anyhow::Result;
use rusqlite::Connection;

#[derive(Debug, Clone, Copy)]
struct Migration {
    version: u32,
    sql: &'static str,
}

const QC_MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    sql: include_str!("qc_0001_init.sql"),
}];

const WATER_MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    sql: include_str!("water_0001_init.sql"),
}];

fn migrations(schema: Schema) -> &'static [Migration] {
    match schema {
        Schema::StampQc => QC_MIGRATIONS,
        Schema::WaterBarcode => WATER_MIGRATIONS,
    }
}

/// Latest migration version known for `schema`
pub fn latest_version(schema: Schema) -> u32 {
    migrations(schema).last().map_or(0, |m| m.version)
}

/// Apply all pending migrations in one transaction
pub fn apply_migrations(conn: &mut Connection, schema: Schema) -> Result<()> {
    let current = current_user_version(conn)?;
    let latest = latest_version(schema);

    if current > latest {
        return Err(StampError::UnsupportedSchemaVersion {
            db_version: current,
            latest_supported: latest,
        }
        .into());
    }
    if current == latest {
        return Ok(());
    }

    let tx = conn.transaction()?;
    for migration in migrations(schema) {
        if migration.version <= current {
            continue;
        }
        tx.execute_batch(migration.sql)?;
        tx.execute_batch(&format!("PRAGMA user_version = {};", migration.version))?;
    }
    tx.commit()?;
    tracing::debug!(?schema, from = current, to = latest, "applied migrations");
    Ok(())
}

pub fn current_user_version(conn: &Connection) -> Result<u32> {
    Ok(conn.query_row("PRAGMA user_version;", [], |row| row.get::<_, u32>(0))?)
}
