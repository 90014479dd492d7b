//! STAMP Database Export Tool
//!
//! Prints one table of a QC or water barcode database to stdout.

use anyhow::{bail, Context, Result};
use clap::{Arg, ArgAction, Command};
use rusqlite::{Connection, OpenFlags};
use stamp_qc_tools::db::export_table;
use stamp_qc_tools::logging::init_cli_logger;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

fn main() -> Result<()> {
    let matches = Command::new("stamp-db-export")
        .version("0.1.0")
        .about("Download a table from a SQLite database and print it to stdout")
        .author("STAMP Bioinformatics")
        .arg(
            Arg::new("db")
                .value_name("DB")
                .help("SQLite database file")
                .required(true),
        )
        .arg(
            Arg::new("table")
                .value_name("TABLE")
                .help("Name of the table to download")
                .required(true),
        )
        .arg(
            Arg::new("delim")
                .short('d')
                .long("delim")
                .value_name("DELIM")
                .help("Field delimiter")
                .default_value("\t"),
        )
        .arg(
            Arg::new("debug")
                .long("debug")
                .help("Print extra messages")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    init_cli_logger(matches.get_flag("debug"));
    let db = PathBuf::from(matches.get_one::<String>("db").unwrap());
    let table = matches.get_one::<String>("table").unwrap();
    let delim = matches.get_one::<String>("delim").unwrap();

    if !db.exists() {
        bail!("Database does not exist: {}", db.display());
    }
    eprintln!("🔌 Connecting to db {}", db.display());
    let conn = Connection::open_with_flags(&db, OpenFlags::SQLITE_OPEN_READ_ONLY)
        .with_context(|| format!("cannot open {}", db.display()))?;

    let stdout = std::io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    let rows = export_table(&conn, table, delim, &mut out)?;
    out.flush()?;
    eprintln!("✅ {rows} rows from {table}");
    Ok(())
}
