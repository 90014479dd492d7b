//! STAMP Water Barcode Tool
//!
//! Reads per-run barcode count files, reports the share of reads on the
//! water control barcode, and keeps the counts in a database and summary
//! spreadsheet.

use anyhow::Result;
use clap::{Arg, ArgAction, Command};
use stamp_qc_tools::config::ToolConfig;
use stamp_qc_tools::logging::init_cli_logger;
use stamp_qc_tools::water::{analyze, parse_barcode_file, run_name_from_path, write_water_spreadsheet, WaterStore};
use std::collections::BTreeMap;
use std::path::PathBuf;

fn main() -> Result<()> {
    let matches = Command::new("stamp-water-barcode")
        .version("0.1.0")
        .about("Save barcode counts for the STAMP water control barcode")
        .author("STAMP Bioinformatics")
        .arg(
            Arg::new("bc_files")
                .value_name("BC_FILE")
                .help("Barcode count file(s); without any, print the database summary")
                .num_args(0..),
        )
        .arg(
            Arg::new("save")
                .short('s')
                .long("save")
                .help("Save counts to the database")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("excel")
                .short('x')
                .long("excel")
                .help("Write the Excel spreadsheet summarizing all runs")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("status")
                .long("status")
                .value_name("STATUS")
                .help("Status to use for all runs")
                .default_value("PASS"),
        )
        .arg(
            Arg::new("db")
                .long("db")
                .value_name("SQLITE")
                .help("SQLite database file"),
        )
        .arg(
            Arg::new("spreadsheet")
                .long("spreadsheet")
                .value_name("XLSX")
                .help("Excel spreadsheet path"),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("TOML")
                .help("Configuration file"),
        )
        .arg(
            Arg::new("debug")
                .short('d')
                .long("debug")
                .help("Print extra messages")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    init_cli_logger(matches.get_flag("debug"));
    let config = ToolConfig::load(matches.get_one::<String>("config").map(PathBuf::from).as_deref())?;
    let db = matches.get_one::<String>("db").map(PathBuf::from).unwrap_or_else(|| config.water_db());
    let spreadsheet = matches
        .get_one::<String>("spreadsheet")
        .map(PathBuf::from)
        .unwrap_or_else(|| config.water_spreadsheet());
    let status = matches.get_one::<String>("status").unwrap();
    let water_barcodes: Vec<String> = config.water.barcodes.keys().cloned().collect();

    println!("🧬 STAMP Water Barcode");
    let mut store = WaterStore::open(&db)?;
    println!("Database: {}", db.display());
    for line in store.summary_lines(&water_barcodes)? {
        println!("{line}");
    }

    let mut files: Vec<String> = matches
        .get_many::<String>("bc_files")
        .unwrap_or_default()
        .cloned()
        .collect();
    files.sort_by_key(|f| f.to_uppercase());

    let mut runs = BTreeMap::new();
    for (i, file) in files.iter().enumerate() {
        let counts = match parse_barcode_file(file) {
            Ok(counts) if !counts.is_empty() => counts,
            Ok(_) => {
                println!("⚠️  Bad file: {file}. Skipping");
                continue;
            }
            Err(e) => {
                println!("⚠️  Bad file: {file}. Skipping ({e:#})");
                continue;
            }
        };
        let run_name = run_name_from_path(file, i + 1);
        let run = analyze(&run_name, status, &counts, &water_barcodes);
        for barcode in &water_barcodes {
            let percent = run.percent(barcode);
            println!(
                "{} {run_name}: {} of {} reads ({percent:.4}%) on {barcode}{}",
                if percent > 1.0 { "❗" } else { "📊" },
                run.count(barcode),
                run.total_reads,
                if percent > 1.0 { " !!!" } else { "" }
            );
        }
        runs.insert(run_name, run);
    }

    if matches.get_flag("save") && !runs.is_empty() {
        let current: Vec<_> = runs.values().cloned().collect();
        let saved = store.save_runs(&current, status)?;
        println!("💾 Saved {saved} runs to {}", db.display());
    }

    if matches.get_flag("excel") {
        let mut all_runs = store.run_data(None)?;
        all_runs.extend(runs);
        let written = write_water_spreadsheet(&all_runs, &water_barcodes, config.water.limit, &spreadsheet)?;
        println!("📊 Spreadsheet: {written} runs -> {}", spreadsheet.display());
    }
    println!("✅ Done.");
    Ok(())
}
