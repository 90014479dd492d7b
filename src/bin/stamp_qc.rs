//! STAMP TruQ3 QC Tool
//!
//! Checks TruQ3 control variant reports for the expected variants, stores
//! each run's VAFs in the QC database, and optionally writes annotated
//! reports and the cross-run summary spreadsheet.

use anyhow::{bail, Result};
use clap::{Arg, ArgAction, Command};
use stamp_qc_tools::config::ToolConfig;
use stamp_qc_tools::logging::init_cli_logger;
use stamp_qc_tools::stampqc::{check_report, write_summary_spreadsheet, CheckOptions, QcStore, VariantTally};
use stamp_qc_tools::stampqc::{STATUS_FAIL, STATUS_PASS};
use stamp_qc_tools::StatsRecord;
use std::path::PathBuf;

fn main() -> Result<()> {
    let matches = Command::new("stamp-qc")
        .version("0.1.0")
        .about("Check STAMP TruQ3 variant reports for expected variants")
        .author("STAMP Bioinformatics")
        .arg(
            Arg::new("variant_files")
                .value_name("VARIANT_REPORT")
                .help("STAMP TruQ3 variant report(s); without any, print the database summary")
                .num_args(0..),
        )
        .arg(
            Arg::new("outdir")
                .short('o')
                .long("outdir")
                .value_name("DIR")
                .help("Directory to save checked reports"),
        )
        .arg(
            Arg::new("text")
                .short('t')
                .long("text")
                .help("Write checked variant reports")
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
            Arg::new("force")
                .short('f')
                .long("force")
                .help("Overwrite existing runs in the database")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("status")
                .long("status")
                .value_name("STATUS")
                .help("Store runs with this status instead of the one derived from their call counts")
                .value_parser([STATUS_PASS, STATUS_FAIL]),
        )
        .arg(
            Arg::new("db")
                .long("db")
                .value_name("SQLITE")
                .help("SQLite database file"),
        )
        .arg(
            Arg::new("ref")
                .long("ref")
                .value_name("TRUTHS")
                .help("Expected truths file"),
        )
        .arg(
            Arg::new("spreadsheet")
                .long("spreadsheet")
                .value_name("XLSX")
                .help("Excel spreadsheet path"),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .value_name("JSON")
                .help("Write per-report results to a JSON file"),
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
                .help("Print extra messages, including per-variant counts")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    let debug = matches.get_flag("debug");
    init_cli_logger(debug);
    let config = ToolConfig::load(matches.get_one::<String>("config").map(PathBuf::from).as_deref())?;
    let db = matches.get_one::<String>("db").map(PathBuf::from).unwrap_or_else(|| config.qc_db());
    let truth_file = matches
        .get_one::<String>("ref")
        .map(PathBuf::from)
        .unwrap_or_else(|| config.qc_truth_file());
    let spreadsheet = matches
        .get_one::<String>("spreadsheet")
        .map(PathBuf::from)
        .unwrap_or_else(|| config.qc_spreadsheet());
    let outdir = matches.get_one::<String>("outdir").map(PathBuf::from);
    if let Some(dir) = &outdir {
        std::fs::create_dir_all(dir)?;
    }

    println!("🧬 STAMP TruQ3 QC");
    println!("Database: {}", db.display());
    if !db.exists() && !truth_file.exists() {
        bail!("Truth file does not exist: {}", truth_file.display());
    }
    let mut store = QcStore::open(&db, &truth_file)?;
    if store.truths_loaded() > 0 {
        println!("📥 Loaded {} expected mutations from {}", store.truths_loaded(), truth_file.display());
    }

    let reports: Vec<PathBuf> = matches
        .get_many::<String>("variant_files")
        .unwrap_or_default()
        .filter(|f| f.as_str() != "none")
        .map(PathBuf::from)
        .collect();

    if reports.is_empty() {
        for line in store.summary()?.lines() {
            println!("   {line}");
        }
    }

    let options = CheckOptions {
        outdir: outdir.as_deref(),
        write_text: matches.get_flag("text"),
        force: matches.get_flag("force"),
        status: matches.get_one::<String>("status").map(String::as_str),
    };
    let mut tally = VariantTally::default();
    let mut results = Vec::with_capacity(reports.len());
    for report in &reports {
        println!("📂 {}", report.display());
        match check_report(&mut store, report, &mut tally, &options) {
            Ok(stats) => {
                println!(
                    "   {} {}: {} variants, {} expected, {} not expected, {} not found -> {}{}",
                    if stats.status == STATUS_PASS { "✅" } else { "❌" },
                    stats.run_name,
                    stats.total,
                    stats.expected,
                    stats.unexpected,
                    stats.not_found,
                    stats.status,
                    if stats.saved { "" } else { " (not saved)" }
                );
                results.push(stats);
            }
            Err(e) => println!("   ❌ ERROR: {e:#}"),
        }
    }

    if matches.get_flag("excel") {
        let summary = write_summary_spreadsheet(&store, &spreadsheet)?;
        println!(
            "📊 Spreadsheet: {} runs, {} variants -> {}",
            summary.num_runs,
            summary.num_variants,
            spreadsheet.display()
        );
        if !summary.failed_runs.is_empty() {
            println!("   Failed runs excluded: {}", summary.failed_runs.join(", "));
        }
    }

    if let Some(json) = matches.get_one::<String>("json") {
        results.write_json(json)?;
        println!("💾 Results saved to: {json}");
    }

    if debug && !reports.is_empty() {
        eprint!("{}", tally.render());
    }
    Ok(())
}
