//! STAMP Barcode Count Tool
//!
//! Tallies the index reads of an I1 FASTQ. STAMP runs are demultiplexed on
//! the last four bases of the index, so by default those are counted; a
//! SampleSheet CSV switches to whole-index counting.

use anyhow::Result;
use clap::{Arg, ArgAction, Command};
use stamp_qc_tools::barcodes::{check_infile, parse_sample2barcode, parse_samplesheet_csv, BarcodeCounter, BarcodeMode};
use stamp_qc_tools::config::ToolConfig;
use stamp_qc_tools::logging::init_cli_logger;
use stamp_qc_tools::StatsRecord;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;

fn main() -> Result<()> {
    let matches = Command::new("stamp-count-barcodes")
        .version("0.1.0")
        .about("Count index barcodes in an I1 FASTQ file")
        .author("STAMP Bioinformatics")
        .arg(
            Arg::new("index")
                .value_name("I1_FASTQ")
                .help("Index read FASTQ (gzipped or plain)")
                .required(true),
        )
        .arg(
            Arg::new("labels")
                .value_name("SAMPLES")
                .help("sample2barcode.txt, or SampleSheet.csv for whole-index counting"),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("TXT")
                .help("Write the final report to a file instead of stdout"),
        )
        .arg(
            Arg::new("limit")
                .long("limit")
                .value_name("N")
                .help("Only list the N most frequent barcodes"),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .value_name("JSON")
                .help("Write counting statistics to a JSON file"),
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
                .help("Write debugging messages")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    init_cli_logger(matches.get_flag("debug"));
    let config = ToolConfig::load(matches.get_one::<String>("config").map(PathBuf::from).as_deref())?;
    let index_file = PathBuf::from(matches.get_one::<String>("index").unwrap());
    let limit: Option<usize> = matches
        .get_one::<String>("limit")
        .map(|l| l.parse())
        .transpose()?;

    let mut mode = BarcodeMode::Stamp;
    let mut labels = HashMap::new();
    if let Some(sample_file) = matches.get_one::<String>("labels") {
        check_infile(sample_file)?;
        if sample_file.to_lowercase().ends_with(".csv") {
            labels = parse_samplesheet_csv(sample_file)?;
            mode = BarcodeMode::Full;
        } else {
            labels = parse_sample2barcode(sample_file)?;
        }
    }

    if let Err(e) = check_infile(&index_file) {
        eprintln!("❌ {e}");
        std::process::exit(2);
    }

    eprintln!("🧬 STAMP Barcode Count");
    eprintln!("Input: {}", index_file.display());
    eprintln!(
        "Mode: {}",
        if mode == BarcodeMode::Stamp { "STAMP sub-barcodes" } else { "full index" }
    );

    let counter = BarcodeCounter::new(mode, config.barcodes.progress_interval);
    let stop = AtomicBool::new(false);
    let display_limit = Some(config.barcodes.display_limit);
    let counts = counter.count(&index_file, &stop, |running| {
        eprintln!("{}", running.report(display_limit, &labels));
    })?;

    let report = counts.report(limit, &labels);
    match matches.get_one::<String>("output") {
        Some(out) => {
            std::fs::write(out, &report)?;
            eprintln!("💾 Report saved to: {out}");
        }
        None => print!("{report}"),
    }

    if let Some(json) = matches.get_one::<String>("json") {
        counts.stats(&index_file, limit, &labels).write_json(json)?;
        eprintln!("💾 Statistics saved to: {json}");
    }
    eprintln!("✅ Counted {} reads", counts.total_reads);
    Ok(())
}
