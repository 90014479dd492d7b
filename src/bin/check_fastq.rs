//! STAMP Check FASTQ Tool
//!
//! Reads gzipped or plain FASTQ files to the end to catch truncated or
//! corrupt files, reporting line and sequence counts.

use anyhow::Result;
use clap::{Arg, ArgAction, Command};
use stamp_qc_tools::config::ToolConfig;
use stamp_qc_tools::fastq::FastqChecker;
use stamp_qc_tools::logging::init_cli_logger;
use stamp_qc_tools::{file_name, with_commas, StatsRecord};
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;

fn main() -> Result<()> {
    let matches = Command::new("stamp-check-fastq")
        .version("0.1.0")
        .about("Test gzipped FASTQ files for corruption and count their lines and sequences")
        .author("STAMP Bioinformatics")
        .arg(
            Arg::new("fastq")
                .value_name("FASTQ")
                .help("FASTQ files")
                .num_args(1..)
                .required(true),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .value_name("JSON")
                .help("Write per-file results to a JSON file"),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("TOML")
                .help("Configuration file"),
        )
        .arg(
            Arg::new("debug")
                .long("debug")
                .help("Write debugging messages")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    init_cli_logger(matches.get_flag("debug"));
    let config = ToolConfig::load(matches.get_one::<String>("config").map(PathBuf::from).as_deref())?;
    let files: Vec<PathBuf> = matches
        .get_many::<String>("fastq")
        .unwrap_or_default()
        .map(PathBuf::from)
        .collect();

    println!("🧬 STAMP Check FASTQ");
    println!("{} file{} to check", files.len(), if files.len() == 1 { "" } else { "s" });

    let checker = FastqChecker::new(config.fastq.progress_interval);
    let stop = AtomicBool::new(false);
    let mut results = Vec::with_capacity(files.len());
    for (num, path) in files.iter().enumerate() {
        println!("📂 File {}: {}", num + 1, file_name(path));
        let stats = checker.check(path, &stop, |progress| {
            tracing::info!(
                lines = progress.lines,
                sequences = progress.sequences(),
                "counting {}",
                file_name(path)
            );
        });
        println!("   Size: {} bytes", with_commas(stats.file_size));
        println!("   Lines: {}", with_commas(stats.lines));
        println!("   Sequences: {}", with_commas(stats.sequences));
        println!("   ⏱️  Elapsed: {}", stats.elapsed);
        if let Some(err) = &stats.error {
            println!("   ❌ ERROR: {err}");
        }
        results.push(stats);
    }

    if let Some(json) = matches.get_one::<String>("json") {
        results.write_json(json)?;
        println!("💾 Results saved to: {json}");
    }

    let corrupt = results.iter().filter(|s| !s.is_ok()).count();
    if corrupt > 0 {
        println!("❌ {corrupt} of {} files corrupt", results.len());
        std::process::exit(1);
    }
    println!("✅ Done.");
    Ok(())
}
