//! STAMP Pathology Addendum Tool
//!
//! Compiles each run's GA CSV exports, fusion and CNV calls into one Word
//! document with a page of addendum text per sample.

use anyhow::Result;
use clap::{Arg, ArgAction, Command};
use stamp_qc_tools::addendum::{filter_input, write_addendums, Signatories, SpecialVariants};
use stamp_qc_tools::config::ToolConfig;
use stamp_qc_tools::logging::init_cli_logger;
use std::path::PathBuf;

fn main() -> Result<()> {
    let matches = Command::new("stamp-addendums")
        .version("0.1.0")
        .about("Create pathology report addendums, one page per sample CSV")
        .author("STAMP Bioinformatics")
        .arg(
            Arg::new("input")
                .value_name("INPUT")
                .help("STAMP run directories, or folders or files with STAMP CSV, fusion and CNV files")
                .num_args(1..)
                .required(true),
        )
        .arg(
            Arg::new("resident")
                .short('r')
                .long("resident")
                .value_name("NAME")
                .help("Name of resident"),
        )
        .arg(
            Arg::new("signout")
                .short('s')
                .long("signout")
                .value_name("NAME")
                .help("Name of sign-out attending"),
        )
        .arg(
            Arg::new("director")
                .long("director")
                .value_name("NAME")
                .help("Name of the laboratory director"),
        )
        .arg(
            Arg::new("outfile")
                .short('o')
                .long("outfile")
                .value_name("DOCX")
                .help("Output file when a single document is produced"),
        )
        .arg(
            Arg::new("special_variants")
                .long("special-variants")
                .value_name("TSV")
                .help("Special-case variant comments"),
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
    let name_or = |arg: &str, default: &str| {
        matches
            .get_one::<String>(arg)
            .cloned()
            .unwrap_or_else(|| default.to_string())
    };
    let names = Signatories {
        resident: name_or("resident", &config.addendum.resident),
        director: name_or("director", &config.addendum.director),
        signout: name_or("signout", &config.addendum.signout),
    };
    let special_file = matches
        .get_one::<String>("special_variants")
        .map(PathBuf::from)
        .unwrap_or_else(|| config.special_variants_file());
    let inputs: Vec<PathBuf> = matches
        .get_many::<String>("input")
        .unwrap_or_default()
        .map(PathBuf::from)
        .collect();
    let outfile = matches.get_one::<String>("outfile").map(PathBuf::from);

    println!("🧬 STAMP Pathology Addendums");
    let special = SpecialVariants::load(Some(special_file.as_path()))?;
    println!("📋 Special variant rules for {} genes", special.genes.len());

    let (runs, bad) = filter_input(&inputs)?;
    for input in &bad {
        println!("⚠️  {}: {}", input.reason, input.path.display());
    }

    let written = write_addendums(&runs, &special, &names, outfile.as_deref())?;
    for summary in &written {
        println!("💾 {} ({} pages)", summary.outfile.display(), summary.pages);
        if !summary.skipped.is_empty() {
            println!("   Skipped without CSV: {}", summary.skipped.join(", "));
        }
        for failed in &summary.failed {
            println!("   ⚠️  Left out {}: {}", failed.path.display(), failed.reason);
        }
    }
    println!("✅ {} document{} written", written.len(), if written.len() == 1 { "" } else { "s" });
    Ok(())
}
