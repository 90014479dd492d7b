//! STAMP sample2barcode Tool
//!
//! Converts STAMP Excel coversheets to the `sample2barcode` files used for
//! demultiplexing.

use anyhow::Result;
use clap::{Arg, ArgAction, Command};
use stamp_qc_tools::coversheet::Coversheet;
use stamp_qc_tools::logging::init_cli_logger;
use std::path::PathBuf;

fn main() -> Result<()> {
    let matches = Command::new("stamp-sample2barcode")
        .version("0.1.0")
        .about("Create sample2barcode.txt files from STAMP coversheets")
        .author("STAMP Bioinformatics")
        .arg(
            Arg::new("coversheets")
                .value_name("COVERSHEET")
                .help("STAMP Excel coversheets")
                .num_args(1..)
                .required(true),
        )
        .arg(
            Arg::new("outdir")
                .short('o')
                .long("outdir")
                .value_name("DIR")
                .help("Directory to save output file(s)"),
        )
        .arg(
            Arg::new("debug")
                .long("debug")
                .help("Write debugging messages")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    init_cli_logger(matches.get_flag("debug"));
    let outdir = matches.get_one::<String>("outdir").map(PathBuf::from);
    if let Some(dir) = &outdir {
        std::fs::create_dir_all(dir)?;
    }

    println!("🧬 STAMP sample2barcode");
    let mut written = 0;
    for coversheet in matches.get_many::<String>("coversheets").unwrap_or_default() {
        println!("\n📂 Coversheet {coversheet}");
        let sheet = match Coversheet::load(coversheet) {
            Ok(sheet) => sheet,
            Err(e) => {
                println!("   ❌ ERROR: {e:#}");
                continue;
            }
        };
        if !sheet.is_recognized() {
            println!("   ⚠️  WARNING: Unrecognized format {coversheet}");
            continue;
        }
        if sheet.samples.is_empty() {
            println!("   ⚠️  WARNING: No data {coversheet}");
            continue;
        }
        let outfile = sheet.output_path(outdir.as_deref());
        let samples = sheet.write_sample2barcode(&outfile)?;
        println!("   💾 Writing {} ({samples} samples)", outfile.display());
        written += 1;
    }
    println!("\n✅ {written} sample2barcode file{} written", if written == 1 { "" } else { "s" });
    Ok(())
}
