//! STAMP Post-processing Tool
//!
//! Depth reports are sorted by minimum depth with under-covered regions
//! highlighted and saved as Excel. Variant reports get a highlighted row
//! between reported and NOT_REPORTED variants. With a variant report, the
//! sample's VCF is split into accepted and rejected files, and with both
//! depth reports a low-coverage comment is drafted.

use anyhow::Result;
use clap::{Arg, ArgAction, Command};
use stamp_qc_tools::config::ToolConfig;
use stamp_qc_tools::logging::init_cli_logger;
use stamp_qc_tools::postprocess::{group_files_by_sample, PostProcessor};
use stamp_qc_tools::file_name;
use std::path::PathBuf;

fn yes_no(present: bool) -> &'static str {
    if present {
        "YES"
    } else {
        "NO"
    }
}

fn main() -> Result<()> {
    let matches = Command::new("stamp-postprocess")
        .version("0.1.0")
        .about("Post-process STAMP depth reports, variant reports and VCFs")
        .author("STAMP Bioinformatics")
        .arg(
            Arg::new("reports")
                .value_name("REPORT_OR_DIR")
                .help("STAMP depth and/or variant reports, VCFs, or directories of them")
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
    let inputs: Vec<PathBuf> = matches
        .get_many::<String>("reports")
        .unwrap_or_default()
        .map(PathBuf::from)
        .collect();
    let outdir = matches.get_one::<String>("outdir").map(PathBuf::from);
    if let Some(dir) = &outdir {
        std::fs::create_dir_all(dir)?;
    }

    println!("🧬 STAMP Post-processing");
    println!(
        "Min coverage: {}x, chrY min coverage: {}x",
        config.postprocess.min_coverage, config.postprocess.male_min_coverage
    );

    let (samples, bad) = group_files_by_sample(&inputs)?;
    for path in &bad {
        println!("⚠️  Skipping {}", path.display());
    }

    let processor = PostProcessor::new(
        config.postprocess.min_coverage,
        config.postprocess.male_min_coverage,
        outdir,
    );
    let mut failed = 0;
    for (sample, files) in &samples {
        println!("\n📂 Sample {sample}");
        println!("- Formatting variant report: {}", yes_no(files.variant_report.is_some()));
        println!(
            "- Splitting vcf: {}",
            yes_no(files.vcf.is_some() && files.variant_report.is_some())
        );
        println!("- Sorting indel depth report: {}", yes_no(files.depth_indels.is_some()));
        println!("- Sorting snv depth report: {}", yes_no(files.depth_snvs.is_some()));
        println!(
            "- Generating low coverage comment: {}",
            yes_no(files.depth_indels.is_some() && files.depth_snvs.is_some())
        );

        match processor.process_sample(sample, files) {
            Ok(outputs) => {
                if let Some(split) = &outputs.vcf_split {
                    println!("   🔀 {} accepted, {} rejected variants", split.accepted, split.rejected);
                }
                if let Some(lcc) = &outputs.low_coverage {
                    println!("   📉 {} low coverage gene(s)", lcc.genes.len());
                }
                for file in &outputs.files {
                    println!("   💾 {}", file_name(file));
                }
            }
            Err(e) => {
                println!("   ❌ ERROR: {e:#}");
                failed += 1;
            }
        }
    }

    println!("\n✅ {} samples processed, {failed} failed", samples.len());
    Ok(())
}
