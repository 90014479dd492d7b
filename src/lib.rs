//! STAMP QC Tools
//!
//! Command-line utilities for the STAMP sequencing assay: validating FASTQ
//! files, counting index barcodes, reformatting pipeline reports and tracking
//! control-sample QC across runs.
//!
//! This library provides shared functionality for:
//! - FASTQ integrity checks and barcode demultiplexing counts
//! - Coversheet to sample2barcode conversion
//! - Variant and depth report post-processing (spreadsheets, VCF splits)
//! - TruQ3 control QC against a known-truth database
//! - Water barcode contamination tracking
//! - Pathology report addendum documents

pub mod addendum;
pub mod barcodes;
pub mod config;
pub mod coversheet;
pub mod db;
pub mod error;
pub mod fastq;
pub mod logging;
pub mod postprocess;
pub mod spreadsheet;
pub mod stampqc;
pub mod tabfile;
pub mod water;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Trait for statistics structures that can be saved as JSON
pub trait StatsRecord: Clone + Serialize + for<'de> Deserialize<'de> + std::fmt::Debug {
    fn write_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json_output = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json_output)?;
        Ok(())
    }
}

impl<T: StatsRecord> StatsRecord for Vec<T> {}

/// FASTQ integrity check result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FastqCheckStats {
    pub file: String,
    pub file_size: u64,
    pub lines: u64,
    pub sequences: u64,
    pub elapsed: String,
    pub stopped: bool,
    pub error: Option<String>,
}

impl FastqCheckStats {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

impl StatsRecord for FastqCheckStats {}

/// Barcode counting statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BarcodeCountStats {
    pub index_file: String,
    pub stamp_mode: bool,
    pub total_reads: u64,
    pub unique_barcodes: usize,
    pub top_barcodes: Vec<BarcodeShare>,
}

impl StatsRecord for BarcodeCountStats {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BarcodeShare {
    pub barcode: String,
    pub count: u64,
    pub percent: f64,
    pub label: Option<String>,
}

/// Outcome of checking one TruQ3 variant report against the truth set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QcRunStats {
    pub run_name: String,
    pub sample_name: String,
    pub total: usize,
    pub expected: usize,
    pub unexpected: usize,
    pub not_found: usize,
    pub status: String,
    pub saved: bool,
}

impl StatsRecord for QcRunStats {}

/// Return a file's name and size on disk
pub fn get_file_info<P: AsRef<Path>>(path: P) -> Result<(String, u64)> {
    let metadata = std::fs::metadata(&path)?;
    Ok((file_name(&path), metadata.len()))
}

/// Base name of a path, lossily converted
pub fn file_name<P: AsRef<Path>>(path: P) -> String {
    path.as_ref()
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Build an output path from an input path by replacing `in_ext` with
/// `out_ext`, optionally relocating it into `outdir`.
pub fn output_path<P: AsRef<Path>>(
    input: P,
    in_ext: &str,
    out_ext: &str,
    outdir: Option<&Path>,
) -> PathBuf {
    let input = input.as_ref();
    let name = file_name(input);
    let stem = name.strip_suffix(in_ext).unwrap_or(&name);
    let out_name = format!("{stem}{out_ext}");
    match outdir {
        Some(dir) => dir.join(out_name),
        None => input.with_file_name(out_name),
    }
}

/// Format an elapsed duration as `m:ss`
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{}:{:02}", secs / 60, secs % 60)
}

/// Format a float the way the lab reports print them: integral values keep
/// one decimal place (`5.0`), others use the shortest exact form.
pub fn format_decimal(v: f64) -> String {
    if v.is_finite() && v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{v:.1}")
    } else {
        v.to_string()
    }
}

/// Format an integer with thousands separators
pub fn with_commas(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_path() {
        let out = output_path("/data/s1.variant_report.txt", ".txt", ".xlsx", None);
        assert_eq!(out, PathBuf::from("/data/s1.variant_report.xlsx"));

        let out = output_path(
            "/data/s1.vcf",
            ".vcf",
            "_accepted.vcf",
            Some(Path::new("/tmp/out")),
        );
        assert_eq!(out, PathBuf::from("/tmp/out/s1_accepted.vcf"));
    }

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(Duration::from_secs(0)), "0:00");
        assert_eq!(format_elapsed(Duration::from_secs(75)), "1:15");
        assert_eq!(format_elapsed(Duration::from_secs(3601)), "60:01");
    }

    #[test]
    fn test_format_decimal() {
        assert_eq!(format_decimal(5.0), "5.0");
        assert_eq!(format_decimal(12.25), "12.25");
        assert_eq!(format_decimal(-1.0), "-1.0");
    }

    #[test]
    fn test_with_commas() {
        assert_eq!(with_commas(0), "0");
        assert_eq!(with_commas(999), "999");
        assert_eq!(with_commas(1000), "1,000");
        assert_eq!(with_commas(1234567), "1,234,567");
    }
}
