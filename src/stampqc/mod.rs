//! TruQ3 control QC
//!
//! Each TruQ3 variant report is checked against the expected mutations,
//! optionally annotated, and stored in the QC database. The database feeds
//! a spreadsheet that tracks VAFs of every mutation across good runs.

pub mod store;
pub mod summary;
pub mod variants;

pub use store::{DbSummary, QcStore, SaveOutcome};
pub use summary::{write_summary_spreadsheet, SummaryStats};
pub use variants::{
    compare_variants, parse_truth, run_status, write_checked_report, Comparison, TruthSet, VariantReport, VariantTally,
    STATUS_FAIL, STATUS_PASS,
};

use crate::QcRunStats;
use anyhow::Result;
use std::path::Path;

/// Options for checking a batch of reports
#[derive(Debug, Clone, Default)]
pub struct CheckOptions<'a> {
    pub outdir: Option<&'a Path>,
    pub write_text: bool,
    pub force: bool,
    /// Overrides the status derived from the run's call counts
    pub status: Option<&'a str>,
}

/// Check one report, save it, and write its annotated copy when asked
pub fn check_report<P: AsRef<Path>>(
    store: &mut QcStore,
    path: P,
    tally: &mut VariantTally,
    options: &CheckOptions<'_>,
) -> Result<QcRunStats> {
    let report = VariantReport::parse(path)?;
    let comparison = compare_variants(store.truths(), &report, tally);
    let outcome = store.save_run(&report.run_name, &report.sample, options.status, &report, options.force)?;
    let status = match store.run(&report.run_name, &report.sample)? {
        Some(run) => run.run_status,
        None => options
            .status
            .unwrap_or_else(|| run_status(report.records.len() as i64, store.truths().len() as i64))
            .to_string(),
    };
    if options.write_text {
        write_checked_report(&report, &comparison, store.truths(), options.outdir)?;
    }
    Ok(QcRunStats {
        run_name: report.run_name,
        sample_name: report.sample,
        total: comparison.total,
        expected: comparison.expected,
        unexpected: comparison.unexpected,
        not_found: comparison.not_found.len(),
        status,
        saved: outcome.is_saved(),
    })
}
