//! TruQ3 truth sets, variant reports and their comparison

use crate::error::StampError;
use crate::format_decimal;
use crate::tabfile::{KeyedTable, Record};
use anyhow::Result;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

pub const VARIANT_REPORT_SUFFIX: &str = ".variant_report.txt";
const CONTROL_PREFIX: &str = "TruQ3_";

pub const STATUS_PASS: &str = "PASS";
pub const STATUS_FAIL: &str = "FAIL";

/// Report column name to database column name: spaces become underscores,
/// and names with fewer than three capitals are lowercased.
pub fn field_to_db(field: &str) -> String {
    let name = field.replace(' ', "_");
    if count_uppercase(&name) < 3 {
        name.to_lowercase()
    } else {
        name
    }
}

/// Database column name to report column name
pub fn field_to_report(field: &str) -> String {
    let name = field.replace('_', " ");
    if count_uppercase(&name) == 0 {
        title_case(&name)
    } else {
        name
    }
}

fn count_uppercase(s: &str) -> usize {
    s.chars().filter(|c| c.is_uppercase()).count()
}

/// Capitalise the first letter of every run of letters
fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_word = false;
    for c in s.chars() {
        if c.is_alphabetic() {
            if in_word {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            in_word = true;
        } else {
            out.push(c);
            in_word = false;
        }
    }
    out
}

/// Natural key of a mutation: `gene:position:ref:var`
pub fn dkey(record: &Record) -> String {
    format!(
        "{}:{}:{}:{}",
        record.text("gene"),
        record.text("position"),
        record.text("ref"),
        record.text("var")
    )
}

/// Normalise a truth or report row in place.
///
/// `position` must be an integer. `HGVS`/`CDS_Change` and
/// `protein`/`AA_Change` are filled from each other, `expectedVAF` loses its
/// `%`, and `NA` identifiers become empty.
pub fn massage(record: &mut Record, path: &Path) -> Result<()> {
    let position = record.text("position").trim().to_string();
    let position: i64 = position.parse().map_err(|_| {
        StampError::bad_format(path, format!("position '{position}' is not an integer"))
    })?;
    record.set("position", position.to_string());

    if !record.contains("HGVS") {
        if let Some(cds) = record.get("CDS_Change").map(str::to_string) {
            record.set("HGVS", format!("c.{cds}"));
        }
    } else if !record.contains("CDS_Change") {
        let hgvs = record.text("HGVS");
        let cds = hgvs.strip_prefix("c.").unwrap_or(hgvs).to_string();
        record.set("CDS_Change", cds);
    }
    if !record.contains("protein") {
        if let Some(aa) = record.get("AA_Change").map(str::to_string) {
            record.set("protein", aa);
        }
    } else if !record.contains("AA_Change") {
        let protein = record.text("protein").to_string();
        record.set("AA_Change", protein);
    }

    if let Some(vaf) = record.get("expectedVAF").map(str::to_string) {
        let vaf = vaf.trim().trim_end_matches('%');
        if vaf.is_empty() {
            record.set("expectedVAF", "");
        } else {
            let v: f64 = vaf.parse().map_err(|_| {
                StampError::bad_format(path, format!("expectedVAF '{vaf}' is not a number"))
            })?;
            record.set("expectedVAF", format_decimal(v));
        }
    }
    for field in ["dbSNP138_ID", "COSMIC70_ID"] {
        if record.get(field) == Some("NA") {
            record.set(field, "");
        }
    }
    Ok(())
}

/// Expected mutations of the TruQ3 control, keyed by dkey
#[derive(Debug, Clone, Default)]
pub struct TruthSet {
    /// Database-style column names in file order
    pub fields: Vec<String>,
    pub variants: BTreeMap<String, Record>,
}

impl TruthSet {
    pub fn len(&self) -> usize {
        self.variants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Record> {
        self.variants.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.variants.contains_key(key)
    }
}

/// Read the truth file
pub fn parse_truth<P: AsRef<Path>>(path: P) -> Result<TruthSet> {
    let path = path.as_ref();
    tracing::info!(file = %path.display(), "reading truths");
    let table = KeyedTable::parse(path, field_to_db)?;
    let mut truths = TruthSet {
        fields: table.fields,
        variants: BTreeMap::new(),
    };
    for mut record in table.records {
        massage(&mut record, path)?;
        truths.variants.insert(dkey(&record), record);
    }
    tracing::info!(mutations = truths.len(), "truths loaded");
    Ok(truths)
}

/// A TruQ3 variant report with its sample and run names
#[derive(Debug, Clone)]
pub struct VariantReport {
    pub path: PathBuf,
    pub sample: String,
    /// `STAMP{n}`, empty when the sample carries no run number
    pub run_name: String,
    pub fields: Vec<String>,
    pub records: Vec<Record>,
}

impl VariantReport {
    pub fn parse<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        tracing::info!(file = %path.display(), "reading variant report");
        let name = crate::file_name(path);
        let sample = name.replace(VARIANT_REPORT_SUFFIX, "");
        let run_name = run_name_for_sample(&sample);

        let table = KeyedTable::parse(path, field_to_db)?;
        let mut records = table.records;
        for record in records.iter_mut() {
            massage(record, path)?;
        }
        tracing::info!(mutations = records.len(), sample = %sample, run = %run_name, "variant report loaded");
        Ok(Self {
            path: path.to_path_buf(),
            sample,
            run_name,
            fields: table.fields,
            records,
        })
    }
}

/// `TruQ3_305` -> `STAMP305`
pub fn run_name_for_sample(sample: &str) -> String {
    let run = sample.strip_prefix(CONTROL_PREFIX).unwrap_or(sample);
    if run.is_empty() {
        String::new()
    } else {
        format!("STAMP{run}")
    }
}

/// Per-dkey observation counts across all reports checked in one invocation
#[derive(Debug, Clone, Default)]
pub struct VariantTally {
    pub reports: usize,
    pub expected: BTreeMap<String, usize>,
    pub unexpected: BTreeMap<String, usize>,
}

impl VariantTally {
    /// Text dump printed with `--debug`
    pub fn render(&self) -> String {
        let mut out = format!("Total reports:\t{}\n", self.reports);
        for (label, counts) in [("Expected", &self.expected), ("Unexpected", &self.unexpected)] {
            let _ = writeln!(out, "\n{label} variants:");
            for (key, n) in counts {
                let _ = writeln!(out, "  {key:30}:\t{n:3}");
            }
        }
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Call {
    Expected,
    NotExpected,
}

/// Result of checking one report against the truths
#[derive(Debug, Clone)]
pub struct Comparison {
    /// One call per report record, in report order
    pub calls: Vec<Call>,
    pub total: usize,
    pub expected: usize,
    pub unexpected: usize,
    /// Truth keys never observed, sorted
    pub not_found: Vec<String>,
}

/// Status of a stored run: FAIL when it holds fewer calls, expected or
/// not, than half the expected mutations (integer division).
pub fn run_status(num_mutations: i64, num_expected_truths: i64) -> &'static str {
    if num_mutations < num_expected_truths / 2 {
        STATUS_FAIL
    } else {
        STATUS_PASS
    }
}

pub fn compare_variants(truths: &TruthSet, report: &VariantReport, tally: &mut VariantTally) -> Comparison {
    tally.reports += 1;
    let mut seen = BTreeSet::new();
    let mut calls = Vec::with_capacity(report.records.len());
    let mut expected = 0;
    let mut unexpected = 0;

    for record in &report.records {
        let key = dkey(record);
        if truths.contains(&key) {
            *tally.expected.entry(key.clone()).or_default() += 1;
            expected += 1;
            calls.push(Call::Expected);
            seen.insert(key);
        } else {
            *tally.unexpected.entry(key).or_default() += 1;
            unexpected += 1;
            calls.push(Call::NotExpected);
        }
    }

    let not_found: Vec<String> = truths
        .variants
        .keys()
        .filter(|k| !seen.contains(*k))
        .cloned()
        .collect();
    if not_found.is_empty() {
        tracing::info!(sample = %report.sample, "all truths found");
    } else {
        tracing::info!(sample = %report.sample, "not found: {}", not_found.join(", "));
    }

    Comparison {
        calls,
        total: report.records.len(),
        expected,
        unexpected,
        not_found,
    }
}

/// Text of the checked report: summary lines, the report rows annotated
/// with `Expected?`, then the truths that were not observed.
pub fn checked_report(report: &VariantReport, comparison: &Comparison, truths: &TruthSet) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# Num expected found: {}", comparison.expected);
    let _ = writeln!(out, "# Num not expected: {}", comparison.unexpected);
    let _ = writeln!(out, "# Num not found: {}", comparison.not_found.len());

    let mut header: Vec<String> = report.fields.iter().map(|f| field_to_report(f)).collect();
    header.push("Expected?".to_string());
    let _ = writeln!(out, "{}", header.join("\t"));

    for (record, call) in report.records.iter().zip(&comparison.calls) {
        let label = match call {
            Call::Expected => {
                let vaf = truths
                    .get(&dkey(record))
                    .map(|t| t.text("expectedVAF"))
                    .unwrap_or("");
                if vaf.is_empty() {
                    "Expected".to_string()
                } else {
                    format!("Expected ({vaf}%)")
                }
            }
            Call::NotExpected => "Not expected".to_string(),
        };
        push_row(&mut out, &report.fields, record, label);
    }

    for key in &comparison.not_found {
        let Some(truth) = truths.get(key) else { continue };
        let vaf = truth.text("expectedVAF");
        let label = if vaf.is_empty() {
            "Not found".to_string()
        } else {
            format!("Not found ({vaf}%)")
        };
        push_row(&mut out, &report.fields, truth, label);
    }
    out
}

fn push_row(out: &mut String, fields: &[String], record: &Record, label: String) {
    let mut row: Vec<&str> = fields.iter().map(|f| record.text(f)).collect();
    row.push(&label);
    let _ = writeln!(out, "{}", row.join("\t"));
}

/// Write `<report minus .txt>.checked.txt`, replacing any existing file
pub fn write_checked_report(
    report: &VariantReport,
    comparison: &Comparison,
    truths: &TruthSet,
    outdir: Option<&Path>,
) -> Result<PathBuf> {
    let outfile = crate::output_path(&report.path, ".txt", ".checked.txt", outdir);
    if outfile.exists() {
        tracing::debug!(file = %outfile.display(), "replacing checked report");
    }
    std::fs::write(&outfile, checked_report(report, comparison, truths))?;
    tracing::info!(
        file = %outfile.display(),
        expected = comparison.expected,
        not_expected = comparison.unexpected,
        not_found = comparison.not_found.len(),
        "wrote checked report"
    );
    Ok(outfile)
}
