//! STAMP report post-processing
//!
//! Per sample, the pipeline leaves a variant report, a VCF and two depth
//! reports (indels, SNVs). This module turns the reports into
//! spreadsheets, splits the VCF by report status and drafts the
//! low-coverage comment for the pathology report.

use crate::error::StampError;
use crate::spreadsheet::{write_rows, Highlight, RowData};
use crate::tabfile::{cell, TabReport};
use crate::{file_name, output_path};
use anyhow::{Context, Result};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

pub const NOT_REPORTED: &str = "NOT_REPORTED";
const MIN_DEPTH_COLUMNS: [&str; 2] = ["Min Depth", "Min_Depth"];
const SEPARATOR_WIDTH: usize = 26;

/// Input files recognised by suffix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportKind {
    Vcf,
    DepthIndels,
    DepthSnvs,
    VariantReport,
}

impl ReportKind {
    pub const ALL: [ReportKind; 4] = [
        ReportKind::DepthIndels,
        ReportKind::DepthSnvs,
        ReportKind::VariantReport,
        ReportKind::Vcf,
    ];

    pub fn suffix(self) -> &'static str {
        match self {
            ReportKind::Vcf => ".vcf",
            ReportKind::DepthIndels => ".depth_report_indels.txt",
            ReportKind::DepthSnvs => ".depth_report_snvs.txt",
            ReportKind::VariantReport => ".variant_report.txt",
        }
    }
}

/// The pipeline outputs of one sample
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SampleFiles {
    pub vcf: Option<PathBuf>,
    pub depth_indels: Option<PathBuf>,
    pub depth_snvs: Option<PathBuf>,
    pub variant_report: Option<PathBuf>,
}

impl SampleFiles {
    fn slot(&mut self, kind: ReportKind) -> &mut Option<PathBuf> {
        match kind {
            ReportKind::Vcf => &mut self.vcf,
            ReportKind::DepthIndels => &mut self.depth_indels,
            ReportKind::DepthSnvs => &mut self.depth_snvs,
            ReportKind::VariantReport => &mut self.variant_report,
        }
    }
}

/// Expand directories (one level) and group files by sample. Files already
/// produced by a VCF split, and unrecognised files, come back as bad files.
pub fn group_files_by_sample(inputs: &[PathBuf]) -> Result<(BTreeMap<String, SampleFiles>, Vec<PathBuf>)> {
    let mut files = Vec::new();
    for input in inputs {
        if input.is_file() {
            files.push(input.clone());
        } else if input.is_dir() {
            let mut entries: Vec<PathBuf> = fs::read_dir(input)
                .with_context(|| format!("cannot list {}", input.display()))?
                .filter_map(|e| e.ok().map(|e| e.path()))
                .filter(|p| p.is_file())
                .collect();
            entries.sort();
            files.extend(entries);
        } else {
            tracing::warn!(path = %input.display(), "input not found");
        }
    }

    let mut samples: BTreeMap<String, SampleFiles> = BTreeMap::new();
    let mut bad = Vec::new();
    for file in files {
        let name = file_name(&file);
        if name.ends_with("_accepted.vcf") || name.ends_with("_rejected.vcf") {
            bad.push(file);
            continue;
        }
        let kind = ReportKind::ALL
            .into_iter()
            .find(|k| name.ends_with(k.suffix()));
        match kind {
            Some(kind) => {
                let sample = name[..name.len() - kind.suffix().len()].to_string();
                *samples.entry(sample).or_default().slot(kind) = Some(file);
            }
            None => bad.push(file),
        }
    }
    Ok((samples, bad))
}

/// Result of splitting a VCF by variant report status
#[derive(Debug, Clone)]
pub struct VcfSplit {
    pub accepted_file: PathBuf,
    pub rejected_file: PathBuf,
    pub accepted: usize,
    pub rejected: usize,
}

/// Genes below the coverage threshold and the comment drafted from them
#[derive(Debug, Clone)]
pub struct LowCoverage {
    /// gene -> chromosome
    pub genes: BTreeMap<String, String>,
    pub possibly_female: bool,
    pub comment: String,
}

/// Files written for one sample
#[derive(Debug, Clone, Default)]
pub struct SampleOutputs {
    pub files: Vec<PathBuf>,
    pub vcf_split: Option<VcfSplit>,
    pub low_coverage: Option<LowCoverage>,
}

pub struct PostProcessor {
    pub min_coverage: i64,
    pub male_min_coverage: i64,
    pub outdir: Option<PathBuf>,
}

impl Default for PostProcessor {
    fn default() -> Self {
        Self {
            min_coverage: 200,
            male_min_coverage: 60,
            outdir: None,
        }
    }
}

impl PostProcessor {
    pub fn new(min_coverage: u32, male_min_coverage: u32, outdir: Option<PathBuf>) -> Self {
        Self {
            min_coverage: min_coverage as i64,
            male_min_coverage: male_min_coverage as i64,
            outdir,
        }
    }

    fn outfile(&self, input: &Path, in_ext: &str, out_ext: &str) -> PathBuf {
        output_path(input, in_ext, out_ext, self.outdir.as_deref())
    }

    /// Depth report as a spreadsheet, rows ordered by minimum depth with
    /// under-covered regions highlighted.
    pub fn depth_report_xlsx(&self, report_path: &Path) -> Result<(TabReport, PathBuf)> {
        let outfile = self.outfile(report_path, ".txt", ".xlsx");
        let report = TabReport::parse(report_path)?;
        let i_depth = report.column_any(&MIN_DEPTH_COLUMNS)?;

        let mut keyed = Vec::with_capacity(report.rows.len());
        for row in &report.rows {
            keyed.push((report.int_value(row, i_depth)?, row));
        }
        keyed.sort_by_key(|(depth, _)| *depth);

        let mut rows = header_rows(&report);
        for (depth, row) in keyed {
            if depth < self.min_coverage {
                rows.push(RowData::highlighted(row.clone(), Highlight::Yellow));
            } else {
                rows.push(RowData::new(row.clone()));
            }
        }

        let written = write_rows(&rows, &outfile, &sheet_label(&outfile))?;
        if written != report.num_lines {
            return Err(StampError::LineCountMismatch {
                file: report_path.to_path_buf(),
                expected: report.num_lines,
                written,
            }
            .into());
        }
        tracing::debug!(file = %outfile.display(), "wrote depth report spreadsheet");
        Ok((report, outfile))
    }

    /// Variant report as a spreadsheet, with a highlighted separator row
    /// above the first `NOT_REPORTED` variant.
    pub fn variant_report_xlsx(&self, report_path: &Path) -> Result<(TabReport, PathBuf)> {
        let outfile = self.outfile(report_path, ".txt", ".xlsx");
        let report = TabReport::parse(report_path)?;
        let i_status = report.column("Status")?;

        let mut rows = header_rows(&report);
        let mut separator_added = false;
        for row in &report.rows {
            if !separator_added && cell(row, i_status) == NOT_REPORTED {
                rows.push(RowData::highlighted(
                    vec![String::new(); SEPARATOR_WIDTH],
                    Highlight::Gold,
                ));
                separator_added = true;
            }
            rows.push(RowData::new(row.clone()));
        }

        let written = write_rows(&rows, &outfile, &sheet_label(&outfile))?;
        let expected = report.num_lines + usize::from(separator_added);
        if !separator_added {
            tracing::info!(file = %file_name(report_path), "no NOT_REPORTED variants");
        }
        if written != expected {
            return Err(StampError::LineCountMismatch {
                file: report_path.to_path_buf(),
                expected,
                written,
            }
            .into());
        }
        Ok((report, outfile))
    }

    /// Split a VCF into accepted and rejected files using the variant
    /// report's Status column.
    pub fn split_vcf(&self, vcf_path: &Path, variants: &TabReport) -> Result<VcfSplit> {
        let i_status = variants.column("Status")?;
        let i_chrom = variants.column("Chr")?;
        let i_pos = variants.column("Position")?;
        let mut status: HashMap<(String, i64), &str> = HashMap::new();
        for row in &variants.rows {
            let chrom = normalize_chrom(cell(row, i_chrom));
            let pos = variants.int_value(row, i_pos)?;
            status.insert((chrom, pos), cell(row, i_status));
        }

        let content = fs::read_to_string(vcf_path)
            .with_context(|| format!("cannot read {}", vcf_path.display()))?;
        let mut head = String::new();
        let mut accepted = String::new();
        let mut rejected = String::new();
        let (mut n_accepted, mut n_rejected) = (0, 0);
        for line in content.split_inclusive('\n') {
            if line.starts_with('#') {
                head.push_str(line);
                continue;
            }
            if line.trim().is_empty() {
                continue;
            }
            let mut cols = line.splitn(3, '\t');
            let chrom = normalize_chrom(cols.next().unwrap_or(""));
            let pos: i64 = cols
                .next()
                .and_then(|p| p.trim().parse().ok())
                .ok_or_else(|| StampError::bad_format(vcf_path, format!("bad VCF line: {}", line.trim_end())))?;
            match status.get(&(chrom.clone(), pos)) {
                Some(s) if *s == NOT_REPORTED => {
                    rejected.push_str(line);
                    n_rejected += 1;
                }
                Some(_) => {
                    accepted.push_str(line);
                    n_accepted += 1;
                }
                None => {
                    tracing::warn!(chrom = %chrom, pos, "VCF variant not in variant report, keeping it");
                    accepted.push_str(line);
                    n_accepted += 1;
                }
            }
        }

        let accepted_file = self.outfile(vcf_path, ".vcf", "_accepted.vcf");
        let rejected_file = self.outfile(vcf_path, ".vcf", "_rejected.vcf");
        fs::write(&accepted_file, format!("{head}{accepted}"))?;
        fs::write(&rejected_file, format!("{head}{rejected}"))?;
        tracing::info!(accepted = n_accepted, rejected = n_rejected, "split VCF");
        Ok(VcfSplit {
            accepted_file,
            rejected_file,
            accepted: n_accepted,
            rejected: n_rejected,
        })
    }

    /// Collect under-covered genes from both depth reports and draft the
    /// comment. chrY coverage decides whether a female variant is included.
    pub fn low_coverage(&self, indels: &TabReport, snvs: &TabReport) -> Result<LowCoverage> {
        let mut genes = BTreeMap::new();
        let mut possibly_female = true;
        for report in [indels, snvs] {
            let i_depth = report.column_any(&MIN_DEPTH_COLUMNS)?;
            let i_desc = report.column("Description")?;
            let i_chr = report.column("Chr")?;
            for row in &report.rows {
                let depth = report.int_value(row, i_depth)?;
                let chrom = cell(row, i_chr);
                if depth < self.min_coverage {
                    let gene = cell(row, i_desc).split('_').next().unwrap_or("");
                    genes.insert(gene.to_string(), chrom.to_string());
                }
                if chrom == "chrY" && depth >= self.male_min_coverage {
                    possibly_female = false;
                }
            }
        }

        let male = self.comment_text(genes.keys().map(String::as_str));
        let comment = if possibly_female {
            let female = self.comment_text(
                genes
                    .iter()
                    .filter(|(_, chrom)| chrom.as_str() != "chrY")
                    .map(|(g, _)| g.as_str()),
            );
            format!(
                "All chrY regions have coverage < {}.\nFEMALE (no chrY genes):\n{female}\n\nMALE:\n{male}\n",
                self.male_min_coverage
            )
        } else {
            male
        };
        Ok(LowCoverage {
            genes,
            possibly_female,
            comment,
        })
    }

    fn comment_text<'a>(&self, genes: impl Iterator<Item = &'a str>) -> String {
        let genes: BTreeSet<&str> = genes.collect();
        if genes.is_empty() {
            return format!(
                "All regions met the minimum coverage of {}x.",
                self.min_coverage
            );
        }
        format!(
            "Portions of the following gene(s) failed to meet the minimum coverage of {}x: {}. \
             Low coverage may adversely affect the sensitivity of the assay. \
             If clinically indicated, repeat testing on a new specimen can be considered.",
            self.min_coverage,
            gene_list(&genes.into_iter().collect::<Vec<_>>())
        )
    }

    /// Write `<sample>.low_coverage_comment.txt` next to the SNV depth report
    pub fn write_low_coverage_comment(&self, snv_report: &Path, lcc: &LowCoverage) -> Result<PathBuf> {
        let outfile = self.outfile(
            snv_report,
            ReportKind::DepthSnvs.suffix(),
            ".low_coverage_comment.txt",
        );
        fs::write(&outfile, format!("{}\n", lcc.comment))?;
        Ok(outfile)
    }

    /// Run every step the sample's files allow
    pub fn process_sample(&self, sample: &str, files: &SampleFiles) -> Result<SampleOutputs> {
        let mut out = SampleOutputs::default();
        let mut variants = None;
        if let Some(report) = &files.variant_report {
            let (tab, xlsx) = self.variant_report_xlsx(report)?;
            out.files.push(xlsx);
            variants = Some(tab);
        }
        match (&files.vcf, &variants) {
            (Some(vcf), Some(tab)) => {
                let split = self.split_vcf(vcf, tab)?;
                out.files.push(split.accepted_file.clone());
                out.files.push(split.rejected_file.clone());
                out.vcf_split = Some(split);
            }
            (Some(_), None) => {
                tracing::warn!(sample, "VCF not split, no variant report");
            }
            _ => {}
        }

        let mut indels = None;
        if let Some(report) = &files.depth_indels {
            let (tab, xlsx) = self.depth_report_xlsx(report)?;
            out.files.push(xlsx);
            indels = Some(tab);
        }
        let mut snvs = None;
        if let Some(report) = &files.depth_snvs {
            let (tab, xlsx) = self.depth_report_xlsx(report)?;
            out.files.push(xlsx);
            snvs = Some(tab);
        }
        if let (Some(indels), Some(snvs), Some(snv_path)) = (&indels, &snvs, &files.depth_snvs) {
            let lcc = self.low_coverage(indels, snvs)?;
            out.files.push(self.write_low_coverage_comment(snv_path, &lcc)?);
            out.low_coverage = Some(lcc);
        }
        Ok(out)
    }
}

fn header_rows(report: &TabReport) -> Vec<RowData> {
    let mut rows: Vec<RowData> = report.header.iter().map(|l| RowData::comment(l)).collect();
    rows.push(RowData::new(report.fields.clone()));
    rows
}

fn sheet_label(outfile: &Path) -> String {
    let name = file_name(outfile);
    name.strip_suffix(".xlsx").unwrap_or(&name).to_string()
}

fn normalize_chrom(chrom: &str) -> String {
    chrom.trim().replace("chr", "")
}

/// `A, B, and C` style list
pub fn gene_list(genes: &[&str]) -> String {
    let joined = genes.join(", ");
    match joined.rsplit_once(", ") {
        Some((head, last)) => format!("{head}, and {last}"),
        None => joined,
    }
}
