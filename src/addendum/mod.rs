//! Pathology report addendums
//!
//! Collects each sample's GA CSV export plus optional fusion and CNV calls
//! and writes one Word document per run, one page per sample, listing the
//! pathogenic and likely pathogenic findings.

pub mod docx;
pub mod inputs;
pub mod protein;

pub use docx::{Document, TextRun};
pub use inputs::{parse_cnvs, parse_fusions, GaCsv, SpecialVariants};
pub use protein::expand_protein_change;

use anyhow::Result;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

const TERT_PROMOTER_NOTE: &str = "is a recurrent mutation in the TERT promoter";
const DEFAULT_OUTFILE: &str = "pathology_addendums.docx";

pub const ADDENDUM_COMMENT: &str = "This addendum is issued to describe the results of next generation sequencing-based mutational profiling using the Stanford Solid Tumor Actionable Mutation Panel (STAMP), version PIPELINE_VERSION.  All variants considered \"pathogenic\" or \"likely pathogenic\" are reported here. For additional details on the variants detected as well as the full list of variants (including variants of uncertain significance) and methodologic details, please see the complete report in EPIC.";

/// Gene (or fusion partners) and the finding printed after it
pub type Finding = (String, String);

/// Reportable variants of one GA CSV, sorted
pub fn compile_csv_variants(csv: &GaCsv, special: &SpecialVariants) -> Vec<Finding> {
    let mut findings = Vec::new();
    for record in csv.variants.values() {
        if !inputs::is_reportable(record.text("Pathogenicity")) {
            continue;
        }
        // some exports prefix the protein change with its transcript
        let protein = record.text("HGVSProtein");
        let protein = protein.rsplit(':').next().unwrap_or(protein);
        let mut gene = record.text("Gene").to_string();

        let mut comment = None;
        if special.has_gene(&gene) {
            comment = special.comment_for(&gene, protein, record.text("Chr:ChrPos"));
        } else if gene == "N/A" && record.text("VariantComment").contains(TERT_PROMOTER_NOTE) {
            gene = "TERT".to_string();
            comment = special.comment_for("TERT", protein, record.text("Chr:ChrPos"));
        }
        let comment = comment.unwrap_or_else(|| format!("{} MUTATION", expand_protein_change(protein)));
        findings.push((gene, comment));
    }
    findings.sort();
    findings
}

pub fn compile_fusion_variants(path: &Path) -> Result<Vec<Finding>> {
    let mut findings: Vec<Finding> = parse_fusions(path)?
        .into_iter()
        .map(|f| (f, "FUSION".to_string()))
        .collect();
    findings.sort();
    Ok(findings)
}

pub fn compile_cnv_variants(path: &Path) -> Result<Vec<Finding>> {
    let mut findings: Vec<Finding> = parse_cnvs(path)?
        .into_iter()
        .map(|g| (g, "AMPLIFICATION".to_string()))
        .collect();
    findings.sort();
    Ok(findings)
}

/// Files found for one sample
#[derive(Debug, Clone, Default)]
pub struct SampleInputs {
    pub csv: Option<GaCsv>,
    pub cnvs: Option<PathBuf>,
    pub fusions: Option<PathBuf>,
}

/// Samples grouped by run directory. Loose samples use an empty path.
pub type RunInputs = BTreeMap<PathBuf, BTreeMap<String, SampleInputs>>;

#[derive(Debug, Clone, PartialEq)]
pub struct BadInput {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InputKind {
    Csv,
    Cnvs,
    Fusions,
}

fn classify(name: &str) -> Option<(InputKind, String)> {
    let lower = name.to_lowercase();
    if lower.ends_with(".csv") {
        let sample = name.replace(".csv", "").replace("_accepted_Report", "");
        Some((InputKind::Csv, sample))
    } else if lower.ends_with(".cnvs") && !lower.ends_with(".tiles.cnvs") && !lower.ends_with(".offtarget.cnvs") {
        Some((InputKind::Cnvs, name.replace(".cnvs", "")))
    } else if lower.ends_with(".fusions.filtered.txt") {
        Some((InputKind::Fusions, name.replace(".fusions.filtered.txt", "")))
    } else {
        None
    }
}

fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = std::fs::read_dir(dir)?
        .map(|e| e.map(|e| e.path()))
        .collect::<std::io::Result<Vec<_>>>()?;
    entries.sort();
    Ok(entries)
}

/// One input file with the directories it was found under
struct FoundFile {
    path: PathBuf,
    /// The directory given on the command line
    top: Option<PathBuf>,
    /// Sub-directory of `top` holding the file
    sample_dir: Option<PathBuf>,
}

/// Group inputs into runs of samples.
///
/// Inputs may be files, directories, or directories of sample directories.
/// Files in a sample directory belong to the run directory above it, as
/// do files directly in a run directory that has sample directories. Anything
/// else is a loose sample in the run with an empty path.
pub fn filter_input(inputs: &[PathBuf]) -> Result<(RunInputs, Vec<BadInput>)> {
    let mut found = Vec::new();
    let mut dirs = Vec::new();
    for input in inputs {
        if input.is_file() {
            found.push(FoundFile {
                path: input.clone(),
                top: None,
                sample_dir: None,
            });
        } else if input.is_dir() {
            dirs.push(input.clone());
        } else {
            tracing::warn!(input = %input.display(), "input not found");
        }
    }

    let mut subdirs = Vec::new();
    for dir in &dirs {
        for entry in sorted_entries(dir)? {
            if entry.is_file() {
                found.push(FoundFile {
                    path: entry,
                    top: Some(dir.clone()),
                    sample_dir: None,
                });
            } else if entry.is_dir() {
                subdirs.push((entry, dir.clone()));
            }
        }
    }
    for (subdir, top) in subdirs {
        for entry in sorted_entries(&subdir)? {
            if entry.is_file() {
                found.push(FoundFile {
                    path: entry,
                    top: Some(top.clone()),
                    sample_dir: Some(subdir.clone()),
                });
            }
        }
    }

    // sample-directory files first so their runs exist before the
    // run-directory files are placed
    found.sort_by(|a, b| {
        let depth = |f: &FoundFile| 2 - f.top.is_some() as u8 - f.sample_dir.is_some() as u8;
        (depth(a), &a.path).cmp(&(depth(b), &b.path))
    });

    let mut runs = RunInputs::new();
    let mut loose: BTreeMap<String, SampleInputs> = BTreeMap::new();
    let mut bad = Vec::new();
    for file in found {
        let name = crate::file_name(&file.path);
        let Some((kind, sample)) = classify(&name) else {
            bad.push(BadInput {
                path: file.path,
                reason: "Not a recognized input file".to_string(),
            });
            continue;
        };

        let csv = match kind {
            InputKind::Csv => {
                let csv = match GaCsv::parse(&file.path) {
                    Ok(csv) => csv,
                    Err(e) => {
                        tracing::warn!(file = %name, "cannot read GA CSV: {e:#}");
                        bad.push(BadInput {
                            path: file.path,
                            reason: format!("{e:#}"),
                        });
                        continue;
                    }
                };
                if let Some(reason) = csv.rejection() {
                    bad.push(BadInput {
                        path: file.path,
                        reason,
                    });
                    continue;
                }
                tracing::info!(variants = csv.num_variants(), file = %name, "GA CSV");
                Some(csv)
            }
            _ => None,
        };

        let run = match (&file.top, &file.sample_dir) {
            (Some(top), Some(_)) => Some(top.clone()),
            (Some(top), None) if runs.contains_key(top) => Some(top.clone()),
            _ => None,
        };
        let target = match run {
            Some(run) => runs.entry(run).or_default().entry(sample).or_default(),
            None => loose.entry(sample).or_default(),
        };
        match kind {
            InputKind::Csv => target.csv = csv,
            InputKind::Cnvs => target.cnvs = Some(file.path),
            InputKind::Fusions => target.fusions = Some(file.path),
        }
    }
    if !loose.is_empty() {
        runs.insert(PathBuf::new(), loose);
    }
    runs.retain(|_, samples| !samples.is_empty());

    for (run, samples) in &runs {
        for (sample, files) in samples {
            tracing::debug!(
                run = %crate::file_name(run),
                sample = %sample,
                csv = files.csv.is_some(),
                cnvs = files.cnvs.is_some(),
                fusions = files.fusions.is_some(),
                "addendum input"
            );
        }
    }
    Ok((runs, bad))
}

/// Names printed on the signature line
#[derive(Debug, Clone)]
pub struct Signatories {
    pub resident: String,
    pub director: String,
    pub signout: String,
}

/// Result of building one run's document
#[derive(Debug, Clone, Default)]
pub struct AddendumSummary {
    pub outfile: PathBuf,
    pub pages: usize,
    pub skipped: Vec<String>,
    /// Samples left out because a fusion or CNV file could not be read
    pub failed: Vec<BadInput>,
}

impl AddendumSummary {
    fn fail_sample(&mut self, sample: &str, path: Option<&Path>, err: anyhow::Error) {
        tracing::warn!(sample, "leaving sample out: {err:#}");
        self.failed.push(BadInput {
            path: path.map(Path::to_path_buf).unwrap_or_default(),
            reason: format!("{err:#}"),
        });
    }
}

/// Default document location for a run
pub fn output_file(run: &Path, samples: &BTreeMap<String, SampleInputs>) -> Option<PathBuf> {
    if !run.as_os_str().is_empty() {
        let label = crate::file_name(run);
        return Some(run.join(format!("pathology_addendums_{label}.docx")));
    }
    let first_csv = samples.values().find_map(|s| s.csv.as_ref())?;
    let csv_dir = first_csv.path.parent().unwrap_or_else(|| Path::new("."));
    let csv_dir = csv_dir.canonicalize().unwrap_or_else(|_| csv_dir.to_path_buf());
    let parent = csv_dir.parent().map(Path::to_path_buf).unwrap_or(csv_dir);
    Some(parent.join(DEFAULT_OUTFILE))
}

/// Build the addendum document for the samples of one run
pub fn build_document(
    samples: &BTreeMap<String, SampleInputs>,
    special: &SpecialVariants,
    names: &Signatories,
) -> Result<(Document, AddendumSummary)> {
    let mut doc = Document::new();
    let mut summary = AddendumSummary::default();

    for (i, (sample, files)) in samples.iter().enumerate() {
        let Some(csv) = &files.csv else {
            tracing::info!("{}) skipping {sample}: no CSV", i + 1);
            summary.skipped.push(sample.clone());
            continue;
        };
        let fusion_findings = match files.fusions.as_deref().map(compile_fusion_variants).transpose() {
            Ok(findings) => findings.unwrap_or_default(),
            Err(e) => {
                summary.fail_sample(sample, files.fusions.as_deref(), e);
                continue;
            }
        };
        let cnv_findings = match files.cnvs.as_deref().map(compile_cnv_variants).transpose() {
            Ok(findings) => findings.unwrap_or_default(),
            Err(e) => {
                summary.fail_sample(sample, files.cnvs.as_deref(), e);
                continue;
            }
        };

        tracing::info!("{}) adding {sample}", i + 1);
        if summary.pages > 0 {
            doc.add_page_break();
        }

        let mut file_list = Vec::new();
        let mut findings = fusion_findings;
        if let Some(fusions) = &files.fusions {
            file_list.push(TextRun::plain(format!("Fusion file: {}", crate::file_name(fusions))).with_break());
        }
        file_list.push(TextRun::plain("CSV file: "));
        file_list.push(TextRun::plain(crate::file_name(&csv.path)).with_break());
        findings.extend(compile_csv_variants(csv, special));
        if let Some(cnvs) = &files.cnvs {
            file_list.push(TextRun::plain(format!("CNV file: {}", crate::file_name(cnvs))).with_break());
        }
        findings.extend(cnv_findings);
        doc.add_paragraph(file_list);

        doc.add_paragraph(vec![
            TextRun::bold("ADDENDUM COMMENT: "),
            TextRun::plain(ADDENDUM_COMMENT.replace("PIPELINE_VERSION", &csv.version_label())).with_break(),
        ]);

        let mut diagnosis = vec![
            TextRun::bold("ADDENDUM DIAGNOSIS:").with_break(),
            TextRun::bold("SPECIMENID, MUTATIONAL PROFILING BY STAMP").with_break(),
        ];
        if findings.is_empty() {
            diagnosis.push(TextRun::plain(
                "\t--\tNO PATHOGENIC OR LIKELY PATHOGENIC VARIANTS DETECTED",
            ));
        }
        for (gene, comment) in &findings {
            diagnosis.push(TextRun::bold("\t--\tPOSITIVE FOR "));
            diagnosis.push(TextRun::bold(gene.as_str()).italic());
            diagnosis.push(TextRun::bold(format!(" {comment}")).with_break());
        }
        doc.add_paragraph(diagnosis);

        doc.add_paragraph(vec![TextRun::bold(format!(
            "{}/{}/{}",
            names.resident, names.director, names.signout
        ))]);
        summary.pages += 1;
    }
    Ok((doc, summary))
}

/// Write one document per run. `outfile` replaces the default location
/// when only one document is produced.
pub fn write_addendums(
    runs: &RunInputs,
    special: &SpecialVariants,
    names: &Signatories,
    outfile: Option<&Path>,
) -> Result<Vec<AddendumSummary>> {
    let mut written = Vec::new();
    for (num, (run, samples)) in runs.iter().enumerate() {
        let Some(default_out) = output_file(run, samples) else {
            tracing::warn!(run = %run.display(), "no GA CSV files, no addendum written");
            continue;
        };
        let out = match outfile {
            Some(path) if runs.len() == 1 => path.to_path_buf(),
            _ => default_out,
        };
        if runs.len() > 1 {
            tracing::info!(report = num + 1, file = %out.display(), "creating report");
        } else {
            tracing::info!(file = %out.display(), "creating report");
        }
        let (doc, mut summary) = build_document(samples, special, names)?;
        doc.save(&out)?;
        summary.outfile = out;
        written.push(summary);
    }
    Ok(written)
}
