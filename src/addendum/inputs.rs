//! Per-sample inputs: GA CSV exports, fusion and CNV calls, special-case comments

use crate::error::StampError;
use crate::tabfile::Record;
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

pub const REQUIRED_COLUMNS: [&str; 4] = ["Chr:ChrPos", "HGVSProtein", "Gene", "Pathogenicity"];
const GA_MARKER: &str = "##Variants Of";
const PIPELINE_MARKER: &str = "Sample Status Change";
const MINUS_STRAND_MIRROR: i64 = 300_000_000;

/// Split a CSV line on commas, rejoining fields that were split inside
/// double quotes. Surrounding quotes are removed.
pub fn split_csv_line(line: &str) -> Vec<String> {
    let mut values: Vec<String> = Vec::new();
    let mut in_quotes = false;
    for part in line.trim_end().split(',') {
        match values.last_mut() {
            Some(last) if in_quotes => {
                last.push(',');
                last.push_str(part);
            }
            _ => values.push(part.to_string()),
        }
        if part.starts_with('"') {
            in_quotes = true;
        }
        if part.ends_with('"') {
            in_quotes = false;
        }
    }
    values
        .into_iter()
        .map(|v| match v.strip_prefix('"').and_then(|s| s.strip_suffix('"')) {
            Some(inner) => inner.to_string(),
            None => v,
        })
        .collect()
}

pub fn severity(pathogenicity: &str) -> u8 {
    match pathogenicity {
        "Pathogenic" => 1,
        "Likely Pathogenic" => 2,
        _ => 3,
    }
}

pub fn is_reportable(pathogenicity: &str) -> bool {
    severity(pathogenicity) < 3
}

/// Key ordering variants by severity, gene, then genomic position
pub fn variant_sort_key(record: &Record, path: &Path) -> Result<String> {
    let chr_pos = record.text("Chr:ChrPos");
    let (chrom, pos) = chr_pos.split_once(':').ok_or_else(|| {
        StampError::bad_format(path, format!("Chr:ChrPos '{chr_pos}' is not chrom:position"))
    })?;
    let chrom = match chrom.parse::<u32>() {
        Ok(n) if chrom.bytes().all(|b| b.is_ascii_digit()) => format!("{n:02}"),
        _ => chrom.to_string(),
    };
    let pos = match (record.text("GeneStrand"), pos.parse::<i64>()) {
        ("-", Ok(p)) => (MINUS_STRAND_MIRROR - p).to_string(),
        _ => pos.to_string(),
    };
    let gene = record.get("Gene").unwrap_or("zzzNone");
    Ok(format!(
        "{} {:<9} {:<2} {:>12} {}",
        severity(record.text("Pathogenicity")),
        gene,
        chrom,
        pos,
        record.text("HGVSProtein")
    ))
}

/// A variant export from the interpretation software
#[derive(Debug, Clone, Default)]
pub struct GaCsv {
    pub path: PathBuf,
    pub fields: Vec<String>,
    pub missing_fields: Vec<String>,
    /// Variants keyed by their sort key
    pub variants: BTreeMap<String, Record>,
    pub pipeline_version: Option<String>,
    /// The file carries the GA export banner
    pub is_ga_export: bool,
}

impl GaCsv {
    pub fn parse<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).with_context(|| format!("cannot open {}", path.display()))?;
        Self::from_reader(path, BufReader::new(file))
    }

    pub fn from_reader<R: BufRead>(path: &Path, reader: R) -> Result<Self> {
        let mut csv = GaCsv {
            path: path.to_path_buf(),
            ..Default::default()
        };
        let mut fields: Option<Vec<String>> = None;
        for line in reader.lines() {
            let line = line?;
            if line.starts_with("##") {
                if line.starts_with(GA_MARKER) {
                    csv.is_ga_export = true;
                }
                continue;
            }
            if line.starts_with('#') && line.contains(REQUIRED_COLUMNS[0]) {
                let header = split_csv_line(line.trim_start_matches('#'));
                csv.missing_fields = REQUIRED_COLUMNS
                    .iter()
                    .filter(|c| !header.iter().any(|h| h.as_str() == **c))
                    .map(|c| c.to_string())
                    .collect();
                if csv.missing_fields.is_empty() {
                    csv.fields = header.clone();
                    fields = Some(header);
                } else {
                    fields = None;
                }
            } else if line.starts_with('#') {
                fields = None;
            } else if line.contains(PIPELINE_MARKER) {
                csv.pipeline_version = split_csv_line(&line).get(1).cloned();
            } else if let Some(fields) = fields.as_ref().filter(|_| line.contains(',')) {
                let values = split_csv_line(&line);
                if values.iter().all(|v| v.is_empty()) {
                    continue;
                }
                let record = Record::from_pairs(fields.iter().cloned().zip(values));
                let key = variant_sort_key(&record, path)?;
                csv.variants.insert(key, record);
            }
        }
        tracing::debug!(
            file = %path.display(),
            variants = csv.variants.len(),
            version = csv.pipeline_version.as_deref().unwrap_or(""),
            "parsed GA CSV"
        );
        Ok(csv)
    }

    pub fn is_valid(&self) -> bool {
        self.missing_fields.is_empty() && !self.fields.is_empty()
    }

    pub fn num_variants(&self) -> usize {
        self.variants.len()
    }

    /// Reason the file cannot be used, if any
    pub fn rejection(&self) -> Option<String> {
        if self.is_valid() {
            None
        } else if self.is_ga_export && !self.missing_fields.is_empty() {
            let missing: Vec<&str> = self.missing_fields.iter().take(3).map(String::as_str).collect();
            Some(format!("Missing required fields: {}", missing.join(", ")))
        } else {
            Some("Not a GA CSV".to_string())
        }
    }

    /// Version number shown in the addendum, the text after the last `v`
    pub fn version_label(&self) -> String {
        match self.pipeline_version.as_deref() {
            Some(version) => version.rsplit('v').next().unwrap_or(version).to_string(),
            None => "unknown".to_string(),
        }
    }
}

/// Read a tab-delimited call file: `#` lines skipped, the first other line
/// is the header.
fn parse_calls(path: &Path) -> Result<Vec<Record>> {
    let file = File::open(path).with_context(|| format!("cannot open {}", path.display()))?;
    let mut fields: Option<Vec<String>> = None;
    let mut records = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line?;
        if line.starts_with('#') {
            continue;
        }
        let values = line.trim_end().split('\t').map(str::to_string);
        if fields.is_none() {
            fields = Some(values.collect());
        } else if let Some(f) = &fields {
            records.push(Record::from_pairs(f.iter().cloned().zip(values)));
        }
    }
    Ok(records)
}

/// Gene fusions from `*.fusions.filtered.txt`
pub fn parse_fusions<P: AsRef<Path>>(path: P) -> Result<Vec<String>> {
    Ok(parse_calls(path.as_ref())?
        .iter()
        .filter(|r| !r.text("Region1").is_empty() && !r.text("Region2").is_empty())
        .map(|r| format!("{}-{}", r.text("Region1"), r.text("Region2")))
        .collect())
}

/// Amplified genes from a `*.cnvs` file
pub fn parse_cnvs<P: AsRef<Path>>(path: P) -> Result<Vec<String>> {
    Ok(parse_calls(path.as_ref())?
        .iter()
        .filter(|r| !r.text("Gene").is_empty() && r.text("Status") == "AMP")
        .map(|r| match r.text("Gene") {
            // CNV calls truncate this gene name
            "NKX2" => "NKX2-1".to_string(),
            gene => gene.to_string(),
        })
        .collect())
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpecialRange {
    pub chrom: String,
    pub start: i64,
    pub end: i64,
    pub comment: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeneSpecialCases {
    /// Exact protein change -> comment
    pub variants: BTreeMap<String, String>,
    pub all: Option<String>,
    pub range: Option<SpecialRange>,
}

/// Genes whose variants get a fixed comment instead of `{change} MUTATION`
#[derive(Debug, Clone, PartialEq)]
pub struct SpecialVariants {
    pub genes: BTreeMap<String, GeneSpecialCases>,
}

impl Default for SpecialVariants {
    fn default() -> Self {
        let mut genes = BTreeMap::new();
        genes.insert(
            "TERT".to_string(),
            GeneSpecialCases {
                all: Some("PROMOTER MUTATION".to_string()),
                ..Default::default()
            },
        );
        Self { genes }
    }
}

impl SpecialVariants {
    /// Load the `Variant`, `Range`, `Gene`, `Comment` table. A missing
    /// file leaves only the built-in TERT rule.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut special = Self::default();
        let Some(path) = path.filter(|p| p.is_file()) else {
            if let Some(p) = path {
                tracing::warn!(file = %p.display(), "special variants file not found");
            }
            return Ok(special);
        };

        let content = std::fs::read_to_string(path).with_context(|| format!("cannot read {}", path.display()))?;
        let mut lines = content.lines();
        let fields: Vec<String> = lines
            .next()
            .unwrap_or("")
            .trim_end()
            .split('\t')
            .map(|f| f.trim().to_string())
            .collect();
        for line in lines {
            let values = line.trim_end().split('\t').map(|v| v.trim().to_string());
            let record = Record::from_pairs(fields.iter().cloned().zip(values));
            let (gene, comment) = (record.text("Gene"), record.text("Comment"));
            if gene.is_empty() || comment.is_empty() {
                continue;
            }
            let cases = special.genes.entry(gene.to_string()).or_default();
            let variant = record.text("Variant");
            if variant == "all" {
                cases.all = Some(comment.to_string());
            } else if !variant.is_empty() {
                cases.variants.insert(variant.to_string(), comment.to_string());
            } else if !record.text("Range").is_empty() {
                cases.range = Some(parse_range(record.text("Range"), comment, path)?);
            }
        }
        Ok(special)
    }

    /// Comment for a variant of `gene`, checking the exact change, then the
    /// gene-wide comment, then the range.
    pub fn comment_for(&self, gene: &str, protein: &str, chr_pos: &str) -> Option<String> {
        let cases = self.genes.get(gene)?;
        if let Some(comment) = cases.variants.get(protein) {
            return Some(comment.clone());
        }
        if let Some(all) = &cases.all {
            return Some(all.clone());
        }
        let range = cases.range.as_ref()?;
        let (chrom, pos) = chr_pos.split_once(':')?;
        let pos: i64 = pos.parse().ok()?;
        (range.chrom == chrom && range.start <= pos && pos <= range.end).then(|| range.comment.clone())
    }

    pub fn has_gene(&self, gene: &str) -> bool {
        self.genes.contains_key(gene)
    }
}

/// `chr5:1295228_1295250`
fn parse_range(range: &str, comment: &str, path: &Path) -> Result<SpecialRange> {
    let bad = || StampError::bad_format(path, format!("range '{range}' is not chrom:start_end"));
    let (chrom, span) = range.split_once(':').ok_or_else(bad)?;
    let (start, end) = span.split_once('_').ok_or_else(bad)?;
    Ok(SpecialRange {
        chrom: chrom.replace("chr", ""),
        start: start.trim().parse().map_err(|_| bad())?,
        end: end.trim().parse().map_err(|_| bad())?,
        comment: comment.to_string(),
    })
}
