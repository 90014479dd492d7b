//! Index-read barcode counting
//!
//! STAMP runs demultiplex on the last four bases of the 8-base index read,
//! so by default only that sub-barcode is counted and displayed padded with
//! `NNNN`. Runs with a SampleSheet count the full index sequence.
//!
//! `BarcodeCounter::count` takes a `stop` flag for embedding callers that
//! cancel counting from another thread; the command-line tool never sets it.

use crate::fastq::FastqReader;
use crate::{with_commas, BarcodeCountStats, BarcodeShare};
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

/// The demultiplexing sub-barcode of an 8-base index read
pub fn sub_barcode(barcode: &str) -> &str {
    let end = barcode.len().min(8);
    let start = 4.min(end);
    barcode.get(start..end).unwrap_or("")
}

pub fn pad_with_ns(sub: &str) -> String {
    format!("NNNN{sub}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarcodeMode {
    /// Count `seq[4..8]`
    Stamp,
    /// Count the whole index sequence
    Full,
}

/// Read a `sample<TAB>barcode` file into barcode -> sample
pub fn parse_sample2barcode<P: AsRef<Path>>(path: P) -> Result<HashMap<String, String>> {
    let path = path.as_ref();
    let content =
        fs::read_to_string(path).with_context(|| format!("cannot read {}", path.display()))?;
    let mut labels = HashMap::new();
    for line in content.lines() {
        let mut parts = line.trim_end().split('\t');
        if let (Some(sample), Some(barcode)) = (parts.next(), parts.next()) {
            labels.insert(barcode.trim().to_string(), sample.trim().to_string());
        }
    }
    Ok(labels)
}

/// Read an Illumina SampleSheet CSV into index -> Sample_Name
pub fn parse_samplesheet_csv<P: AsRef<Path>>(path: P) -> Result<HashMap<String, String>> {
    let path = path.as_ref();
    let content =
        fs::read_to_string(path).with_context(|| format!("cannot read {}", path.display()))?;
    let mut labels = HashMap::new();
    let mut columns: Option<(usize, usize)> = None;
    for line in content.lines() {
        let vals: Vec<&str> = line.trim_end().split(',').collect();
        match columns {
            None => {
                let name = vals.iter().position(|v| *v == "Sample_Name");
                let index = vals.iter().position(|v| *v == "index");
                if let (Some(name), Some(index)) = (name, index) {
                    columns = Some((name, index));
                }
            }
            Some((name, index)) => {
                if let (Some(sample), Some(barcode)) = (vals.get(name), vals.get(index)) {
                    if !barcode.is_empty() {
                        labels.insert(barcode.to_string(), sample.to_string());
                    }
                }
            }
        }
    }
    Ok(labels)
}

/// Running barcode tally
#[derive(Debug, Clone)]
pub struct BarcodeCounts {
    pub mode: BarcodeMode,
    pub total_reads: u64,
    pub counts: HashMap<String, u64>,
}

impl BarcodeCounts {
    pub fn new(mode: BarcodeMode) -> Self {
        Self {
            mode,
            total_reads: 0,
            counts: HashMap::new(),
        }
    }

    pub fn add(&mut self, index_seq: &str) {
        let key = match self.mode {
            BarcodeMode::Stamp => sub_barcode(index_seq),
            BarcodeMode::Full => index_seq,
        };
        *self.counts.entry(key.to_string()).or_insert(0) += 1;
        self.total_reads += 1;
    }

    /// Barcodes by descending count, ties by barcode
    pub fn sorted(&self) -> Vec<(&str, u64)> {
        let mut sorted: Vec<(&str, u64)> = self
            .counts
            .iter()
            .map(|(k, v)| (k.as_str(), *v))
            .collect();
        sorted.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        sorted
    }

    pub fn display_barcode(&self, key: &str) -> String {
        match self.mode {
            BarcodeMode::Stamp => pad_with_ns(key),
            BarcodeMode::Full => key.to_string(),
        }
    }

    /// Top barcodes with their share of reads and sample labels
    pub fn shares(&self, limit: Option<usize>, labels: &HashMap<String, String>) -> Vec<BarcodeShare> {
        self.sorted()
            .into_iter()
            .take(limit.unwrap_or(usize::MAX))
            .map(|(key, count)| {
                let barcode = self.display_barcode(key);
                let percent = if self.total_reads > 0 {
                    count as f64 * 100.0 / self.total_reads as f64
                } else {
                    0.0
                };
                let label = labels.get(&barcode).or_else(|| labels.get(key)).cloned();
                BarcodeShare {
                    barcode,
                    count,
                    percent,
                    label,
                }
            })
            .collect()
    }

    /// Text report; `limit = None` lists every barcode
    pub fn report(&self, limit: Option<usize>, labels: &HashMap<String, String>) -> String {
        let mut msg = format!("Number of reads: {}\n", with_commas(self.total_reads));
        msg.push_str(&format!("Number of unique barcodes: {}\n\n", self.counts.len()));
        for share in self.shares(limit, labels) {
            msg.push_str(&format!(
                "{}\t{:8}\t{:.2}%",
                share.barcode, share.count, share.percent
            ));
            if let Some(label) = share.label {
                msg.push('\t');
                msg.push_str(&label);
            }
            msg.push('\n');
        }
        msg
    }

    pub fn stats(
        &self,
        index_file: &Path,
        limit: Option<usize>,
        labels: &HashMap<String, String>,
    ) -> BarcodeCountStats {
        BarcodeCountStats {
            index_file: index_file.display().to_string(),
            stamp_mode: self.mode == BarcodeMode::Stamp,
            total_reads: self.total_reads,
            unique_barcodes: self.counts.len(),
            top_barcodes: self.shares(limit, labels),
        }
    }
}

/// Streams an index FASTQ and tallies barcodes
pub struct BarcodeCounter {
    pub mode: BarcodeMode,
    pub progress_interval: u64,
}

impl Default for BarcodeCounter {
    fn default() -> Self {
        Self {
            mode: BarcodeMode::Stamp,
            progress_interval: 500_000,
        }
    }
}

impl BarcodeCounter {
    pub fn new(mode: BarcodeMode, progress_interval: u64) -> Self {
        Self {
            mode,
            progress_interval: progress_interval.max(1),
        }
    }

    /// Count barcodes in `index_fastq`. `on_progress` sees the tally every
    /// `progress_interval` reads; counting stops early once `stop` is set.
    pub fn count<P, F>(&self, index_fastq: P, stop: &AtomicBool, mut on_progress: F) -> Result<BarcodeCounts>
    where
        P: AsRef<Path>,
        F: FnMut(&BarcodeCounts),
    {
        let mut counts = BarcodeCounts::new(self.mode);
        for record in FastqReader::from_path(index_fastq)? {
            let record = record?;
            counts.add(&record.seq);
            if counts.total_reads % self.progress_interval == 0 {
                on_progress(&counts);
            }
            if stop.load(Ordering::Relaxed) {
                tracing::info!(reads = counts.total_reads, "barcode counting stopped");
                break;
            }
        }
        Ok(counts)
    }
}

/// Check that an input file exists and can be opened
pub fn check_infile<P: AsRef<Path>>(path: P) -> Result<()> {
    let path = path.as_ref();
    if !path.exists() {
        anyhow::bail!("File {} not found", path.display());
    }
    fs::File::open(path).with_context(|| format!("File {} not readable", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sub_barcode() {
        assert_eq!(sub_barcode("ACGTGTCA"), "GTCA");
        assert_eq!(sub_barcode("ACGTGTCAAA"), "GTCA");
        assert_eq!(sub_barcode("ACGTGT"), "GT");
        assert_eq!(sub_barcode("ACG"), "");
        assert_eq!(pad_with_ns("GTCA"), "NNNNGTCA");
    }

    #[test]
    fn test_report_stamp_mode() {
        let mut counts = BarcodeCounts::new(BarcodeMode::Stamp);
        for _ in 0..3 {
            counts.add("AAAAGTCA");
        }
        counts.add("CCCCGTCA");
        counts.add("AAAATTTT");

        let mut labels = HashMap::new();
        labels.insert("GTCA".to_string(), "water".to_string());

        let report = counts.report(None, &labels);
        let lines: Vec<&str> = report.lines().collect();
        assert_eq!(lines[0], "Number of reads: 5");
        assert_eq!(lines[1], "Number of unique barcodes: 2");
        assert_eq!(lines[2], "");
        assert_eq!(lines[3], "NNNNGTCA\t       4\t80.00%\twater");
        assert_eq!(lines[4], "NNNNTTTT\t       1\t20.00%");
    }

    #[test]
    fn test_report_limit_and_full_mode() {
        let mut counts = BarcodeCounts::new(BarcodeMode::Full);
        counts.add("ACGTACGT");
        counts.add("ACGTACGT");
        counts.add("TTTTACGT");

        let mut labels = HashMap::new();
        labels.insert("TTTTACGT".to_string(), "S2".to_string());
        let report = counts.report(Some(1), &HashMap::new());
        assert_eq!(report.lines().count(), 4);
        assert!(report.contains("ACGTACGT\t       2\t66.67%"));

        let shares = counts.shares(None, &labels);
        assert_eq!(shares[1].label.as_deref(), Some("S2"));
    }

    #[test]
    fn test_label_by_padded_barcode() {
        let mut counts = BarcodeCounts::new(BarcodeMode::Stamp);
        counts.add("ACGTGTCA");
        let mut labels = HashMap::new();
        labels.insert("NNNNGTCA".to_string(), "TruQ3_305".to_string());
        let shares = counts.shares(None, &labels);
        assert_eq!(shares[0].label.as_deref(), Some("TruQ3_305"));
    }

    #[test]
    fn test_parse_label_files() {
        let dir = tempfile::tempdir().unwrap();
        let s2b = dir.path().join("sample2barcode.txt");
        fs::write(&s2b, "TruQ3_305\tGTCA\nSmithJ_123_456\tACGT\nnotab\n").unwrap();
        let labels = parse_sample2barcode(&s2b).unwrap();
        assert_eq!(labels.len(), 2);
        assert_eq!(labels["GTCA"], "TruQ3_305");

        let sheet = dir.path().join("SampleSheet.csv");
        fs::write(
            &sheet,
            "[Header]\nIEMFileVersion,4\n[Data]\nSample_ID,Sample_Name,index\n1,S1,ACGTACGT\n2,S2,TTTTACGT\n",
        )
        .unwrap();
        let labels = parse_samplesheet_csv(&sheet).unwrap();
        assert_eq!(labels.len(), 2);
        assert_eq!(labels["TTTTACGT"], "S2");
    }

    #[test]
    fn test_counter_with_stop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run_I1_001.fastq");
        let text: String = (0..10)
            .map(|i| format!("@r{i}\nAAAAGTCA\n+\nIIIIIIII\n"))
            .collect();
        fs::write(&path, text).unwrap();

        let counter = BarcodeCounter::new(BarcodeMode::Stamp, 4);
        let stop = AtomicBool::new(false);
        let mut seen = Vec::new();
        let counts = counter
            .count(&path, &stop, |c| seen.push(c.total_reads))
            .unwrap();
        assert_eq!(counts.total_reads, 10);
        assert_eq!(counts.counts["GTCA"], 10);
        assert_eq!(seen, vec![4, 8]);

        let stop = AtomicBool::new(true);
        let counts = counter.count(&path, &stop, |_| {}).unwrap();
        assert_eq!(counts.total_reads, 1);
    }

    #[test]
    fn test_check_infile() {
        assert!(check_infile("/nonexistent/I1.fastq.gz").is_err());
    }
}
