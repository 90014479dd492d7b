//! Water control barcode tracking
//!
//! Each run's barcode count file gives the reads assigned to the water
//! control barcode. Counts are stored per run and summarised in a
//! spreadsheet that flags runs where the water share is above the limit.

use crate::db::{now_timestamp, open_db, open_db_in_memory, Schema};
use crate::error::StampError;
use crate::spreadsheet::excel_column;
use anyhow::{Context, Result};
use lazy_static::lazy_static;
use regex::Regex;
use rusqlite::{params, Connection};
use rust_xlsxwriter::{
    Color, ConditionalFormatCell, ConditionalFormatCellRule, Format, FormatBorder, Formula, Workbook,
};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

pub const SHEET_NAME: &str = "Barcode counts";
const FIELDS: [&str; 3] = ["Total reads", "Read count", "Read %"];

lazy_static! {
    static ref ANALYSIS_DIR: Regex = Regex::new(r"([-\w]+)-analysis").unwrap();
    static ref VERSIONED_RUN: Regex = Regex::new(r"(ST\w+\d-\d{3}.*)[\x08.]").unwrap();
    static ref PLAIN_RUN: Regex = Regex::new(r"[\x08_](ST\w{3}\d{2,3}.*)[\x08.]").unwrap();
    static ref SORT_VERSIONED: Regex = Regex::new(r"^(STAMP\d)-(\d{3}.*)").unwrap();
    static ref SORT_PLAIN: Regex = Regex::new(r"^ST...(\d{3}.*)").unwrap();
}

/// Read `barcode count` lines. Lines without exactly two fields are
/// ignored; a count that is not an integer rejects the file.
pub fn parse_barcode_file<P: AsRef<Path>>(path: P) -> Result<BTreeMap<String, u64>> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("cannot open {}", path.display()))?;
    let mut counts = BTreeMap::new();
    for line in BufReader::new(file).lines() {
        let line = line?;
        let fields: Vec<&str> = line.split_whitespace().collect();
        if let &[barcode, count] = fields.as_slice() {
            let count: u64 = count.parse().map_err(|_| {
                StampError::bad_format(path, format!("count '{count}' for {barcode} is not an integer"))
            })?;
            counts.insert(barcode.to_string(), count);
        }
    }
    tracing::debug!(file = %path.display(), barcodes = counts.len(), "parsed barcode file");
    Ok(counts)
}

/// Run name taken from a barcode file's location, `NoName_{index}` when
/// none of the naming patterns match.
pub fn run_name_from_path<P: AsRef<Path>>(path: P, index: usize) -> String {
    let path = path.as_ref();
    let full = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    let full = full.to_string_lossy().replace("stamp", "STAMP");
    let run = [&*ANALYSIS_DIR, &*VERSIONED_RUN, &*PLAIN_RUN]
        .iter()
        .find_map(|re| re.captures(&full).map(|c| c[1].to_string()))
        .unwrap_or_else(|| format!("NoName_{index}"));
    tracing::info!(run = %run, file = %path.display(), "run name");
    run
}

/// Sort key ordering runs by assay version then run number
/// (`STAMP2-225` sorts after `STAMP1` runs such as `STAMP223`).
pub fn stamp_run_sort_key(run_name: &str) -> (String, String, String) {
    if let Some(c) = SORT_VERSIONED.captures(run_name) {
        return (c[1].to_string(), c[2].to_string(), run_name.to_string());
    }
    if let Some(c) = SORT_PLAIN.captures(run_name) {
        return ("STAMP1".to_string(), c[1].to_string(), run_name.to_string());
    }
    (run_name.to_string(), run_name.to_string(), run_name.to_string())
}

/// Water barcode counts for one run
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct WaterRun {
    pub run_name: String,
    pub run_status: String,
    pub total_reads: u64,
    /// Water barcode -> read count
    pub counts: BTreeMap<String, u64>,
}

impl WaterRun {
    pub fn count(&self, barcode: &str) -> u64 {
        self.counts.get(barcode).copied().unwrap_or(0)
    }

    /// Share of reads as a percentage
    pub fn percent(&self, barcode: &str) -> f64 {
        if self.total_reads == 0 {
            0.0
        } else {
            self.count(barcode) as f64 * 100.0 / self.total_reads as f64
        }
    }
}

/// Total reads and water barcode counts for one barcode file.
/// A water barcode absent from the file counts as zero reads.
pub fn analyze<'a, I>(run_name: &str, status: &str, counts: &BTreeMap<String, u64>, water_barcodes: I) -> WaterRun
where
    I: IntoIterator<Item = &'a String>,
{
    let run = WaterRun {
        run_name: run_name.to_string(),
        run_status: status.to_string(),
        total_reads: counts.values().sum(),
        counts: water_barcodes
            .into_iter()
            .map(|bc| (bc.clone(), counts.get(bc).copied().unwrap_or(0)))
            .collect(),
    };
    for barcode in run.counts.keys() {
        let percent = run.percent(barcode);
        if percent > 1.0 {
            tracing::warn!(run = run_name, barcode = %barcode, percent, "high water barcode share");
        } else {
            tracing::debug!(run = run_name, barcode = %barcode, percent, "water barcode share");
        }
    }
    run
}

#[derive(Debug, Clone, PartialEq)]
pub struct WaterRunRow {
    pub id: i64,
    pub run_name: String,
    pub run_status: String,
    pub total_reads: i64,
    pub last_modified: String,
}

pub struct WaterStore {
    conn: Connection,
}

impl WaterStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let (conn, is_new) = open_db(path.as_ref(), Schema::WaterBarcode)?;
        if is_new {
            tracing::info!(db = %path.as_ref().display(), "created water barcode database");
        }
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            conn: open_db_in_memory(Schema::WaterBarcode)?,
        })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn runs(&self, status: Option<&str>) -> Result<Vec<WaterRunRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, run_name, run_status, total_reads, last_modified FROM run \
             WHERE ?1 IS NULL OR run_status = ?1 ORDER BY run_name",
        )?;
        let rows = stmt
            .query_map([status], |row| {
                Ok(WaterRunRow {
                    id: row.get(0)?,
                    run_name: row.get(1)?,
                    run_status: row.get(2)?,
                    total_reads: row.get(3)?,
                    last_modified: row.get(4)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Insert or update runs by name with their barcode counts.
    /// An existing run keeps its id. Returns the number of runs saved.
    pub fn save_runs(&mut self, runs: &[WaterRun], status: &str) -> Result<usize> {
        let mut ordered: Vec<&WaterRun> = runs.iter().collect();
        ordered.sort_by_key(|r| stamp_run_sort_key(&r.run_name));

        let tx = self.conn.transaction()?;
        for run in &ordered {
            let now = now_timestamp();
            tx.execute(
                "INSERT INTO run (run_name, run_status, total_reads, last_modified) VALUES (?1, ?2, ?3, ?4) \
                 ON CONFLICT(run_name) DO UPDATE SET run_status = excluded.run_status, \
                 total_reads = excluded.total_reads, last_modified = excluded.last_modified",
                params![run.run_name, status, run.total_reads as i64, now],
            )?;
            let run_id: i64 = tx.query_row("SELECT id FROM run WHERE run_name = ?1", [&run.run_name], |row| {
                row.get(0)
            })?;
            for (barcode, count) in &run.counts {
                tx.execute("INSERT OR IGNORE INTO barcode (barcode) VALUES (?1)", [barcode])?;
                let barcode_id: i64 =
                    tx.query_row("SELECT id FROM barcode WHERE barcode = ?1", [barcode], |row| row.get(0))?;
                tx.execute(
                    "INSERT OR REPLACE INTO barcode_counts (run_id, barcode_id, bc_count, last_modified) \
                     VALUES (?1, ?2, ?3, ?4)",
                    params![run_id, barcode_id, *count as i64, now],
                )?;
            }
        }
        tx.commit()?;
        tracing::info!(runs = ordered.len(), status, "saved water barcode runs");
        Ok(ordered.len())
    }

    /// Runs with the given status and their stored barcode counts
    pub fn run_data(&self, status: Option<&str>) -> Result<BTreeMap<String, WaterRun>> {
        let mut stmt = self.conn.prepare(
            "SELECT b.barcode, bc.bc_count FROM barcode_counts bc JOIN barcode b ON b.id = bc.barcode_id \
             WHERE bc.run_id = ?1",
        )?;
        let mut data = BTreeMap::new();
        for row in self.runs(status)? {
            let counts = stmt
                .query_map([row.id], |r| Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)? as u64)))?
                .collect::<rusqlite::Result<BTreeMap<_, _>>>()?;
            data.insert(
                row.run_name.clone(),
                WaterRun {
                    run_name: row.run_name,
                    run_status: row.run_status,
                    total_reads: row.total_reads as u64,
                    counts,
                },
            );
        }
        Ok(data)
    }

    /// Status lines shown at startup
    pub fn summary_lines<'a, I>(&self, water_barcodes: I) -> Result<Vec<String>>
    where
        I: IntoIterator<Item = &'a String>,
    {
        let barcodes: Vec<&str> = water_barcodes.into_iter().map(String::as_str).collect();
        Ok(vec![
            format!("Water barcode: {}", barcodes.join(", ")),
            format!("    {} runs saved", self.runs(Some("PASS"))?.len()),
        ])
    }
}

/// Write the "Barcode counts" sheet for the PASS runs in `runs`, newest
/// first. Returns the number of runs written.
pub fn write_water_spreadsheet<P: AsRef<Path>>(
    runs: &BTreeMap<String, WaterRun>,
    water_barcodes: &[String],
    limit: f64,
    path: P,
) -> Result<usize> {
    let path = path.as_ref();
    let mut good: Vec<&WaterRun> = runs.values().filter(|r| r.run_status == "PASS").collect();
    good.sort_by_key(|r| std::cmp::Reverse(stamp_run_sort_key(&r.run_name)));
    tracing::info!(file = %path.display(), runs = good.len(), "writing water barcode spreadsheet");

    let bold = Format::new().set_bold();
    let percent = Format::new().set_num_format("0.0000%");
    let red = Format::new()
        .set_background_color(Color::RGB(0xC58886))
        .set_border(FormatBorder::Thin)
        .set_border_color(Color::RGB(0xCDCDCD));

    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name(SHEET_NAME)?;

    worksheet.write_string(
        0,
        0,
        "# This spreadsheet is automatically generated. Any edits will be lost in future versions.",
    )?;
    worksheet.write_string(1, 0, format!("# Num runs in spreadsheet: {}", good.len()))?;

    let barcode_row = 3;
    let field_row = 4;
    let width = FIELDS.len() as u16;
    worksheet.write_string_with_format(field_row, 0, "Runs", &bold)?;
    for (i, barcode) in water_barcodes.iter().enumerate() {
        let first = width * i as u16 + 1;
        worksheet.merge_range(barcode_row, first, barcode_row, first + width - 1, barcode, &bold)?;
        for (j, field) in FIELDS.iter().enumerate() {
            worksheet.write_string_with_format(field_row, first + j as u16, *field, &bold)?;
        }
    }
    let first_data_row = field_row + 1;
    worksheet.set_freeze_panes(first_data_row, 0)?;

    let mut row = first_data_row;
    for run in &good {
        worksheet.write_string(row, 0, &run.run_name)?;
        for (i, barcode) in water_barcodes.iter().enumerate() {
            let total_col = width * i as u16 + 1;
            let count = run.count(barcode);
            worksheet.write_number(row, total_col, run.total_reads as f64)?;
            worksheet.write_number(row, total_col + 1, count as f64)?;
            let share = if run.total_reads == 0 {
                0.0
            } else {
                count as f64 / run.total_reads as f64
            };
            let formula = Formula::new(format!(
                "={}{r}/{}{r}",
                excel_column(total_col as usize + 1),
                excel_column(total_col as usize),
                r = row + 1
            ))
            .set_result(share.to_string());
            worksheet.write_formula_with_format(row, total_col + 2, formula, &percent)?;
        }
        row += 1;
    }

    if !good.is_empty() {
        let high = ConditionalFormatCell::new()
            .set_rule(ConditionalFormatCellRule::GreaterThan(limit))
            .set_format(&red);
        for i in 0..water_barcodes.len() {
            let col = width * i as u16 + 3;
            worksheet.add_conditional_format(first_data_row, col, row - 1, col, &high)?;
        }
    }
    worksheet.set_row_hidden(0)?;
    workbook.save(path)?;
    Ok(good.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn water() -> Vec<String> {
        vec!["NNNNGTCA".to_string()]
    }

    #[test]
    fn test_parse_barcode_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("barcode_counts.txt");
        std::fs::write(&path, "NNNNGTCA 50\nNNNNACGT\t9950\nheader line here\n\n").unwrap();
        let counts = parse_barcode_file(&path).unwrap();
        assert_eq!(counts.len(), 2);
        assert_eq!(counts["NNNNACGT"], 9950);

        std::fs::write(&path, "NNNNGTCA lots\n").unwrap();
        let err = parse_barcode_file(&path).unwrap_err();
        assert!(err.to_string().contains("not an integer"));
    }

    #[test]
    fn test_run_name_from_path() {
        let name = |p: &str| run_name_from_path(Path::new(p), 3);
        assert_eq!(name("/data/STAMP2-225-analysis/barcode_counts.txt"), "STAMP2-225");
        assert_eq!(name("/data/runs/stamp2-301_rerun.barcodes.txt"), "STAMP2-301_rerun.barcodes");
        assert_eq!(name("/data/runs/run_STAMP223.txt"), "STAMP223");
        assert_eq!(name("/data/runs/counts.txt"), "NoName_3");
    }

    #[test]
    fn test_sort_key() {
        let mut runs = vec!["STAMP2-225", "STAMP223", "STAMP2-101", "other"];
        runs.sort_by_key(|r| stamp_run_sort_key(r));
        assert_eq!(runs, vec!["STAMP223", "STAMP2-101", "STAMP2-225", "other"]);
        assert_eq!(
            stamp_run_sort_key("STAMP223"),
            ("STAMP1".to_string(), "223".to_string(), "STAMP223".to_string())
        );
    }

    #[test]
    fn test_analyze_absent_barcode() {
        let counts: BTreeMap<String, u64> = [("NNNNACGT".to_string(), 1000)].into_iter().collect();
        let run = analyze("STAMP223", "PASS", &counts, &water());
        assert_eq!(run.total_reads, 1000);
        assert_eq!(run.count("NNNNGTCA"), 0);
        assert_eq!(run.percent("NNNNGTCA"), 0.0);

        let counts: BTreeMap<String, u64> = [("NNNNACGT".to_string(), 990), ("NNNNGTCA".to_string(), 10)]
            .into_iter()
            .collect();
        let run = analyze("STAMP224", "PASS", &counts, &water());
        assert!((run.percent("NNNNGTCA") - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_store_upsert_keeps_id() {
        let mut store = WaterStore::open_in_memory().unwrap();
        let counts: BTreeMap<String, u64> = [("NNNNGTCA".to_string(), 5), ("NNNNACGT".to_string(), 995)]
            .into_iter()
            .collect();
        let run = analyze("STAMP223", "PASS", &counts, &water());
        assert_eq!(store.save_runs(&[run.clone()], "PASS").unwrap(), 1);
        let id = store.runs(None).unwrap()[0].id;

        let mut rerun = run.clone();
        rerun.counts.insert("NNNNGTCA".to_string(), 7);
        store.save_runs(&[rerun], "FAIL").unwrap();
        let rows = store.runs(None).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, id);
        assert_eq!(rows[0].run_status, "FAIL");
        assert!(store.runs(Some("PASS")).unwrap().is_empty());

        let data = store.run_data(Some("FAIL")).unwrap();
        assert_eq!(data["STAMP223"].count("NNNNGTCA"), 7);
        assert_eq!(data["STAMP223"].total_reads, 1000);

        let lines = store.summary_lines(&water()).unwrap();
        assert_eq!(lines, vec!["Water barcode: NNNNGTCA", "    0 runs saved"]);
    }
}
