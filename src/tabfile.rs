//! Tab-delimited pipeline reports
//!
//! Variant, depth and truth reports share one layout: `#` comment lines,
//! one column-header line, then data rows.

use crate::error::StampError;
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// A parsed tab-delimited report
#[derive(Debug, Clone, Default)]
pub struct TabReport {
    pub path: PathBuf,
    /// `#` lines, trailing whitespace removed
    pub header: Vec<String>,
    pub fields: Vec<String>,
    pub rows: Vec<Vec<String>>,
    /// Every line in the file, including comments and blanks
    pub num_lines: usize,
}

impl TabReport {
    pub fn parse<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).with_context(|| format!("cannot open {}", path.display()))?;
        Self::from_reader(path, BufReader::new(file))
    }

    pub fn from_reader<R: BufRead>(path: &Path, reader: R) -> Result<Self> {
        let mut report = TabReport {
            path: path.to_path_buf(),
            ..Default::default()
        };
        for line in reader.lines() {
            let line = line?;
            report.num_lines += 1;
            let line = line.trim_end();
            if line.starts_with('#') {
                report.header.push(line.to_string());
            } else if report.fields.is_empty() {
                report.fields = split_tabs(line);
            } else {
                report.rows.push(split_tabs(line));
            }
        }
        Ok(report)
    }

    /// Index of a required column
    pub fn column(&self, name: &str) -> Result<usize> {
        self.column_any(&[name])
    }

    /// Index of the first of `names` present in the header
    pub fn column_any(&self, names: &[&str]) -> Result<usize> {
        names
            .iter()
            .find_map(|name| self.fields.iter().position(|f| f == name))
            .ok_or_else(|| StampError::missing_column(&self.path, names[0]).into())
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f == name)
    }

    /// Integer value of `col` in `row`, failing with the file and line
    pub fn int_value(&self, row: &[String], col: usize) -> Result<i64> {
        let value = cell(row, col);
        value.trim().parse::<i64>().map_err(|_| {
            StampError::bad_format(
                &self.path,
                format!("expected an integer in column '{}', found '{value}'", self.fields[col]),
            )
            .into()
        })
    }
}

/// Value at `col`, or empty when the row is short
pub fn cell(row: &[String], col: usize) -> &str {
    row.get(col).map(String::as_str).unwrap_or("")
}

fn split_tabs(line: &str) -> Vec<String> {
    line.split('\t').map(str::to_string).collect()
}

/// One row of a report addressed by column name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    values: BTreeMap<String, String>,
}

impl Record {
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.values.get(field).map(String::as_str)
    }

    /// Value of `field`, empty when absent
    pub fn text(&self, field: &str) -> &str {
        self.get(field).unwrap_or("")
    }

    pub fn set(&mut self, field: &str, value: impl Into<String>) {
        self.values.insert(field.to_string(), value.into());
    }

    pub fn remove(&mut self, field: &str) -> Option<String> {
        self.values.remove(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.values.contains_key(field)
    }
}

/// A report whose header has been mapped through a field-name function
#[derive(Debug, Clone, Default)]
pub struct KeyedTable {
    pub path: PathBuf,
    pub header: Vec<String>,
    pub fields: Vec<String>,
    pub records: Vec<Record>,
}

impl KeyedTable {
    pub fn parse<P, F>(path: P, field_fn: F) -> Result<Self>
    where
        P: AsRef<Path>,
        F: Fn(&str) -> String,
    {
        let report = TabReport::parse(path)?;
        Ok(Self::from_report(report, field_fn))
    }

    pub fn from_report<F>(report: TabReport, field_fn: F) -> Self
    where
        F: Fn(&str) -> String,
    {
        let fields: Vec<String> = report.fields.iter().map(|f| field_fn(f)).collect();
        let records = report
            .rows
            .iter()
            .filter(|row| row.iter().any(|v| !v.is_empty()))
            .map(|row| Record::from_pairs(fields.iter().cloned().zip(row.iter().cloned())))
            .collect();
        Self {
            path: report.path,
            header: report.header,
            fields,
            records,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const REPORT: &str = "# Sample: s1\n# Run: 305\nChr\tPosition\tMin Depth\nchr1\t100\t250  \nchr2\t200\t150\n";

    #[test]
    fn test_parse_report() {
        let report = TabReport::from_reader(Path::new("r.txt"), Cursor::new(REPORT)).unwrap();
        assert_eq!(report.header, vec!["# Sample: s1", "# Run: 305"]);
        assert_eq!(report.fields, vec!["Chr", "Position", "Min Depth"]);
        assert_eq!(report.rows.len(), 2);
        assert_eq!(report.rows[0][2], "250");
        assert_eq!(report.num_lines, 5);
    }

    #[test]
    fn test_column_lookup() {
        let report = TabReport::from_reader(Path::new("r.txt"), Cursor::new(REPORT)).unwrap();
        assert_eq!(report.column_any(&["Min_Depth", "Min Depth"]).unwrap(), 2);
        let err = report.column("Status").unwrap_err();
        let err = err.downcast::<StampError>().unwrap();
        assert!(matches!(err, StampError::MissingColumn { .. }));
    }

    #[test]
    fn test_int_value_error() {
        let report = TabReport::from_reader(
            Path::new("r.txt"),
            Cursor::new("Chr\tMin Depth\nchr1\tlots\n"),
        )
        .unwrap();
        let err = report.int_value(&report.rows[0], 1).unwrap_err();
        assert!(err.to_string().contains("found 'lots'"));
    }

    #[test]
    fn test_keyed_table() {
        let report = TabReport::from_reader(
            Path::new("r.txt"),
            Cursor::new("Gene\tCDS Change\nKRAS\tc.35G>A\n\t\n"),
        )
        .unwrap();
        let table = KeyedTable::from_report(report, |f| f.replace(' ', "_"));
        assert_eq!(table.fields, vec!["Gene", "CDS_Change"]);
        assert_eq!(table.records.len(), 1);
        assert_eq!(table.records[0].text("CDS_Change"), "c.35G>A");
        assert_eq!(table.records[0].text("missing"), "");
    }
}
