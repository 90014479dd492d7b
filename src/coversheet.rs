//! STAMP coversheet to sample2barcode conversion
//!
//! A coversheet is the lab's Excel submission form. Somewhere above the
//! sample table is a line naming the run (`STAMP 305`, `Stamp ID: 12b`),
//! then a column-header row with `Name`, `lab#`, `mrn#` and `barcode`.

use anyhow::{Context, Result};
use calamine::{open_workbook_auto, Data, Reader};
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

lazy_static! {
    static ref STAMP_RUN: Regex =
        Regex::new(r"(?i)stamp\s*[id:\s]*[\s_]*(\d+)([a-z]*)[\s_]*\b").unwrap();
    static ref TRUQ3: Regex = Regex::new(r"(?i)^tr?u?q.?3").unwrap();
    static ref MOLT4: Regex = Regex::new(r"(?i)^molt4").unwrap();
    static ref HD753: Regex = Regex::new(r"(?i)^hd753").unwrap();
    static ref CAPITALISED_WORD: Regex = Regex::new(r"([A-Z])[a-z]*").unwrap();
    static ref SPACES_COMMAS: Regex = Regex::new(r"[\s,]+").unwrap();
    static ref NON_NAME_CHARS: Regex = Regex::new(r"[^-A-Za-z0-9_]").unwrap();
}

/// A row of cell values; `None` is an empty cell
pub type SheetRow = Vec<Option<String>>;

/// Parsed coversheet
#[derive(Debug, Clone, Default)]
pub struct Coversheet {
    pub path: PathBuf,
    pub run_number: Option<String>,
    pub fields: Vec<String>,
    pub samples: Vec<HashMap<String, String>>,
}

impl Coversheet {
    /// Load an `.xlsx` coversheet (first sheet), or a tab/comma delimited
    /// text export of one.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        let rows = match ext.as_str() {
            "csv" => read_delimited(path, ',')?,
            "txt" | "tsv" => read_delimited(path, '\t')?,
            _ => read_xlsx(path)?,
        };
        Ok(Self::from_rows(path, rows))
    }

    pub fn from_rows(path: &Path, rows: Vec<SheetRow>) -> Self {
        let mut sheet = Coversheet {
            path: path.to_path_buf(),
            ..Default::default()
        };
        for mut cells in rows {
            while matches!(cells.last(), Some(None)) {
                cells.pop();
            }
            let texts: Vec<&str> = cells.iter().map(|c| c.as_deref().unwrap_or("")).collect();
            if !sheet.fields.is_empty() && !cells.is_empty() {
                let record: HashMap<String, String> = sheet
                    .fields
                    .iter()
                    .zip(cells.iter())
                    .filter_map(|(f, c)| c.as_ref().map(|c| (f.clone(), c.clone())))
                    .collect();
                let has = |k: &str| record.get(k).is_some_and(|v| !v.trim().is_empty());
                if has("Name") && has("barcode") {
                    sheet.samples.push(record);
                }
            } else if ["Name", "lab#", "mrn#"].iter().all(|k| texts.contains(k)) {
                sheet.fields = texts.iter().map(|s| s.to_string()).collect();
            } else if let Some(caps) = STAMP_RUN.captures(&texts.join("\t")) {
                if let Ok(num) = caps[1].parse::<u64>() {
                    let mut run = format!("{num:03}");
                    let suffix = &caps[2];
                    if !suffix.is_empty() && suffix.len() < 5 {
                        run.push_str(suffix);
                    }
                    sheet.run_number = Some(run);
                }
            }
        }
        sheet
    }

    /// Whether a sample table header was found
    pub fn is_recognized(&self) -> bool {
        !self.fields.is_empty()
    }

    /// `(sample, barcode)` pairs with lab naming rules applied
    pub fn sample2barcode(&self) -> Vec<(String, String)> {
        let mut seen: HashMap<String, usize> = HashMap::new();
        let mut pairs = Vec::with_capacity(self.samples.len());
        for record in &self.samples {
            let field = |k: &str| record.get(k).map(|v| v.trim().to_string()).unwrap_or_default();
            let mut sample = sample_name(
                record.get("Name").map(String::as_str).unwrap_or(""),
                &field("lab#"),
                &field("mrn#"),
                self.run_number.as_deref(),
            );
            if let Some(n) = seen.get_mut(&sample) {
                *n += 1;
                sample = format!("{sample}-{n}");
            }
            seen.insert(sample.clone(), 1);
            tracing::debug!(sample = %sample, name = %field("Name"), "coversheet sample");
            pairs.push((sample, field("barcode")));
        }
        pairs
    }

    /// `sample2barcode_STAMP<run>.txt` in `outdir`, else next to the coversheet
    pub fn output_path(&self, outdir: Option<&Path>) -> PathBuf {
        let dir = outdir
            .map(Path::to_path_buf)
            .or_else(|| self.path.parent().map(Path::to_path_buf))
            .unwrap_or_default();
        match &self.run_number {
            Some(run) => dir.join(format!("sample2barcode_STAMP{run}.txt")),
            None => dir.join("sample2barcode.txt"),
        }
    }

    /// Write the sample2barcode file and return the number of samples
    pub fn write_sample2barcode<P: AsRef<Path>>(&self, outfile: P) -> Result<usize> {
        let pairs = self.sample2barcode();
        let mut content = String::new();
        for (sample, barcode) in &pairs {
            content.push_str(&format!("{sample}\t{barcode}\n"));
        }
        fs::write(outfile.as_ref(), content)
            .with_context(|| format!("cannot write {}", outfile.as_ref().display()))?;
        Ok(pairs.len())
    }
}

/// Sample name for one coversheet entry
pub fn sample_name(name: &str, lab: &str, mrn: &str, run_number: Option<&str>) -> String {
    let name = name.replace(|c: char| c == ',' || c == '(', "_").replace(')', "");
    let mut lab = lab.trim().to_string();
    let mut mrn = mrn.trim().to_string();
    if !mrn.chars().all(|c| c.is_ascii_digit()) {
        tracing::warn!("MRN not digit '{}'", mrn);
        mrn.clear();
    }

    let control_with_run = run_number.and_then(|run| {
        Regex::new(&format!(r"(?i)^(tr?u?q.?3|molt4|hd753).*{}", regex::escape(run))).ok()
    });
    let run = run_number.unwrap_or("");

    let keep_name = control_with_run.is_some_and(|re| re.is_match(&name))
        || (run_number.is_none() && is_control(&name));
    let sample = if keep_name {
        name
    } else if TRUQ3.is_match(&name) {
        format!("TruQ3_{run}")
    } else if MOLT4.is_match(&name) {
        format!("MOLT4_{run}")
    } else if HD753.is_match(&name) {
        format!("HD753_{run}")
    } else if !lab.is_empty() || !mrn.is_empty() {
        let (last, first) = split_last_first(&name);
        let initials = CAPITALISED_WORD.replace_all(first, "$1");
        let short = SPACES_COMMAS
            .replace_all(&format!("{last}{initials}"), "")
            .into_owned();
        if !lab.is_empty() && short.contains(&lab) {
            lab.clear();
        }
        [short, lab, mrn].join("_")
    } else {
        name
    };
    NON_NAME_CHARS.replace_all(&sample, "").into_owned()
}

fn is_control(name: &str) -> bool {
    TRUQ3.is_match(name) || MOLT4.is_match(name) || HD753.is_match(name)
}

/// Split `Last, First` or `Last_First` once. A separator followed by
/// `research` does not split, so `Sample_research` stays whole.
fn split_last_first(name: &str) -> (&str, &str) {
    let bytes = name.as_bytes();
    let is_sep = |b: u8| b == b'_' || b == b',';
    for start in 0..bytes.len() {
        if !is_sep(bytes[start]) {
            continue;
        }
        let mut sep_end = start;
        while sep_end < bytes.len() && is_sep(bytes[sep_end]) {
            sep_end += 1;
        }
        let mut ws_end = sep_end;
        while ws_end < bytes.len() && bytes[ws_end].is_ascii_whitespace() {
            ws_end += 1;
        }
        // longest separator first, then shorter ones
        let candidates = (sep_end..=ws_end).rev().chain((start + 1..sep_end).rev());
        for end in candidates {
            if !name[end..].starts_with("research") {
                return (&name[..start], &name[end..]);
            }
        }
    }
    (name, "")
}

fn read_xlsx(path: &Path) -> Result<Vec<SheetRow>> {
    let mut workbook =
        open_workbook_auto(path).with_context(|| format!("cannot open {}", path.display()))?;
    let range = workbook
        .worksheet_range_at(0)
        .with_context(|| format!("{} has no worksheets", path.display()))??;
    Ok(range
        .rows()
        .map(|row| row.iter().map(cell_text).collect())
        .collect())
}

fn cell_text(cell: &Data) -> Option<String> {
    match cell {
        Data::Empty => None,
        Data::String(s) => Some(s.clone()),
        Data::Int(i) => Some(i.to_string()),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => Some(format!("{}", *f as i64)),
        Data::Bool(b) => Some(if *b { "True" } else { "False" }.to_string()),
        other => Some(other.to_string()),
    }
}

fn read_delimited(path: &Path, delim: char) -> Result<Vec<SheetRow>> {
    let content =
        fs::read_to_string(path).with_context(|| format!("cannot read {}", path.display()))?;
    Ok(content
        .lines()
        .map(|line| {
            line.split(delim)
                .map(|c| {
                    let c = c.trim_matches('"');
                    if c.is_empty() {
                        None
                    } else {
                        Some(c.to_string())
                    }
                })
                .collect()
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cells: &[&str]) -> SheetRow {
        cells
            .iter()
            .map(|c| if c.is_empty() { None } else { Some(c.to_string()) })
            .collect()
    }

    fn sheet_rows() -> Vec<SheetRow> {
        vec![
            row(&["STAMP Coversheet", "", ""]),
            row(&["Run: Stamp ID: 305", "", ""]),
            row(&[]),
            row(&["Name", "lab#", "mrn#", "barcode", ""]),
            row(&["Smith, John Paul", "SP15-1234", "12345678", "ACGT"]),
            row(&["TruQ3", "", "", "GTCA"]),
            row(&["truq3 305", "", "", "GTCC"]),
            row(&["MOLT4", "", "", "TTAA"]),
            row(&["Doe_research", "R-1", "", "CCGG"]),
            row(&["no barcode", "L1", "999", ""]),
            row(&["Smith, Jane", "", "12345678", "AAAA"]),
            row(&["Smith, Jenny", "", "12345678", "AAAC"]),
        ]
    }

    #[test]
    fn test_parse_rows() {
        let sheet = Coversheet::from_rows(Path::new("/runs/cs.xlsx"), sheet_rows());
        assert!(sheet.is_recognized());
        assert_eq!(sheet.run_number.as_deref(), Some("305"));
        assert_eq!(sheet.samples.len(), 7);
        assert_eq!(
            sheet.output_path(None),
            PathBuf::from("/runs/sample2barcode_STAMP305.txt")
        );
        assert_eq!(
            sheet.output_path(Some(Path::new("/out"))),
            PathBuf::from("/out/sample2barcode_STAMP305.txt")
        );
    }

    #[test]
    fn test_sample_names() {
        let sheet = Coversheet::from_rows(Path::new("cs.xlsx"), sheet_rows());
        let pairs = sheet.sample2barcode();
        let names: Vec<&str> = pairs.iter().map(|(s, _)| s.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "SmithJP_SP15-1234_12345678",
                "TruQ3_305",
                "truq3305",
                "MOLT4_305",
                "Doe_research_R-1_",
                "SmithJ__12345678",
                "SmithJ__12345678-2",
            ]
        );
        assert_eq!(pairs[0].1, "ACGT");
    }

    #[test]
    fn test_run_number_suffix() {
        let rows = vec![row(&["STAMP_12b"]), row(&["Name", "lab#", "mrn#", "barcode"])];
        let sheet = Coversheet::from_rows(Path::new("cs.xlsx"), rows);
        assert_eq!(sheet.run_number.as_deref(), Some("012b"));

        let rows = vec![row(&["Name", "lab#", "mrn#", "barcode"])];
        let sheet = Coversheet::from_rows(Path::new("/x/cs.xlsx"), rows);
        assert_eq!(sheet.run_number, None);
        assert_eq!(sheet.output_path(None), PathBuf::from("/x/sample2barcode.txt"));
    }

    #[test]
    fn test_mrn_must_be_digits() {
        assert_eq!(sample_name("Lee, Ann", "", "MRN12", Some("305")), "Lee_Ann");
        assert_eq!(sample_name("Lee, Ann", "", "4455", Some("305")), "LeeA__4455");
        assert_eq!(sample_name("Lee (Ann)", "L-9", "", None), "LeeA_L-9_");
    }

    #[test]
    fn test_control_without_run_keeps_name() {
        assert_eq!(sample_name("TruQ3", "", "", None), "TruQ3");
        assert_eq!(sample_name("molt4", "", "", None), "molt4");
        assert_eq!(sample_name("TruQ3", "", "", Some("305")), "TruQ3_305");
    }

    #[test]
    fn test_split_last_first() {
        assert_eq!(split_last_first("Smith, John"), ("Smith", "John"));
        assert_eq!(split_last_first("Smith__John"), ("Smith", "John"));
        assert_eq!(split_last_first("Doe_research"), ("Doe_research", ""));
        assert_eq!(split_last_first("Doe_ research"), ("Doe", " research"));
        assert_eq!(split_last_first("Doe"), ("Doe", ""));
    }

    #[test]
    fn test_non_ascii_removed() {
        assert_eq!(sample_name("José.Pérez", "", "", None), "JosPrez");
    }

    #[test]
    fn test_write_and_unrecognized() {
        let dir = tempfile::tempdir().unwrap();
        let sheet = Coversheet::from_rows(&dir.path().join("cs.xlsx"), sheet_rows());
        let out = sheet.output_path(None);
        assert_eq!(sheet.write_sample2barcode(&out).unwrap(), 7);
        let text = fs::read_to_string(&out).unwrap();
        assert!(text.starts_with("SmithJP_SP15-1234_12345678\tACGT\n"));
        assert_eq!(text.lines().count(), 7);

        let sheet = Coversheet::from_rows(Path::new("cs.xlsx"), vec![row(&["hello"])]);
        assert!(!sheet.is_recognized());
    }

    #[test]
    fn test_load_delimited() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cs.csv");
        fs::write(
            &path,
            "STAMP 7,,\nName,lab#,mrn#,barcode\nHD753,,,GGCC\n",
        )
        .unwrap();
        let sheet = Coversheet::load(&path).unwrap();
        assert_eq!(sheet.run_number.as_deref(), Some("007"));
        assert_eq!(sheet.sample2barcode(), vec![("HD753_007".to_string(), "GGCC".to_string())]);
    }
}
