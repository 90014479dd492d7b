//! Cross-run VAF spreadsheet generated from the QC database

use super::store::{QcStore, VafRow};
use super::variants::field_to_report;
use crate::spreadsheet::excel_column;
use anyhow::Result;
use rust_xlsxwriter::{
    Color, ConditionalFormatBlank, ConditionalFormatCell, ConditionalFormatCellRule, Format, FormatBorder,
    FormatPattern, Formula, Workbook, Worksheet,
};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

const HEADER_ROWS: u32 = 4;
const CALC_FIELDS: [&str; 3] = ["AverageVAF", "StddevVAF", "%Detection"];
const DROPPED_FIELDS: [&str; 5] = ["dbSNP138_ID", "COSMIC70_ID", "ref", "var", "is_expected"];

#[derive(Debug, Clone, Default, Serialize)]
pub struct SummaryStats {
    pub num_runs: usize,
    pub num_variants: usize,
    pub failed_runs: Vec<String>,
}

/// Observations of one mutation, keyed by run name
type RunVafs = BTreeMap<String, VafRow>;

struct SummaryData {
    header: Vec<String>,
    fields: Vec<String>,
    /// Good runs, newest first
    runs: Vec<String>,
    expected: BTreeMap<i64, RunVafs>,
    unexpected: BTreeMap<String, RunVafs>,
    failed_runs: Vec<String>,
}

fn collect(store: &QcStore) -> Result<SummaryData> {
    let mut failed = BTreeSet::new();
    let mut good = BTreeSet::new();
    let mut expected: BTreeMap<i64, RunVafs> = BTreeMap::new();
    let mut unexpected: BTreeMap<String, RunVafs> = BTreeMap::new();

    for vaf in store.vafs_for_all_runs()? {
        if vaf.failed() {
            failed.insert(vaf.run_name.clone());
            continue;
        }
        good.insert(vaf.run_name.clone());
        let runs = if vaf.mutation.is_expected {
            expected.entry(vaf.mutation.id).or_default()
        } else {
            unexpected.entry(vaf.mutation.dkey()).or_default()
        };
        runs.insert(vaf.run_name.clone(), vaf);
    }

    let failed_runs: Vec<String> = failed.into_iter().collect();
    let header = vec![
        "# This spreadsheet is automatically generated. Any edits will be lost in future versions."
            .to_string(),
        format!("# Failed runs (not in spreadsheet): {}", failed_runs.join(", ")),
        format!("# Num runs in spreadsheet: {}", good.len()),
        format!("# Num expected variants: {}", expected.len()),
    ];
    let fields = store
        .truths()
        .fields
        .iter()
        .filter(|f| !DROPPED_FIELDS.contains(&f.as_str()))
        .cloned()
        .collect();

    Ok(SummaryData {
        header,
        fields,
        runs: good.into_iter().rev().collect(),
        expected,
        unexpected,
        failed_runs,
    })
}

struct Formats {
    bold: Format,
    percent: Format,
    gray_percent: Format,
    gray: Format,
    red: Format,
    light_red: Format,
    blue: Format,
    light_blue: Format,
    blank: Format,
}

impl Formats {
    fn new() -> Self {
        let fill = |rgb: u32| {
            Format::new()
                .set_background_color(Color::RGB(rgb))
                .set_border(FormatBorder::Thin)
                .set_border_color(Color::RGB(0xCDCDCD))
        };
        Self {
            bold: Format::new().set_bold(),
            percent: Format::new().set_num_format("0.00%"),
            gray_percent: fill(0xF0F0F0).set_num_format("0.00%"),
            gray: fill(0xF0F0F0),
            red: fill(0xC58886),
            light_red: fill(0xE9D4D3),
            blue: fill(0x88A4C5),
            light_blue: fill(0xD7E1EB),
            blank: Format::new()
                .set_pattern(FormatPattern::DarkUp)
                .set_foreground_color(Color::RGB(0xDCE6F0))
                .set_border(FormatBorder::Thin)
                .set_border_color(Color::RGB(0xCDCDCD)),
        }
    }
}

/// Mean and sample standard deviation of the observed VAFs
fn vaf_stats(values: &[f64]) -> (Option<f64>, Option<f64>) {
    if values.is_empty() {
        return (None, None);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    if values.len() < 2 {
        return (Some(mean), None);
    }
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    (Some(mean), Some(var.sqrt()))
}

/// Write the summary spreadsheet of all good runs in the database
pub fn write_summary_spreadsheet<P: AsRef<Path>>(store: &QcStore, path: P) -> Result<SummaryStats> {
    let path = path.as_ref();
    let data = collect(store)?;
    tracing::info!(file = %path.display(), runs = data.runs.len(), "writing QC spreadsheet");

    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    let formats = Formats::new();

    for (row, line) in data.header.iter().enumerate() {
        worksheet.write_string(row as u32, 0, line)?;
    }

    let field_row = HEADER_ROWS;
    let mut col: u16 = 0;
    for field in data.fields.iter() {
        worksheet.write_string_with_format(field_row, col, field_to_report(field), &formats.bold)?;
        col += 1;
    }
    let avg_col = col;
    let std_col = col + 1;
    for field in CALC_FIELDS {
        worksheet.write_string_with_format(field_row, col, field, &formats.bold)?;
        col += 1;
    }
    let first_run_col = col;
    for run in &data.runs {
        worksheet.write_string_with_format(field_row, col, run, &formats.bold)?;
        col += 1;
    }
    let last_run_col = col.saturating_sub(1).max(first_run_col);

    let mut row = field_row;
    let mut num_variants = 0;
    for vafs in data.expected.values() {
        row += 1;
        num_variants += 1;
        write_variant_row(worksheet, &formats, &data, vafs, row, true)?;
        add_deviation_formats(worksheet, &formats, row, avg_col, std_col, first_run_col, last_run_col)?;
    }
    for vafs in data.unexpected.values() {
        row += 1;
        num_variants += 1;
        worksheet.set_row_format(row, &formats.gray)?;
        write_variant_row(worksheet, &formats, &data, vafs, row, false)?;
    }

    if !data.runs.is_empty() {
        worksheet.set_column_range_width(first_run_col, last_run_col, 10)?;
    }
    if let Some(pos) = data.fields.iter().position(|f| f == "position") {
        worksheet.set_column_width(pos as u16, 9)?;
    }
    worksheet.set_row_hidden(0)?;
    worksheet.set_row_hidden(1)?;
    worksheet.set_freeze_panes(field_row + 1, 0)?;
    workbook.save(path)?;

    Ok(SummaryStats {
        num_runs: data.runs.len(),
        num_variants,
        failed_runs: data.failed_runs,
    })
}

fn write_variant_row(
    worksheet: &mut Worksheet,
    formats: &Formats,
    data: &SummaryData,
    vafs: &RunVafs,
    row: u32,
    expected: bool,
) -> Result<()> {
    let percent = if expected { &formats.percent } else { &formats.gray_percent };
    let observed: Vec<Option<&VafRow>> = data.runs.iter().map(|r| vafs.get(r)).collect();
    let Some(first) = observed.iter().flatten().next() else {
        return Ok(());
    };

    let mut col: u16 = 0;
    for field in &data.fields {
        let value = first.mutation.values.text(field);
        match field.as_str() {
            "position" => {
                if let Ok(pos) = value.parse::<f64>() {
                    worksheet.write_number(row, col, pos)?;
                }
            }
            "expectedVAF" => {
                if let Ok(vaf) = value.parse::<f64>() {
                    worksheet.write_number_with_format(row, col, vaf / 100.0, percent)?;
                }
            }
            _ => {
                worksheet.write_string(row, col, value)?;
            }
        }
        col += 1;
    }

    let avg_col = col;
    let first_run_col = col + CALC_FIELDS.len() as u16;
    let mut values = Vec::new();
    for (i, vaf) in observed.iter().enumerate() {
        if let Some(v) = vaf.and_then(|v| v.vaf) {
            worksheet.write_number(row, first_run_col + i as u16, v)?;
            values.push(v);
        }
    }

    let last_run_col = first_run_col + (data.runs.len() as u16).saturating_sub(1);
    let range = format!(
        "{}{r}:{}{r}",
        excel_column(first_run_col as usize),
        excel_column(last_run_col as usize),
        r = row + 1
    );
    let (mean, stddev) = vaf_stats(&values);

    let mut average = Formula::new(format!("=AVERAGE({range})"));
    if let Some(mean) = mean {
        average = average.set_result(mean.to_string());
    }
    worksheet.write_formula(row, avg_col, average)?;

    if observed.iter().flatten().count() > 1 {
        let mut stdev = Formula::new(format!("=STDEV({range})"));
        if let Some(sd) = stddev {
            stdev = stdev.set_result(sd.to_string());
        }
        worksheet.write_formula(row, avg_col + 1, stdev)?;
    }

    let detection = values.len() as f64 / data.runs.len().max(1) as f64;
    let count = Formula::new(format!("=COUNT({range})/{}", data.runs.len())).set_result(detection.to_string());
    worksheet.write_formula_with_format(row, avg_col + 2, count, percent)?;
    Ok(())
}

/// Shade run cells by how far they fall from the row mean
fn add_deviation_formats(
    worksheet: &mut Worksheet,
    formats: &Formats,
    row: u32,
    avg_col: u16,
    std_col: u16,
    first_col: u16,
    last_col: u16,
) -> Result<()> {
    let avg = format!("${}${}", excel_column(avg_col as usize), row + 1);
    let std = format!("${}${}", excel_column(std_col as usize), row + 1);
    let bound = |k: i32| Formula::new(format!("={k}*{std} + {avg}"));

    let rules = [
        (ConditionalFormatCellRule::Between(bound(2), bound(3)), &formats.light_red),
        (ConditionalFormatCellRule::GreaterThan(bound(3)), &formats.red),
        (ConditionalFormatCellRule::Between(bound(-3), bound(-2)), &formats.light_blue),
        (ConditionalFormatCellRule::LessThan(bound(-3)), &formats.blue),
    ];
    for (rule, format) in rules {
        let conditional = ConditionalFormatCell::new().set_rule(rule).set_format(format);
        worksheet.add_conditional_format(row, first_col, row, last_col, &conditional)?;
    }
    let blanks = ConditionalFormatBlank::new().set_format(&formats.blank);
    worksheet.add_conditional_format(row, first_col, row, last_col, &blanks)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vaf_stats() {
        assert_eq!(vaf_stats(&[]), (None, None));
        assert_eq!(vaf_stats(&[4.0]), (Some(4.0), None));
        let (mean, sd) = vaf_stats(&[2.0, 4.0, 6.0]);
        assert_eq!(mean, Some(4.0));
        assert!((sd.unwrap() - 2.0).abs() < 1e-12);
    }
}
