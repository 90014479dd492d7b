use calamine::{open_workbook, Data, Reader, Xlsx};
use stamp_qc_tools::water::{analyze, parse_barcode_file, run_name_from_path, write_water_spreadsheet, WaterStore};
use std::fs;
use std::path::{Path, PathBuf};

fn barcode_file(root: &Path, run_dir: &str, lines: &str) -> PathBuf {
    let dir = root.join(run_dir);
    fs::create_dir_all(&dir).unwrap();
    let path = dir.join("barcode_counts.txt");
    fs::write(&path, lines).unwrap();
    path
}

#[test]
fn test_save_and_spreadsheet() {
    let dir = tempfile::tempdir().unwrap();
    let water = vec!["NNNNGTCA".to_string()];
    let files = [
        barcode_file(dir.path(), "STAMP2-225-analysis", "NNNNGTCA 20\nNNNNACGT 9980\n"),
        barcode_file(dir.path(), "STAMP2-226-analysis", "NNNNACGT 5000\nNNNNTTGA 5000\n"),
        barcode_file(dir.path(), "stamp2-227-analysis", "NNNNGTCA 300\nNNNNACGT 9700\n"),
    ];

    let mut store = WaterStore::open(dir.path().join("water.db")).unwrap();
    let mut runs = Vec::new();
    for (i, file) in files.iter().enumerate() {
        let counts = parse_barcode_file(file).unwrap();
        let name = run_name_from_path(file, i + 1);
        runs.push(analyze(&name, "PASS", &counts, &water));
    }
    let names: Vec<&str> = runs.iter().map(|r| r.run_name.as_str()).collect();
    assert_eq!(names, vec!["STAMP2-225", "STAMP2-226", "STAMP2-227"]);
    assert_eq!(store.save_runs(&runs, "PASS").unwrap(), 3);

    // a failed rerun of 226 stays in the database but leaves the spreadsheet
    let rerun = analyze("STAMP2-226", "FAIL", &parse_barcode_file(&files[1]).unwrap(), &water);
    store.save_runs(&[rerun], "FAIL").unwrap();
    let data = store.run_data(None).unwrap();
    assert_eq!(data.len(), 3);
    assert_eq!(data["STAMP2-226"].run_status, "FAIL");
    assert_eq!(data["STAMP2-226"].count("NNNNGTCA"), 0);

    let xlsx = dir.path().join("water.xlsx");
    let written = write_water_spreadsheet(&data, &water, 0.005, &xlsx).unwrap();
    assert_eq!(written, 2);

    let mut workbook: Xlsx<_> = open_workbook(&xlsx).unwrap();
    let sheet = workbook.worksheet_range("Barcode counts").unwrap();
    let text = |row: u32, col: u32| sheet.get_value((row, col)).map(|v| v.to_string()).unwrap_or_default();
    assert_eq!(text(1, 0), "# Num runs in spreadsheet: 2");
    assert_eq!(text(3, 1), "NNNNGTCA");
    assert_eq!(text(4, 0), "Runs");
    assert_eq!(text(4, 3), "Read %");
    assert_eq!(text(5, 0), "STAMP2-227");
    assert_eq!(sheet.get_value((5, 1)), Some(&Data::Float(10000.0)));
    assert_eq!(sheet.get_value((5, 2)), Some(&Data::Float(300.0)));
    assert_eq!(text(6, 0), "STAMP2-225");
    assert_eq!(text(7, 0), "");
}

#[test]
fn test_unnamed_run() {
    let dir = tempfile::tempdir().unwrap();
    let file = barcode_file(dir.path(), "counts", "NNNNGTCA 1\n");
    assert_eq!(run_name_from_path(&file, 4), "NoName_4");
}
