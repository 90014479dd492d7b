//! QC database: expected mutations, control runs and their observed VAFs

use super::variants::{dkey, parse_truth, run_status, TruthSet, VariantReport, STATUS_FAIL, STATUS_PASS};
use crate::db::{now_timestamp, open_db, open_db_in_memory, value_text, Schema};
use crate::tabfile::Record;
use anyhow::Result;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::collections::BTreeMap;
use std::path::Path;

/// Mutation columns shared by the truth file and the `mutation` table
pub const MUTATION_COLUMNS: [&str; 13] = [
    "gene",
    "chr",
    "position",
    "strand",
    "ref_transcript",
    "ref",
    "var",
    "dbSNP138_ID",
    "COSMIC70_ID",
    "HGVS",
    "protein",
    "whitelist",
    "expectedVAF",
];

#[derive(Debug, Clone, PartialEq)]
pub struct RunRow {
    pub id: i64,
    pub run_name: String,
    pub sample_name: String,
    pub run_status: String,
    pub num_mutations: i64,
    pub num_expected: i64,
    pub last_modified: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MutationRow {
    pub id: i64,
    pub is_expected: bool,
    /// Column values as text, keyed by column name
    pub values: Record,
}

impl MutationRow {
    pub fn dkey(&self) -> String {
        dkey(&self.values)
    }
}

/// One observed VAF joined with its run and mutation
#[derive(Debug, Clone, PartialEq)]
pub struct VafRow {
    pub run_id: i64,
    pub run_name: String,
    pub sample_name: String,
    pub run_status: String,
    pub vaf: Option<f64>,
    pub status: Option<String>,
    pub mutation: MutationRow,
}

impl VafRow {
    pub fn failed(&self) -> bool {
        self.run_status == STATUS_FAIL
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Inserted,
    Replaced,
    /// Run already stored and `force` not given
    AlreadyStored,
    /// Run or sample name missing
    MissingName,
}

impl SaveOutcome {
    pub fn is_saved(self) -> bool {
        matches!(self, SaveOutcome::Inserted | SaveOutcome::Replaced)
    }
}

/// Counts shown when the tool starts without reports
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct DbSummary {
    pub runs: i64,
    pub passed: i64,
    pub failed: i64,
    pub expected_mutations: i64,
    pub unexpected_mutations: i64,
    pub vafs: i64,
}

impl DbSummary {
    pub fn lines(&self) -> Vec<String> {
        vec![
            format!("{} runs stored ({} good; {} failed)", self.runs, self.passed, self.failed),
            format!("{} expected mutations", self.expected_mutations),
            format!("{} unexpected mutations", self.unexpected_mutations),
            format!("{} vafs", self.vafs),
        ]
    }
}

pub struct QcStore {
    conn: Connection,
    truths: TruthSet,
    truths_loaded: usize,
}

impl QcStore {
    /// Open the QC database. A database without expected mutations is
    /// seeded from `truth_file`; otherwise the truths are read back from it.
    pub fn open<P: AsRef<Path>, Q: AsRef<Path>>(db: P, truth_file: Q) -> Result<Self> {
        let (conn, is_new) = open_db(db.as_ref(), Schema::StampQc)?;
        if is_new {
            tracing::info!(db = %db.as_ref().display(), "created QC database");
        }
        Self::with_connection(conn, truth_file.as_ref())
    }

    pub fn open_in_memory<P: AsRef<Path>>(truth_file: P) -> Result<Self> {
        Self::with_connection(open_db_in_memory(Schema::StampQc)?, truth_file.as_ref())
    }

    fn with_connection(mut conn: Connection, truth_file: &Path) -> Result<Self> {
        let stored: i64 = conn.query_row(
            "SELECT COUNT(*) FROM mutation WHERE is_expected = 1",
            [],
            |row| row.get(0),
        )?;
        if stored > 0 {
            let truths = truths_from_db(&conn)?;
            return Ok(Self {
                conn,
                truths,
                truths_loaded: 0,
            });
        }

        let truths = parse_truth(truth_file)?;
        let tx = conn.transaction()?;
        for record in truths.variants.values() {
            insert_mutation(&tx, record, true)?;
        }
        tx.commit()?;
        tracing::info!(rows = truths.len(), "saved truths");
        let truths_loaded = truths.len();
        Ok(Self {
            conn,
            truths,
            truths_loaded,
        })
    }

    pub fn truths(&self) -> &TruthSet {
        &self.truths
    }

    /// Number of truths inserted when the store was opened
    pub fn truths_loaded(&self) -> usize {
        self.truths_loaded
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Store the VAFs of one checked report.
    ///
    /// A run already stored is left alone unless `force` is set, in which
    /// case its VAFs are replaced. The run status comes from its call counts
    /// (see [`run_status`]) unless `status` overrides it.
    pub fn save_run(
        &mut self,
        run_name: &str,
        sample: &str,
        status: Option<&str>,
        report: &VariantReport,
        force: bool,
    ) -> Result<SaveOutcome> {
        if run_name.is_empty() || sample.is_empty() {
            match (run_name.is_empty(), sample.is_empty()) {
                (true, false) => tracing::warn!("need run name for sample {sample}"),
                (false, true) => tracing::warn!("need sample for run {run_name}"),
                _ => tracing::warn!("need sample and run name"),
            }
            return Ok(SaveOutcome::MissingName);
        }

        let tx = self.conn.transaction()?;
        let existing: Option<i64> = tx
            .query_row(
                "SELECT id FROM run WHERE run_name = ?1 AND sample_name = ?2",
                params![run_name, sample],
                |row| row.get(0),
            )
            .optional()?;

        let (run_id, outcome) = match existing {
            Some(id) if !force => {
                tracing::info!(run = run_name, sample, "run already in database");
                (id, SaveOutcome::AlreadyStored)
            }
            Some(id) => {
                tracing::info!(run = run_name, sample, "replacing old data for run");
                tx.execute(
                    "UPDATE run SET last_modified = ?1 WHERE id = ?2",
                    params![now_timestamp(), id],
                )?;
                tx.execute("DELETE FROM vaf WHERE run_id = ?1", [id])?;
                (id, SaveOutcome::Replaced)
            }
            None => {
                tracing::info!(run = run_name, sample, "saving run");
                tx.execute(
                    "INSERT INTO run (run_name, sample_name, run_status, last_modified) VALUES (?1, ?2, ?3, ?4)",
                    params![run_name, sample, STATUS_PASS, now_timestamp()],
                )?;
                (tx.last_insert_rowid(), SaveOutcome::Inserted)
            }
        };

        if outcome.is_saved() {
            for record in &report.records {
                let mutation_id = match find_mutation(&tx, record)? {
                    Some(id) => id,
                    None => insert_mutation(&tx, record, false)?,
                };
                tx.execute(
                    "INSERT OR REPLACE INTO vaf (run_id, mutation_id, vaf, status, last_modified) VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        run_id,
                        mutation_id,
                        parse_vaf(record.text("VAF%")),
                        non_empty(record.text("status")),
                        now_timestamp()
                    ],
                )?;
            }
            tx.execute(
                "UPDATE run SET \
                 num_mutations = (SELECT COUNT(*) FROM vaf WHERE run_id = ?1), \
                 num_expected = (SELECT COUNT(*) FROM vaf v JOIN mutation m ON m.id = v.mutation_id \
                                 WHERE m.is_expected = 1 AND v.run_id = ?1) \
                 WHERE id = ?1",
                [run_id],
            )?;
            let num_truths: i64 =
                tx.query_row("SELECT COUNT(*) FROM mutation WHERE is_expected = 1", [], |row| row.get(0))?;
            let num_mutations: i64 =
                tx.query_row("SELECT num_mutations FROM run WHERE id = ?1", [run_id], |row| row.get(0))?;
            let status = status.unwrap_or_else(|| run_status(num_mutations, num_truths));
            tx.execute("UPDATE run SET run_status = ?1 WHERE id = ?2", params![status, run_id])?;
            tracing::info!(run = run_name, sample, status, num_mutations, num_truths, "run status");
        }
        tx.commit()?;

        let stored: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM vaf WHERE run_id = ?1", [run_id], |row| row.get(0))?;
        tracing::info!(run = run_name, sample, mutations = stored, "run stored");
        Ok(outcome)
    }

    pub fn summary(&self) -> Result<DbSummary> {
        let count = |sql: &str| -> Result<i64> { Ok(self.conn.query_row(sql, [], |row| row.get(0))?) };
        Ok(DbSummary {
            runs: count("SELECT COUNT(*) FROM run")?,
            passed: self.conn.query_row(
                "SELECT COUNT(*) FROM run WHERE run_status = ?1",
                [STATUS_PASS],
                |row| row.get(0),
            )?,
            failed: self.conn.query_row(
                "SELECT COUNT(*) FROM run WHERE run_status = ?1",
                [STATUS_FAIL],
                |row| row.get(0),
            )?,
            expected_mutations: count("SELECT COUNT(*) FROM mutation WHERE is_expected = 1")?,
            unexpected_mutations: count("SELECT COUNT(*) FROM mutation WHERE is_expected = 0")?,
            vafs: count("SELECT COUNT(*) FROM vaf")?,
        })
    }

    pub fn runs(&self) -> Result<Vec<RunRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, run_name, sample_name, run_status, num_mutations, num_expected, last_modified \
             FROM run ORDER BY run_name, sample_name",
        )?;
        let runs = stmt
            .query_map([], |row| {
                Ok(RunRow {
                    id: row.get(0)?,
                    run_name: row.get(1)?,
                    sample_name: row.get(2)?,
                    run_status: row.get(3)?,
                    num_mutations: row.get(4)?,
                    num_expected: row.get(5)?,
                    last_modified: row.get(6)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(runs)
    }

    pub fn run(&self, run_name: &str, sample: &str) -> Result<Option<RunRow>> {
        Ok(self
            .runs()?
            .into_iter()
            .find(|r| r.run_name == run_name && r.sample_name == sample))
    }

    /// Look up a mutation by its natural key
    pub fn mutation(&self, gene: &str, position: i64, reference: &str, variant: &str) -> Result<Option<MutationRow>> {
        let sql = format!(
            "SELECT id, is_expected, {} FROM mutation WHERE gene = ?1 AND position = ?2 AND ref = ?3 AND var = ?4",
            MUTATION_COLUMNS.join(", ")
        );
        Ok(self
            .conn
            .query_row(&sql, params![gene, position, reference, variant], |row| {
                mutation_from_row(row, 0)
            })
            .optional()?)
    }

    pub fn vafs_for_run(&self, run_id: i64) -> Result<Vec<VafRow>> {
        self.query_vafs(Some(run_id))
    }

    pub fn vafs_for_all_runs(&self) -> Result<Vec<VafRow>> {
        self.query_vafs(None)
    }

    fn query_vafs(&self, run_id: Option<i64>) -> Result<Vec<VafRow>> {
        let mut sql = format!(
            "SELECT v.run_id, r.run_name, r.sample_name, r.run_status, v.vaf, v.status, m.id, m.is_expected, {} \
             FROM vaf v JOIN mutation m ON m.id = v.mutation_id JOIN run r ON r.id = v.run_id",
            MUTATION_COLUMNS.map(|c| format!("m.{c}")).join(", ")
        );
        let args: Vec<i64> = run_id.into_iter().collect();
        if run_id.is_some() {
            sql.push_str(" WHERE v.run_id = ?1");
        }
        sql.push_str(" ORDER BY r.run_name, m.id");

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(args), |row| {
                Ok(VafRow {
                    run_id: row.get(0)?,
                    run_name: row.get(1)?,
                    sample_name: row.get(2)?,
                    run_status: row.get(3)?,
                    vaf: row.get(4)?,
                    status: row.get(5)?,
                    mutation: mutation_from_row(row, 6)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

/// Build a mutation from `id, is_expected, MUTATION_COLUMNS...` starting at `offset`
fn mutation_from_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<MutationRow> {
    let mut values = Record::default();
    for (i, column) in MUTATION_COLUMNS.iter().enumerate() {
        values.set(column, value_text(row.get_ref(offset + 2 + i)?));
    }
    Ok(MutationRow {
        id: row.get(offset)?,
        is_expected: row.get::<_, i64>(offset + 1)? == 1,
        values,
    })
}

fn truths_from_db(conn: &Connection) -> Result<TruthSet> {
    let sql = format!(
        "SELECT id, is_expected, {} FROM mutation WHERE is_expected = 1",
        MUTATION_COLUMNS.join(", ")
    );
    let mut stmt = conn.prepare(&sql)?;
    let variants: BTreeMap<String, Record> = stmt
        .query_map([], |row| mutation_from_row(row, 0))?
        .map(|m| m.map(|m| (m.dkey(), m.values)))
        .collect::<rusqlite::Result<_>>()?;
    Ok(TruthSet {
        fields: MUTATION_COLUMNS.iter().map(|c| c.to_string()).collect(),
        variants,
    })
}

fn find_mutation(conn: &Connection, record: &Record) -> Result<Option<i64>> {
    Ok(conn
        .query_row(
            "SELECT id FROM mutation WHERE gene = ?1 AND position = ?2 AND ref = ?3 AND var = ?4",
            params![
                record.text("gene"),
                position(record),
                record.text("ref"),
                record.text("var")
            ],
            |row| row.get(0),
        )
        .optional()?)
}

fn insert_mutation(conn: &Connection, record: &Record, is_expected: bool) -> Result<i64> {
    let mut values: Vec<Value> = MUTATION_COLUMNS
        .iter()
        .map(|&column| match column {
            "position" => Value::Integer(position(record)),
            "expectedVAF" => parse_vaf(record.text(column)).map_or(Value::Null, Value::Real),
            _ => non_empty(record.text(column)).map_or(Value::Null, |v| Value::Text(v.to_string())),
        })
        .collect();
    values.push(Value::Integer(is_expected as i64));
    values.push(Value::Text(now_timestamp()));

    let placeholders: Vec<String> = (1..=values.len()).map(|i| format!("?{i}")).collect();
    let sql = format!(
        "INSERT INTO mutation ({}, is_expected, last_modified) VALUES ({})",
        MUTATION_COLUMNS.join(", "),
        placeholders.join(", ")
    );
    conn.execute(&sql, params_from_iter(values))?;
    Ok(conn.last_insert_rowid())
}

/// Positions are validated when reports are parsed
fn position(record: &Record) -> i64 {
    record.text("position").parse().unwrap_or_default()
}

fn parse_vaf(text: &str) -> Option<f64> {
    text.trim().trim_end_matches('%').parse().ok()
}

fn non_empty(text: &str) -> Option<&str> {
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    const TRUTH: &str = "gene\tchr\tposition\tstrand\tref_transcript\tref\tvar\tdbSNP138_ID\tCOSMIC70_ID\tHGVS\tprotein\twhitelist\texpectedVAF\n\
KRAS\t12\t25398284\t-\tNM_004985\tC\tT\tNA\tCOSM520\tc.35G>A\tp.G12D\tY\t5%\n\
BRAF\t7\t140453136\t-\tNM_004333\tA\tT\trs113488022\tCOSM476\tc.1799T>A\tp.V600E\tY\t10%\n";

    fn fixture(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    fn report(dir: &Path, name: &str, rows: &[&str]) -> VariantReport {
        let mut content = String::from("Gene\tChr\tPosition\tRef\tVar\tCDS Change\tAA Change\tVAF%\tStatus\n");
        for row in rows {
            content.push_str(row);
            content.push('\n');
        }
        VariantReport::parse(fixture(dir, name, &content)).unwrap()
    }

    #[test]
    fn test_new_store_loads_truths() {
        let dir = tempfile::tempdir().unwrap();
        let truth = fixture(dir.path(), "truth.txt", TRUTH);
        let db = dir.path().join("qc").join("stampQC.db");

        let store = QcStore::open(&db, &truth).unwrap();
        assert_eq!(store.truths_loaded(), 2);
        let summary = store.summary().unwrap();
        assert_eq!(summary.expected_mutations, 2);
        assert_eq!(summary.lines()[0], "0 runs stored (0 good; 0 failed)");
        drop(store);

        // reopened from the database, the truth file is not needed
        let store = QcStore::open(&db, dir.path().join("missing.txt")).unwrap();
        assert_eq!(store.truths_loaded(), 0);
        assert_eq!(store.truths().len(), 2);
        let kras = store.truths().get("KRAS:25398284:C:T").unwrap();
        assert_eq!(kras.text("expectedVAF"), "5.0");
        assert_eq!(kras.text("dbSNP138_ID"), "");
        assert_eq!(kras.text("HGVS"), "c.35G>A");
    }

    #[test]
    fn test_save_run_and_force() {
        let dir = tempfile::tempdir().unwrap();
        let truth = fixture(dir.path(), "truth.txt", TRUTH);
        let mut store = QcStore::open_in_memory(&truth).unwrap();

        let first = report(
            dir.path(),
            "TruQ3_305.variant_report.txt",
            &[
                "KRAS\t12\t25398284\tC\tT\t35G>A\tp.G12D\t4.8\tREPORTED",
                "TP53\t17\t7577120\tC\tT\t818G>A\tp.R273H\t2.1\tNOT_REPORTED",
            ],
        );
        let outcome = store
            .save_run(&first.run_name, &first.sample, None, &first, false)
            .unwrap();
        assert_eq!(outcome, SaveOutcome::Inserted);
        let run = store.run("STAMP305", "TruQ3_305").unwrap().unwrap();
        assert_eq!((run.num_mutations, run.num_expected), (2, 1));
        assert_eq!(run.run_status, STATUS_PASS);

        let tp53 = store.mutation("TP53", 7577120, "C", "T").unwrap().unwrap();
        assert!(!tp53.is_expected);
        assert_eq!(tp53.values.text("HGVS"), "c.818G>A");

        let outcome = store
            .save_run(&first.run_name, &first.sample, Some(STATUS_FAIL), &first, false)
            .unwrap();
        assert_eq!(outcome, SaveOutcome::AlreadyStored);
        assert_eq!(store.run("STAMP305", "TruQ3_305").unwrap().unwrap().run_status, STATUS_PASS);

        let second = report(
            dir.path(),
            "TruQ3_305.variant_report.txt",
            &["BRAF\t7\t140453136\tA\tT\t1799T>A\tp.V600E\t9.5\tREPORTED"],
        );
        let outcome = store
            .save_run("STAMP305", "TruQ3_305", Some(STATUS_FAIL), &second, true)
            .unwrap();
        assert_eq!(outcome, SaveOutcome::Replaced);
        let run = store.run("STAMP305", "TruQ3_305").unwrap().unwrap();
        assert_eq!(run.id, 1);
        assert_eq!(run.run_status, STATUS_FAIL);
        assert_eq!((run.num_mutations, run.num_expected), (1, 1));

        let vafs = store.vafs_for_run(run.id).unwrap();
        assert_eq!(vafs.len(), 1);
        assert_eq!(vafs[0].vaf, Some(9.5));
        assert_eq!(vafs[0].status.as_deref(), Some("REPORTED"));
        assert!(vafs[0].failed());
        assert_eq!(vafs[0].mutation.dkey(), "BRAF:140453136:A:T");

        let summary = store.summary().unwrap();
        assert_eq!(summary.runs, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.unexpected_mutations, 1);
        assert_eq!(summary.vafs, 1);
    }

    #[test]
    fn test_save_run_requires_names() {
        let dir = tempfile::tempdir().unwrap();
        let truth = fixture(dir.path(), "truth.txt", TRUTH);
        let mut store = QcStore::open_in_memory(&truth).unwrap();
        let rep = report(dir.path(), "TruQ3_.variant_report.txt", &[]);
        assert_eq!(rep.run_name, "");
        let outcome = store
            .save_run(&rep.run_name, &rep.sample, None, &rep, false)
            .unwrap();
        assert_eq!(outcome, SaveOutcome::MissingName);
        assert!(store.runs().unwrap().is_empty());
    }

    #[test]
    fn test_status_from_call_counts() {
        let dir = tempfile::tempdir().unwrap();
        let truth = fixture(dir.path(), "truth.txt", TRUTH);
        let mut store = QcStore::open_in_memory(&truth).unwrap();

        // no truth found, but two calls reach half of the two truths
        let unexpected = report(
            dir.path(),
            "TruQ3_306.variant_report.txt",
            &[
                "TP53\t17\t7577120\tC\tT\t818G>A\tp.R273H\t2.1\tREPORTED",
                "EGFR\t7\t55249071\tC\tT\t2369C>T\tp.T790M\t1.4\tREPORTED",
            ],
        );
        store.save_run("STAMP306", "TruQ3_306", None, &unexpected, false).unwrap();
        let run = store.run("STAMP306", "TruQ3_306").unwrap().unwrap();
        assert_eq!((run.num_mutations, run.num_expected), (2, 0));
        assert_eq!(run.run_status, STATUS_PASS);

        // one call is exactly half of two truths
        let single = report(
            dir.path(),
            "TruQ3_307.variant_report.txt",
            &["TP53\t17\t7577120\tC\tT\t818G>A\tp.R273H\t3.0\tREPORTED"],
        );
        store.save_run("STAMP307", "TruQ3_307", None, &single, false).unwrap();
        assert_eq!(store.run("STAMP307", "TruQ3_307").unwrap().unwrap().run_status, STATUS_PASS);

        let empty = report(dir.path(), "TruQ3_308.variant_report.txt", &[]);
        store.save_run("STAMP308", "TruQ3_308", None, &empty, false).unwrap();
        let run = store.run("STAMP308", "TruQ3_308").unwrap().unwrap();
        assert_eq!(run.num_mutations, 0);
        assert_eq!(run.run_status, STATUS_FAIL);

        // a forced rerun recomputes the status from the new calls
        store.save_run("STAMP308", "TruQ3_308", None, &single, true).unwrap();
        assert_eq!(store.run("STAMP308", "TruQ3_308").unwrap().unwrap().run_status, STATUS_PASS);
    }
}
