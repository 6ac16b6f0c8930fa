//! SQLite persistence for runs, cases, and results.
//!
//! Each insert/update is an immediately committed unit — there is no
//! run-scoped transaction spanning cases. The durability policy is
//! at-least-partial: a crash mid-run keeps every row written so far, and the
//! orchestrator closes the lifecycle of any run it survives an error on by
//! marking it `failed` (see [`crate::runner`]).

use rusqlite::{Connection, OptionalExtension, Row, params};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;
use uuid::Uuid;

use crate::error::StorageError;
use crate::types::{
    CaseReport, EvalResult, RunDetail, RunStatus, RunSummary, TestCase, TestRun,
};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS test_runs (
    id             TEXT PRIMARY KEY,
    created_at     TEXT NOT NULL,
    status         TEXT NOT NULL,
    target_model   TEXT NOT NULL,
    prompt         TEXT NOT NULL,
    total_cases    INTEGER NOT NULL DEFAULT 0,
    passed_cases   INTEGER NOT NULL DEFAULT 0,
    average_score  REAL NOT NULL DEFAULT 0.0,
    overall_pass   INTEGER NOT NULL DEFAULT 0,
    pass_threshold REAL NOT NULL
);

CREATE TABLE IF NOT EXISTS test_cases (
    id              TEXT PRIMARY KEY,
    run_id          TEXT NOT NULL REFERENCES test_runs(id) ON DELETE CASCADE,
    input_text      TEXT NOT NULL,
    expected_output TEXT,
    metadata        TEXT,
    created_at      TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS eval_results (
    id              TEXT PRIMARY KEY,
    test_case_id    TEXT NOT NULL UNIQUE REFERENCES test_cases(id) ON DELETE CASCADE,
    model_output    TEXT NOT NULL,
    heuristic_score REAL NOT NULL,
    judge_score     REAL NOT NULL,
    combined_score  REAL NOT NULL,
    passed          INTEGER NOT NULL,
    judge_reasoning TEXT NOT NULL,
    created_at      TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_test_cases_run_id ON test_cases(run_id);
CREATE INDEX IF NOT EXISTS idx_test_runs_created_at ON test_runs(created_at);
";

/// SQLite-backed store for evaluation records.
///
/// The connection sits behind a mutex so a single store can be shared across
/// HTTP handlers; the pipeline itself is strictly sequential and never
/// contends on it within a run.
pub struct EvalStore {
    conn: Mutex<Connection>,
}

impl EvalStore {
    /// Open (and if necessary create) the database at `path`.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        debug!(path = %path.display(), "Opened eval store");
        Self::from_connection(conn)
    }

    /// Open an in-memory database; used by tests and dry runs.
    pub fn open_in_memory() -> Result<Self, StorageError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StorageError> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        // Recover the guard even if a panicking thread poisoned the mutex.
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Persist a freshly created run.
    pub fn insert_run(&self, run: &TestRun) -> Result<(), StorageError> {
        self.lock().execute(
            "INSERT INTO test_runs (id, created_at, status, target_model, prompt,
                                    total_cases, passed_cases, average_score,
                                    overall_pass, pass_threshold)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                run.id.to_string(),
                run.created_at.to_rfc3339(),
                run.status.as_str(),
                run.target_model,
                run.prompt,
                run.total_cases,
                run.passed_cases,
                run.average_score,
                run.overall_pass,
                run.pass_threshold,
            ],
        )?;
        Ok(())
    }

    /// Persist a case under its run.
    pub fn insert_case(&self, case: &TestCase) -> Result<(), StorageError> {
        let metadata = case
            .metadata
            .as_ref()
            .map(|m| m.to_string());
        self.lock().execute(
            "INSERT INTO test_cases (id, run_id, input_text, expected_output, metadata, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                case.id.to_string(),
                case.run_id.to_string(),
                case.input_text,
                case.expected_output,
                metadata,
                case.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Persist the scored result of a case.
    pub fn insert_result(&self, result: &EvalResult) -> Result<(), StorageError> {
        self.lock().execute(
            "INSERT INTO eval_results (id, test_case_id, model_output, heuristic_score,
                                       judge_score, combined_score, passed,
                                       judge_reasoning, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                result.id.to_string(),
                result.test_case_id.to_string(),
                result.model_output,
                result.heuristic_score,
                result.judge_score,
                result.combined_score,
                result.passed,
                result.judge_reasoning,
                result.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Write the final aggregates and mark the run `completed`.
    pub fn finalize_run(
        &self,
        run_id: Uuid,
        total_cases: u64,
        passed_cases: u64,
        average_score: f64,
        overall_pass: bool,
    ) -> Result<(), StorageError> {
        let updated = self.lock().execute(
            "UPDATE test_runs
             SET total_cases = ?2, passed_cases = ?3, average_score = ?4,
                 overall_pass = ?5, status = ?6
             WHERE id = ?1",
            params![
                run_id.to_string(),
                total_cases,
                passed_cases,
                average_score,
                overall_pass,
                RunStatus::Completed.as_str(),
            ],
        )?;
        if updated == 0 {
            return Err(StorageError::NotFound {
                what: format!("run {run_id}"),
            });
        }
        Ok(())
    }

    /// Mark a run `failed`, preserving whatever cases and results were
    /// already persisted.
    pub fn mark_run_failed(&self, run_id: Uuid) -> Result<(), StorageError> {
        let updated = self.lock().execute(
            "UPDATE test_runs SET status = ?2 WHERE id = ?1",
            params![run_id.to_string(), RunStatus::Failed.as_str()],
        )?;
        if updated == 0 {
            return Err(StorageError::NotFound {
                what: format!("run {run_id}"),
            });
        }
        Ok(())
    }

    /// Fetch a run with its scored cases in insertion order.
    ///
    /// Cases that never received a result (a run aborted by an invocation
    /// error) are not echoed back; the `failed` status carries that signal.
    pub fn get_run(&self, run_id: Uuid) -> Result<Option<RunDetail>, StorageError> {
        let conn = self.lock();

        let run = conn
            .query_row(
                "SELECT id, created_at, status, target_model, prompt, total_cases,
                        passed_cases, average_score, overall_pass, pass_threshold
                 FROM test_runs WHERE id = ?1",
                params![run_id.to_string()],
                run_from_row,
            )
            .optional()?;
        let Some(run) = run else {
            return Ok(None);
        };

        let mut stmt = conn.prepare(
            "SELECT tc.id, tc.input_text, tc.expected_output,
                    er.model_output, er.heuristic_score, er.judge_score,
                    er.combined_score, er.passed, er.judge_reasoning
             FROM test_cases tc
             JOIN eval_results er ON er.test_case_id = tc.id
             WHERE tc.run_id = ?1
             ORDER BY tc.rowid",
        )?;
        let results = stmt
            .query_map(params![run_id.to_string()], case_report_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(RunDetail {
            id: run.id,
            created_at: run.created_at,
            status: run.status,
            target_model: run.target_model,
            prompt: run.prompt,
            total_cases: run.total_cases,
            passed_cases: run.passed_cases,
            average_score: run.average_score,
            overall_pass: run.overall_pass,
            pass_threshold: run.pass_threshold,
            results,
        }))
    }

    /// List run summaries, newest first, with the total row count for paging.
    pub fn list_runs(
        &self,
        limit: u64,
        offset: u64,
    ) -> Result<(Vec<RunSummary>, u64), StorageError> {
        let conn = self.lock();

        let total: u64 = conn.query_row("SELECT COUNT(*) FROM test_runs", [], |row| row.get(0))?;

        let mut stmt = conn.prepare(
            "SELECT id, created_at, status, target_model, total_cases,
                    passed_cases, average_score, overall_pass
             FROM test_runs
             ORDER BY created_at DESC, rowid DESC
             LIMIT ?1 OFFSET ?2",
        )?;
        let items = stmt
            .query_map(params![limit, offset], summary_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok((items, total))
    }
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<TestRun> {
    Ok(TestRun {
        id: parse_uuid(row, 0)?,
        created_at: parse_timestamp(row, 1)?,
        status: parse_status(row, 2)?,
        target_model: row.get(3)?,
        prompt: row.get(4)?,
        total_cases: row.get(5)?,
        passed_cases: row.get(6)?,
        average_score: row.get(7)?,
        overall_pass: row.get(8)?,
        pass_threshold: row.get(9)?,
    })
}

fn summary_from_row(row: &Row<'_>) -> rusqlite::Result<RunSummary> {
    Ok(RunSummary {
        id: parse_uuid(row, 0)?,
        created_at: parse_timestamp(row, 1)?,
        status: parse_status(row, 2)?,
        target_model: row.get(3)?,
        total_cases: row.get(4)?,
        passed_cases: row.get(5)?,
        average_score: row.get(6)?,
        overall_pass: row.get(7)?,
    })
}

fn case_report_from_row(row: &Row<'_>) -> rusqlite::Result<CaseReport> {
    Ok(CaseReport {
        test_case_id: parse_uuid(row, 0)?,
        input: row.get(1)?,
        expected_output: row.get(2)?,
        model_output: row.get(3)?,
        heuristic_score: row.get(4)?,
        judge_score: row.get(5)?,
        combined_score: row.get(6)?,
        passed: row.get(7)?,
        judge_reasoning: row.get(8)?,
    })
}

fn parse_uuid(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let text: String = row.get(idx)?;
    Uuid::parse_str(&text).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn parse_timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<chrono::DateTime<chrono::Utc>> {
    let text: String = row.get(idx)?;
    chrono::DateTime::parse_from_rfc3339(&text)
        .map(|dt| dt.with_timezone(&chrono::Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn parse_status(row: &Row<'_>, idx: usize) -> rusqlite::Result<RunStatus> {
    let text: String = row.get(idx)?;
    RunStatus::parse(&text).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            format!("unknown run status '{text}'").into(),
        )
    })
}
