//! Record types and wire shapes for evaluation runs.
//!
//! A [`TestRun`] owns its [`TestCase`]s; each case owns at most one
//! [`EvalResult`], created only after both scorers have returned. Records are
//! immutable once written except for the run's final aggregate update.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::EvalError;

/// Default minimum combined score required to mark a case (and run) as passed.
pub const DEFAULT_PASS_THRESHOLD: f64 = 0.75;

/// Lifecycle status of an evaluation run.
///
/// `Pending -> Running -> Completed` on the happy path; `Failed` when a
/// target-model invocation error aborts the run mid-loop (partial cases and
/// results are preserved).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(RunStatus::Pending),
            "running" => Some(RunStatus::Running),
            "completed" => Some(RunStatus::Completed),
            "failed" => Some(RunStatus::Failed),
            _ => None,
        }
    }
}

/// One evaluation session over a prompt, target model, and ordered test cases.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestRun {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub status: RunStatus,
    pub target_model: String,
    pub prompt: String,
    pub total_cases: u64,
    pub passed_cases: u64,
    pub average_score: f64,
    pub overall_pass: bool,
    pub pass_threshold: f64,
}

impl TestRun {
    /// Create a fresh run in `running` status with zeroed aggregates.
    pub fn new(target_model: &str, prompt: &str, pass_threshold: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            status: RunStatus::Running,
            target_model: target_model.to_string(),
            prompt: prompt.to_string(),
            total_cases: 0,
            passed_cases: 0,
            average_score: 0.0,
            overall_pass: false,
            pass_threshold,
        }
    }
}

/// One test input within a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCase {
    pub id: Uuid,
    pub run_id: Uuid,
    pub input_text: String,
    pub expected_output: Option<String>,
    /// Opaque caller-supplied metadata (tags, scenario names, etc.).
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl TestCase {
    pub fn new(run_id: Uuid, spec: &CaseSpec) -> Self {
        Self {
            id: Uuid::new_v4(),
            run_id,
            input_text: spec.input.clone(),
            expected_output: spec.expected_output.clone(),
            metadata: spec.metadata.clone(),
            created_at: Utc::now(),
        }
    }
}

/// The scored outcome of executing one test case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalResult {
    pub id: Uuid,
    pub test_case_id: Uuid,
    pub model_output: String,
    /// 0.0, 0.5, or 1.0 by construction (see [`crate::scoring`]).
    pub heuristic_score: f64,
    /// Always clamped to [0, 1] regardless of what the judge returned.
    pub judge_score: f64,
    pub combined_score: f64,
    pub passed: bool,
    pub judge_reasoning: String,
    pub created_at: DateTime<Utc>,
}

/// One test case as submitted by the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseSpec {
    /// Input prompt or message for the target model.
    pub input: String,
    /// Optional expected output used by the substring heuristic.
    #[serde(default)]
    pub expected_output: Option<String>,
    /// Optional metadata for this test case (e.g. tags, scenario).
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

/// Request shape consumed by the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRequest {
    /// System prompt / instructions for the target model.
    pub prompt: String,
    /// Identifier of the target model under test.
    pub target_model: String,
    /// Minimum combined score required to mark a test as passed.
    #[serde(default = "default_threshold")]
    pub pass_threshold: f64,
    pub test_cases: Vec<CaseSpec>,
}

fn default_threshold() -> f64 {
    DEFAULT_PASS_THRESHOLD
}

impl RunRequest {
    /// Reject malformed requests before orchestration begins.
    pub fn validate(&self) -> Result<(), EvalError> {
        if !(0.0..=1.0).contains(&self.pass_threshold) {
            return Err(EvalError::validation(format!(
                "pass_threshold must be within [0, 1], got {}",
                self.pass_threshold
            )));
        }
        if self.prompt.is_empty() {
            return Err(EvalError::validation("prompt must not be empty"));
        }
        if self.target_model.is_empty() {
            return Err(EvalError::validation("target_model must not be empty"));
        }
        Ok(())
    }
}

/// Per-case detail echoed back in the run report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseReport {
    pub test_case_id: Uuid,
    pub input: String,
    pub expected_output: Option<String>,
    pub model_output: String,
    pub heuristic_score: f64,
    pub judge_score: f64,
    pub combined_score: f64,
    pub passed: bool,
    pub judge_reasoning: String,
}

/// Report produced by a completed run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub overall_pass: bool,
    pub average_score: f64,
    pub total_cases: u64,
    pub passed_cases: u64,
    pub pass_threshold: f64,
    pub results: Vec<CaseReport>,
}

/// Aggregate view of a run for listing endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub status: RunStatus,
    pub target_model: String,
    pub total_cases: u64,
    pub passed_cases: u64,
    pub average_score: f64,
    pub overall_pass: bool,
}

/// Full view of a persisted run including per-case results.
///
/// Per-case rows reuse [`CaseReport`], so the detail view and the run
/// report share one shape (the case input is always echoed as `input`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunDetail {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub status: RunStatus,
    pub target_model: String,
    pub prompt: String,
    pub total_cases: u64,
    pub passed_cases: u64,
    pub average_score: f64,
    pub overall_pass: bool,
    pub pass_threshold: f64,
    pub results: Vec<CaseReport>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_status_round_trip() {
        for status in [
            RunStatus::Pending,
            RunStatus::Running,
            RunStatus::Completed,
            RunStatus::Failed,
        ] {
            assert_eq!(RunStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(RunStatus::parse("bogus"), None);
    }

    #[test]
    fn test_request_default_threshold() {
        let req: RunRequest = serde_json::from_str(
            r#"{"prompt": "p", "target_model": "m", "test_cases": []}"#,
        )
        .unwrap();
        assert_eq!(req.pass_threshold, DEFAULT_PASS_THRESHOLD);
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_request_rejects_out_of_range_threshold() {
        for bad in [-0.1, 1.5, 42.0] {
            let req = RunRequest {
                prompt: "p".into(),
                target_model: "m".into(),
                pass_threshold: bad,
                test_cases: vec![],
            };
            assert!(req.validate().is_err(), "threshold {bad} should be rejected");
        }
    }

    #[test]
    fn test_request_rejects_empty_prompt_and_model() {
        let req = RunRequest {
            prompt: String::new(),
            target_model: "m".into(),
            pass_threshold: 0.5,
            test_cases: vec![],
        };
        assert!(req.validate().is_err());

        let req = RunRequest {
            prompt: "p".into(),
            target_model: String::new(),
            pass_threshold: 0.5,
            test_cases: vec![],
        };
        assert!(req.validate().is_err());
    }
}
