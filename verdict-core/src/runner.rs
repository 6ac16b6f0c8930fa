//! Run orchestrator — drives the per-case evaluation loop.
//!
//! Cases are processed one at a time, in input order, with no overlap
//! between a case's model invocation, judge invocation, and persistence.
//! The invoker and judge are injected as trait objects so the same loop
//! serves production, CI, and tests.

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::EvalError;
use crate::invoker::TargetInvoker;
use crate::judge::Judge;
use crate::scoring::{combine, heuristic_score};
use crate::store::EvalStore;
use crate::types::{CaseReport, EvalResult, RunReport, RunRequest, TestCase, TestRun};

/// Orchestrates evaluation runs over an injected invoker, judge, and store.
pub struct EvalRunner<'a> {
    store: &'a EvalStore,
    invoker: &'a dyn TargetInvoker,
    judge: &'a dyn Judge,
}

impl<'a> EvalRunner<'a> {
    pub fn new(store: &'a EvalStore, invoker: &'a dyn TargetInvoker, judge: &'a dyn Judge) -> Self {
        Self {
            store,
            invoker,
            judge,
        }
    }

    /// Execute a full evaluation run and return its report.
    ///
    /// A target-model invocation failure aborts the run: the run record is
    /// marked `failed` (cases and results persisted so far are preserved)
    /// and the error propagates. Judge failures never abort — they degrade
    /// to a zero judge score inside [`crate::judge`].
    pub async fn run(&self, request: &RunRequest) -> Result<RunReport, EvalError> {
        let run = TestRun::new(
            &request.target_model,
            &request.prompt,
            request.pass_threshold,
        );
        self.store.insert_run(&run)?;

        info!(
            run_id = %run.id,
            target_model = %run.target_model,
            cases = request.test_cases.len(),
            threshold = run.pass_threshold,
            "Starting evaluation run"
        );

        let mut passed_cases: u64 = 0;
        let mut total_score = 0.0;
        let mut results = Vec::with_capacity(request.test_cases.len());

        for spec in &request.test_cases {
            let case = TestCase::new(run.id, spec);
            self.store.insert_case(&case)?;

            let model_output = match self
                .invoker
                .invoke(&request.prompt, &case.input_text, &request.target_model)
                .await
            {
                Ok(output) => output,
                Err(e) => {
                    warn!(run_id = %run.id, case_id = %case.id, error = %e,
                          "Target model invocation failed; aborting run");
                    self.abort(run.id);
                    return Err(e.into());
                }
            };

            let heuristic = heuristic_score(&model_output, case.expected_output.as_deref());
            let judgement = self
                .judge
                .score_output(
                    &request.prompt,
                    &case.input_text,
                    &model_output,
                    case.expected_output.as_deref(),
                )
                .await;
            let (combined, passed) = combine(heuristic, judgement.score, request.pass_threshold);

            debug!(
                run_id = %run.id,
                case_id = %case.id,
                heuristic,
                judge = judgement.score,
                combined,
                passed,
                "Scored test case"
            );

            let result = EvalResult {
                id: Uuid::new_v4(),
                test_case_id: case.id,
                model_output: model_output.clone(),
                heuristic_score: heuristic,
                judge_score: judgement.score,
                combined_score: combined,
                passed,
                judge_reasoning: judgement.reasoning.clone(),
                created_at: Utc::now(),
            };
            self.store.insert_result(&result)?;

            if passed {
                passed_cases += 1;
            }
            total_score += combined;

            results.push(CaseReport {
                test_case_id: case.id,
                input: case.input_text,
                expected_output: case.expected_output,
                model_output,
                heuristic_score: heuristic,
                judge_score: judgement.score,
                combined_score: combined,
                passed,
                judge_reasoning: judgement.reasoning,
            });
        }

        let total_cases = request.test_cases.len() as u64;
        let average_score = if total_cases > 0 {
            total_score / total_cases as f64
        } else {
            0.0
        };
        let overall_pass = average_score >= request.pass_threshold;

        self.store
            .finalize_run(run.id, total_cases, passed_cases, average_score, overall_pass)?;

        info!(
            run_id = %run.id,
            total_cases,
            passed_cases,
            average_score,
            overall_pass,
            "Evaluation run completed"
        );

        Ok(RunReport {
            run_id: run.id,
            overall_pass,
            average_score,
            total_cases,
            passed_cases,
            pass_threshold: request.pass_threshold,
            results,
        })
    }

    /// Best-effort `failed` mark; the original error stays the headline.
    fn abort(&self, run_id: Uuid) {
        if let Err(e) = self.store.mark_run_failed(run_id) {
            warn!(run_id = %run_id, error = %e, "Failed to mark aborted run as failed");
        }
    }
}
