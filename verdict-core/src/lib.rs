//! # verdict-core — the evaluation run pipeline
//!
//! Runs automated evaluations of an AI model's responses against a set of
//! test cases, scores each response with a blended heuristic + judge-model
//! score, and persists structured results for later inspection.
//!
//! Control flow per run: [`runner::EvalRunner`] drives each test case
//! through the [`invoker::TargetInvoker`], scores the response with
//! [`scoring::heuristic_score`] and a [`judge::Judge`], blends the two via
//! [`scoring::combine`], persists everything through [`store::EvalStore`],
//! and aggregates case outcomes into a run-level verdict.

pub mod config;
pub mod error;
pub mod invoker;
pub mod judge;
pub mod runner;
pub mod scoring;
pub mod store;
pub mod types;

pub use config::{VerdictConfig, load_config};
pub use error::EvalError;
pub use runner::EvalRunner;
pub use store::EvalStore;
pub use types::{DEFAULT_PASS_THRESHOLD, RunReport, RunRequest};
