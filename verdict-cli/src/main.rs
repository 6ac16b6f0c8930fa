//! Verdict CLI — drives the eval HTTP API from pipelines and terminals.
//!
//! `verdict gate` is the CI entry point: it submits an evaluation run and
//! exits non-zero unless the run passes, so a pipeline step fails exactly
//! when the model under test regresses.

use anyhow::{Context, bail};
use clap::Parser;
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use verdict_core::types::{CaseSpec, DEFAULT_PASS_THRESHOLD, RunReport, RunRequest};

/// Verdict: evaluation runs as a CI gate
#[derive(Parser, Debug)]
#[command(name = "verdict", version, about, long_about = None)]
struct Cli {
    /// Base URL of the Verdict API
    #[arg(long, env = "VERDICT_API_URL", default_value = "http://127.0.0.1:8088")]
    api_url: String,

    /// API key sent in the x-api-key header
    #[arg(long, env = "VERDICT_API_KEY")]
    api_key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Submit an evaluation run and exit non-zero unless it passes
    Gate {
        /// JSON file with the test cases (array of {input, expected_output?, metadata?});
        /// the built-in smoke suite is used when omitted
        #[arg(long)]
        cases: Option<PathBuf>,

        /// System prompt for the target model
        #[arg(long, default_value = "You are a helpful, concise assistant.")]
        prompt: String,

        /// Identifier of the target model under test
        #[arg(long, default_value = "stub-ci-model")]
        target_model: String,

        /// Minimum average combined score required to pass
        #[arg(long, default_value_t = DEFAULT_PASS_THRESHOLD)]
        threshold: f64,
    },
    /// List recent evaluation runs
    Runs {
        #[arg(long, default_value_t = 20)]
        limit: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let client = Client::builder()
        .timeout(Duration::from_secs(60))
        .build()
        .context("Failed to build HTTP client")?;

    let passed = match &cli.command {
        Commands::Gate {
            cases,
            prompt,
            target_model,
            threshold,
        } => {
            let test_cases = match cases {
                Some(path) => load_cases(path)?,
                None => smoke_cases(),
            };
            let request = RunRequest {
                prompt: prompt.clone(),
                target_model: target_model.clone(),
                pass_threshold: *threshold,
                test_cases,
            };
            run_gate(&client, &cli, &request).await?
        }
        Commands::Runs { limit } => {
            list_runs(&client, &cli, *limit).await?;
            true
        }
    };

    if !passed {
        std::process::exit(1);
    }
    Ok(())
}

/// The smoke suite from CI: three echo cases the stub invoker satisfies.
fn smoke_cases() -> Vec<CaseSpec> {
    ["Hello", "What is 2+2?", "Summarize: GitHub Actions"]
        .into_iter()
        .map(|input| CaseSpec {
            input: input.to_string(),
            expected_output: Some(format!("Input: {input}")),
            metadata: None,
        })
        .collect()
}

fn load_cases(path: &Path) -> anyhow::Result<Vec<CaseSpec>> {
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read cases file {}", path.display()))?;
    let cases: Vec<CaseSpec> = serde_json::from_str(&data)
        .with_context(|| format!("Invalid cases file {}", path.display()))?;
    if cases.is_empty() {
        bail!("Cases file {} contains no test cases", path.display());
    }
    Ok(cases)
}

fn endpoint(cli: &Cli, path: &str) -> String {
    format!("{}{path}", cli.api_url.trim_end_matches('/'))
}

fn with_auth(cli: &Cli, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
    match &cli.api_key {
        Some(key) => builder.header("x-api-key", key),
        None => builder,
    }
}

async fn run_gate(client: &Client, cli: &Cli, request: &RunRequest) -> anyhow::Result<bool> {
    let url = endpoint(cli, "/v1/evals/run");
    println!("Calling eval API at {url}");

    let response = with_auth(cli, client.post(&url))
        .json(request)
        .send()
        .await
        .context("Request to eval API failed")?;

    let status = response.status();
    let body = response
        .text()
        .await
        .context("Failed to read eval API response")?;

    if !status.is_success() {
        eprintln!("ERROR: eval API returned HTTP {status}: {body}");
        return Ok(false);
    }

    let report: RunReport =
        serde_json::from_str(&body).context("Could not parse eval API response as a run report")?;

    for result in &report.results {
        let mark = if result.passed { "PASS" } else { "FAIL" };
        println!(
            "[{mark}] {:<40} heuristic={:.2} judge={:.2} combined={:.2}",
            truncate(&result.input, 40),
            result.heuristic_score,
            result.judge_score,
            result.combined_score,
        );
        if !result.passed {
            println!("       judge: {}", result.judge_reasoning);
        }
    }

    println!(
        "Run {}: {}/{} cases passed, average {:.3} (threshold {:.2})",
        report.run_id,
        report.passed_cases,
        report.total_cases,
        report.average_score,
        report.pass_threshold,
    );

    if report.overall_pass {
        println!("EVAL PASSED");
    } else {
        eprintln!("EVAL FAILED");
    }
    Ok(report.overall_pass)
}

async fn list_runs(client: &Client, cli: &Cli, limit: u64) -> anyhow::Result<()> {
    let url = endpoint(cli, &format!("/v1/evals?limit={limit}"));
    let response = with_auth(cli, client.get(&url))
        .send()
        .await
        .context("Request to eval API failed")?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        bail!("eval API returned HTTP {status}: {body}");
    }

    let listing: serde_json::Value = response
        .json()
        .await
        .context("Could not parse eval API response")?;

    let items = listing["items"].as_array().cloned().unwrap_or_default();
    println!("{} run(s), showing {}", listing["total"], items.len());
    for item in items {
        println!(
            "{}  {}  {:<9}  {}/{} passed  avg {:.3}  model {}",
            item["id"].as_str().unwrap_or("?"),
            item["created_at"].as_str().unwrap_or("?"),
            item["status"].as_str().unwrap_or("?"),
            item["passed_cases"],
            item["total_cases"],
            item["average_score"].as_f64().unwrap_or(0.0),
            item["target_model"].as_str().unwrap_or("?"),
        );
    }
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{cut}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_smoke_cases_match_stub_echo() {
        let cases = smoke_cases();
        assert_eq!(cases.len(), 3);
        for case in &cases {
            let expected = case.expected_output.as_deref().unwrap();
            assert_eq!(expected, format!("Input: {}", case.input));
        }
    }

    #[test]
    fn test_load_cases_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("cases.json");
        std::fs::write(
            &path,
            r#"[{"input": "Hi", "expected_output": "Input: Hi", "metadata": {"tag": "smoke"}}]"#,
        )
        .unwrap();
        let cases = load_cases(&path).unwrap();
        assert_eq!(cases.len(), 1);
        assert_eq!(cases[0].input, "Hi");
        assert_eq!(cases[0].metadata.as_ref().unwrap()["tag"], "smoke");
    }

    #[test]
    fn test_load_cases_rejects_empty_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("cases.json");
        std::fs::write(&path, "[]").unwrap();
        assert!(load_cases(&path).is_err());
    }

    #[test]
    fn test_truncate_preserves_short_strings() {
        assert_eq!(truncate("short", 40), "short");
        assert_eq!(truncate("abcdefgh", 6), "abc...");
    }
}
