//! LLM judge — second opinion on every model response.
//!
//! The external judge is an untrusted numeric oracle: its score is clamped
//! to [0, 1] and its reply is parsed defensively. Any failure of a judge
//! call — transport, malformed JSON, bad field types — degrades locally to
//! a zero score with a diagnostic rationale rather than propagating, so one
//! broken judge reply cannot invalidate the other cases of a run. The
//! `Judge` trait is therefore infallible by contract.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::config::JudgeConfig;
use crate::error::ConfigError;

/// Instructions sent as the judge's system prompt.
const GRADING_PROMPT: &str = "You are an expert evaluator for an AI-powered product.
You are given:
- The original system prompt or instructions.
- A test input.
- The model's output.
- (Optionally) an expected or reference output.

Your job is to:
1. Decide how well the model output follows the instructions and satisfies the user intent.
2. Consider both correctness and helpfulness.
3. Return:
   - A numeric score between 0.0 and 1.0 (1.0 is perfect).
   - A short explanation of your reasoning.

Be strict but fair. Minor issues should reduce the score slightly; major failures should produce a low score.";

/// Trailing instruction pinning the judge to a strict JSON reply.
const FORMAT_INSTRUCTION: &str = "Respond strictly in JSON with keys 'score' (float 0-1) and \
'reason' (string). Example: {\"score\": 0.82, \"reason\": \"...\"}";

/// Rationale used when the judge reply parsed but carried no `reason`.
const NO_REASONING: &str = "No reasoning provided";

/// A judge's verdict on one model output.
#[derive(Debug, Clone, PartialEq)]
pub struct Judgement {
    /// Quality score, always within [0, 1].
    pub score: f64,
    /// Free-text rationale; never empty.
    pub reasoning: String,
}

/// Scores a model output given the full grading context.
#[async_trait]
pub trait Judge: Send + Sync {
    async fn score_output(
        &self,
        system_prompt: &str,
        test_input: &str,
        model_output: &str,
        expected_output: Option<&str>,
    ) -> Judgement;
}

/// Judge backed by an OpenAI-compatible chat completions endpoint.
pub struct LlmJudge {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f64,
}

impl LlmJudge {
    /// Create a judge from configuration.
    ///
    /// The judge credential is resolved here; a missing credential is a
    /// fatal configuration error raised before any run starts.
    pub fn new(config: &JudgeConfig) -> Result<Self, ConfigError> {
        let api_key = config.resolve_api_key()?;
        Ok(Self {
            client: Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }

    fn grading_request(
        &self,
        system_prompt: &str,
        test_input: &str,
        model_output: &str,
        expected_output: Option<&str>,
    ) -> Value {
        let mut user_content = format!(
            "System prompt / instructions:\n{system_prompt}\n\n\
             Test input:\n{test_input}\n\n\
             Model output:\n{model_output}"
        );
        if let Some(expected) = expected_output {
            user_content.push_str(&format!("\n\nExpected / reference output:\n{expected}"));
        }

        json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": GRADING_PROMPT },
                { "role": "user", "content": user_content },
                { "role": "system", "content": FORMAT_INSTRUCTION },
            ],
            "temperature": self.temperature,
            "stream": false,
        })
    }

    async fn call_judge(&self, body: Value) -> Result<String, String> {
        let url = format!("{}/chat/completions", self.base_url);

        debug!(url = %url, model = %self.model, "Sending judge request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| format!("judge request failed: {e}"))?;

        let status = response.status();
        let response_body = response
            .text()
            .await
            .map_err(|e| format!("failed to read judge response body: {e}"))?;

        if !status.is_success() {
            return Err(format!("judge returned HTTP {status}: {response_body}"));
        }

        let value: Value = serde_json::from_str(&response_body)
            .map_err(|e| format!("judge response was not JSON: {e}"))?;

        Ok(value["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or("{}")
            .to_string())
    }
}

#[async_trait]
impl Judge for LlmJudge {
    async fn score_output(
        &self,
        system_prompt: &str,
        test_input: &str,
        model_output: &str,
        expected_output: Option<&str>,
    ) -> Judgement {
        let body = self.grading_request(system_prompt, test_input, model_output, expected_output);
        match self.call_judge(body).await {
            Ok(content) => parse_judgement(&content),
            Err(message) => {
                // Local degrade: a broken judge call scores this case 0.0
                // but must not abort the run.
                warn!(error = %message, "Judge call failed; degrading to score 0.0");
                Judgement {
                    score: 0.0,
                    reasoning: format!("Judge call failed: {message}"),
                }
            }
        }
    }
}

/// Parse the judge's reply content into a [`Judgement`].
///
/// Expects a JSON object with `score` (float) and `reason` (string). The
/// score is clamped to [0, 1] regardless of what the judge returned; a
/// missing `score` counts as 0.0 and a missing `reason` falls back to a
/// placeholder. Content that is not a JSON object, or whose `score` cannot
/// be coerced to a float, yields score 0.0 with the raw content embedded in
/// the rationale for diagnosability.
pub fn parse_judgement(content: &str) -> Judgement {
    let Ok(Value::Object(map)) = serde_json::from_str::<Value>(content) else {
        return unparsable(content);
    };
    let raw_score = match map.get("score") {
        None => 0.0,
        Some(v) => match coerce_score(v) {
            Some(f) => f,
            None => return unparsable(content),
        },
    };
    let reasoning = map
        .get("reason")
        .and_then(Value::as_str)
        .unwrap_or(NO_REASONING)
        .to_string();
    Judgement {
        score: raw_score.clamp(0.0, 1.0),
        reasoning,
    }
}

/// Coerce a JSON value to a float score; judges occasionally quote numbers.
fn coerce_score(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn unparsable(content: &str) -> Judgement {
    Judgement {
        score: 0.0,
        reasoning: format!("Failed to parse judge response: {content:?}"),
    }
}

/// Deterministic judge returning a fixed verdict; for tests and dry runs.
#[derive(Debug, Clone)]
pub struct FixedJudge {
    pub score: f64,
    pub reasoning: String,
}

impl FixedJudge {
    pub fn new(score: f64, reasoning: impl Into<String>) -> Self {
        Self {
            score,
            reasoning: reasoning.into(),
        }
    }
}

#[async_trait]
impl Judge for FixedJudge {
    async fn score_output(
        &self,
        _system_prompt: &str,
        _test_input: &str,
        _model_output: &str,
        _expected_output: Option<&str>,
    ) -> Judgement {
        Judgement {
            score: self.score.clamp(0.0, 1.0),
            reasoning: self.reasoning.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_well_formed_reply() {
        let j = parse_judgement(r#"{"score": 0.82, "reason": "Clear and correct."}"#);
        assert_eq!(j.score, 0.82);
        assert_eq!(j.reasoning, "Clear and correct.");
    }

    #[test]
    fn test_parse_clamps_score_above_one() {
        let j = parse_judgement(r#"{"score": 5, "reason": "overenthusiastic"}"#);
        assert_eq!(j.score, 1.0);
    }

    #[test]
    fn test_parse_clamps_negative_score() {
        let j = parse_judgement(r#"{"score": -3, "reason": "harsh"}"#);
        assert_eq!(j.score, 0.0);
    }

    #[test]
    fn test_parse_missing_reason_uses_placeholder() {
        let j = parse_judgement(r#"{"score": 0.5}"#);
        assert_eq!(j.score, 0.5);
        assert_eq!(j.reasoning, NO_REASONING);
    }

    #[test]
    fn test_parse_non_json_degrades_with_diagnostic() {
        let j = parse_judgement("I refuse to answer in JSON.");
        assert_eq!(j.score, 0.0);
        assert!(!j.reasoning.is_empty());
        assert!(j.reasoning.contains("I refuse to answer in JSON."));
    }

    #[test]
    fn test_parse_non_numeric_score_degrades() {
        let j = parse_judgement(r#"{"score": "excellent", "reason": "typed wrong"}"#);
        assert_eq!(j.score, 0.0);
        assert!(j.reasoning.contains("Failed to parse judge response"));
    }

    #[test]
    fn test_parse_missing_score_defaults_to_zero() {
        let j = parse_judgement(r#"{"reason": "forgot the number"}"#);
        assert_eq!(j.score, 0.0);
        assert_eq!(j.reasoning, "forgot the number");
    }

    #[test]
    fn test_parse_quoted_score_coerces() {
        let j = parse_judgement(r#"{"score": "0.9", "reason": "quoted"}"#);
        assert_eq!(j.score, 0.9);
    }

    #[test]
    fn test_parse_non_object_degrades() {
        let j = parse_judgement(r#"[0.9, "an array"]"#);
        assert_eq!(j.score, 0.0);
        assert!(j.reasoning.contains("Failed to parse judge response"));
    }

    #[tokio::test]
    async fn test_fixed_judge_clamps() {
        let judge = FixedJudge::new(2.0, "stub");
        let j = judge.score_output("p", "i", "o", None).await;
        assert_eq!(j.score, 1.0);
        assert_eq!(j.reasoning, "stub");
    }

    #[tokio::test]
    async fn test_transport_failure_degrades_locally() {
        unsafe { std::env::set_var("VERDICT_TEST_JUDGE_KEY", "test-key") };
        let config = JudgeConfig {
            api_key_env: "VERDICT_TEST_JUDGE_KEY".to_string(),
            // Nothing listens here; the call fails at connect time.
            base_url: "http://127.0.0.1:9".to_string(),
            ..JudgeConfig::default()
        };
        let judge = LlmJudge::new(&config).unwrap();

        let j = judge.score_output("p", "i", "o", None).await;
        assert_eq!(j.score, 0.0);
        assert!(j.reasoning.contains("Judge call failed"));
    }

    #[test]
    fn test_llm_judge_requires_credential() {
        let config = JudgeConfig {
            api_key_env: "VERDICT_TEST_NO_SUCH_JUDGE_KEY".to_string(),
            ..JudgeConfig::default()
        };
        assert!(matches!(
            LlmJudge::new(&config),
            Err(ConfigError::MissingCredential { .. })
        ));
    }
}
