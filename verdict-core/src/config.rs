//! Configuration for the Verdict evaluation service.
//!
//! Uses `figment` for layered configuration: defaults -> TOML file ->
//! `VERDICT_`-prefixed environment variables. The resulting config structs
//! are constructed once at process start and passed by reference into the
//! components that need them — there is no global settings accessor.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Top-level configuration for the Verdict service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VerdictConfig {
    /// HTTP API configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Judge model configuration.
    #[serde(default)]
    pub judge: JudgeConfig,
    /// Target-model invoker configuration.
    #[serde(default)]
    pub invoker: InvokerConfig,
    /// SQLite storage configuration.
    #[serde(default)]
    pub storage: StorageConfig,
}

impl VerdictConfig {
    /// Reject values the figment layering cannot check on its own.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.judge.temperature) {
            return Err(ConfigError::Invalid {
                message: format!(
                    "judge.temperature must be within [0, 2], got {}",
                    self.judge.temperature
                ),
            });
        }
        Ok(())
    }
}

/// HTTP API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address for the HTTP listener.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// Shared secret checked against the `x-api-key` header.
    ///
    /// When unset, auth is disabled (open mode, useful for local dev).
    #[serde(default)]
    pub api_key: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            api_key: None,
        }
    }
}

fn default_bind_addr() -> String {
    "127.0.0.1:8088".to_string()
}

/// Configuration for the external judging model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgeConfig {
    /// Judge model identifier.
    #[serde(default = "default_judge_model")]
    pub model: String,
    /// Base URL of the OpenAI-compatible endpoint serving the judge.
    #[serde(default = "default_judge_base_url")]
    pub base_url: String,
    /// Environment variable holding the judge API key.
    #[serde(default = "default_judge_api_key_env")]
    pub api_key_env: String,
    /// Sampling temperature for judge calls. Kept at 0.0 so judgements
    /// lean deterministic.
    #[serde(default)]
    pub temperature: f64,
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            model: default_judge_model(),
            base_url: default_judge_base_url(),
            api_key_env: default_judge_api_key_env(),
            temperature: 0.0,
        }
    }
}

impl JudgeConfig {
    /// Resolve the judge API credential from the configured environment
    /// variable.
    ///
    /// Absence of the credential is a fatal configuration error: the judge
    /// cannot be constructed without it.
    pub fn resolve_api_key(&self) -> Result<String, ConfigError> {
        std::env::var(&self.api_key_env).map_err(|_| ConfigError::MissingCredential {
            var: self.api_key_env.clone(),
        })
    }
}

fn default_judge_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_judge_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_judge_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

/// Which target-model invoker implementation to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvokerMode {
    /// Deterministic echo template; no network. Default, and what CI uses.
    Stub,
    /// OpenAI-compatible chat completions endpoint.
    Http,
}

/// Target-model invoker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvokerConfig {
    /// Invoker implementation selector.
    #[serde(default = "default_invoker_mode")]
    pub mode: InvokerMode,
    /// Base URL for the `http` mode.
    #[serde(default = "default_judge_base_url")]
    pub base_url: String,
    /// Environment variable holding the target endpoint API key (`http` mode).
    #[serde(default = "default_judge_api_key_env")]
    pub api_key_env: String,
}

impl Default for InvokerConfig {
    fn default() -> Self {
        Self {
            mode: default_invoker_mode(),
            base_url: default_judge_base_url(),
            api_key_env: default_judge_api_key_env(),
        }
    }
}

fn default_invoker_mode() -> InvokerMode {
    InvokerMode::Stub
}

/// SQLite storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("verdict.db")
}

/// Load configuration with layering: defaults -> TOML file -> environment.
///
/// Environment variables use the `VERDICT_` prefix with `__` separating
/// nesting levels, e.g. `VERDICT_SERVER__API_KEY`, `VERDICT_JUDGE__MODEL`.
pub fn load_config(config_file: Option<&Path>) -> Result<VerdictConfig, ConfigError> {
    let mut figment = Figment::from(Serialized::defaults(VerdictConfig::default()));

    if let Some(path) = config_file {
        figment = figment.merge(Toml::file(path));
    }

    figment = figment.merge(Env::prefixed("VERDICT_").split("__"));

    let config: VerdictConfig = figment.extract().map_err(|e| ConfigError::LoadFailed {
        message: e.to_string(),
    })?;
    config.validate()?;
    Ok(config)
}
