use std::{path::PathBuf, time::Duration};

use clap::Args;
use thiserror::Error;

use crate::{
    advisory::openai::OpenAiConfig,
    models::user::{Actor, Role, UnknownRole},
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("No actor configured; pass --actor or set CLASSWORK_ACTOR")]
    MissingActor,

    #[error(transparent)]
    Role(#[from] UnknownRole),

    #[error("No AI endpoint configured; pass --ai-endpoint or set CLASSWORK_AI_ENDPOINT")]
    MissingEndpoint,

    #[error("Failed to determine a data directory for the store")]
    NoDataDir,
}

/// Options shared by every command.
#[derive(Debug, Args)]
pub struct GlobalArgs {
    /// Path of the JSON store
    #[arg(long, global = true, env = "CLASSWORK_STORE")]
    pub store: Option<PathBuf>,

    /// Id of the user running the command
    #[arg(long, global = true, env = "CLASSWORK_ACTOR")]
    pub actor: Option<String>,

    /// Role of that user (lecturer or student)
    #[arg(long, global = true, env = "CLASSWORK_ROLE", default_value = "student")]
    pub role: String,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(flatten)]
    pub ai: AiArgs,
}

#[derive(Debug, Args)]
pub struct AiArgs {
    /// Base URL of an OpenAI-compatible API
    #[arg(long = "ai-endpoint", global = true, env = "CLASSWORK_AI_ENDPOINT")]
    pub endpoint: Option<String>,

    #[arg(
        long = "ai-model",
        global = true,
        env = "CLASSWORK_AI_MODEL",
        default_value = "gpt-4o-mini"
    )]
    pub model: String,

    #[arg(
        long = "ai-api-key",
        global = true,
        env = "CLASSWORK_AI_API_KEY",
        hide_env_values = true
    )]
    pub api_key: Option<String>,

    /// Request timeout in milliseconds
    #[arg(
        long = "ai-timeout-ms",
        global = true,
        env = "CLASSWORK_AI_TIMEOUT_MS",
        default_value_t = 60_000
    )]
    pub timeout_ms: u64,
}

impl GlobalArgs {
    pub fn store_path(&self) -> Result<PathBuf, ConfigError> {
        if let Some(path) = &self.store {
            return Ok(path.clone());
        }
        dirs::data_local_dir()
            .map(|dir| dir.join("classwork").join("store.json"))
            .ok_or(ConfigError::NoDataDir)
    }

    pub fn actor(&self) -> Result<Actor, ConfigError> {
        let id = self
            .actor
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or(ConfigError::MissingActor)?;
        let role: Role = self.role.parse()?;
        Ok(Actor {
            id: id.to_string(),
            role,
        })
    }
}

impl AiArgs {
    pub fn openai_config(&self) -> Result<OpenAiConfig, ConfigError> {
        let endpoint = self.endpoint.clone().ok_or(ConfigError::MissingEndpoint)?;
        Ok(OpenAiConfig {
            endpoint,
            model: self.model.clone(),
            api_key: self.api_key.clone(),
            timeout: Duration::from_millis(self.timeout_ms),
        })
    }
}
