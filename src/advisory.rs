//! AI-assisted task breakdown and grading feedback.
//!
//! Both flows render a fixed prompt, send it once to a [`TextGenerator`]
//! together with the JSON schema the answer must follow, and decode the
//! answer strictly. Nothing here writes to the store: callers stage the
//! result and commit it through the lifecycle services.

use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::error::ErrorKind;

pub mod breakdown;
pub mod feedback;
pub mod openai;
pub mod prompts;

use breakdown::{BreakdownInput, BreakdownOutput};
use feedback::{FeedbackDraft, FeedbackInput, FeedbackOutput};

/// A fully rendered generation request. Building one performs no I/O.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptRequest {
    /// Stable name of the prompt, used for logging and as the schema name.
    pub name: &'static str,
    pub prompt: String,
    /// JSON schema of the expected answer.
    pub output_schema: Value,
}

impl PromptRequest {
    pub fn new<T: JsonSchema>(name: &'static str, prompt: String) -> Result<Self, AdvisoryError> {
        let output_schema = serde_json::to_value(schemars::schema_for!(T))
            .map_err(|source| AdvisoryError::OutputSchema { prompt: name, source })?;
        Ok(Self {
            name,
            prompt,
            output_schema,
        })
    }
}

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Text generation request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Text generation backend returned HTTP {status}: {body}")]
    Backend { status: u16, body: String },

    #[error("Text generation backend returned no content")]
    EmptyResponse,

    #[error("Text generation output is not JSON: {0}")]
    MalformedOutput(#[source] serde_json::Error),
}

impl GenerationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GenerationError::Http(_) | GenerationError::Backend { .. } => {
                ErrorKind::TransportFailure
            }
            GenerationError::EmptyResponse | GenerationError::MalformedOutput(_) => {
                ErrorKind::SchemaViolation
            }
        }
    }
}

/// Backend able to answer a prompt with a JSON value.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, request: PromptRequest) -> Result<Value, GenerationError>;
}

#[derive(Debug, Error)]
pub enum AdvisoryError {
    #[error("The {prompt} answer does not match the expected shape: {reason}")]
    SchemaViolation { prompt: &'static str, reason: String },

    #[error("Failed to build the {prompt} output schema: {source}")]
    OutputSchema {
        prompt: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Generation(#[from] GenerationError),
}

impl AdvisoryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AdvisoryError::SchemaViolation { .. } | AdvisoryError::OutputSchema { .. } => {
                ErrorKind::SchemaViolation
            }
            AdvisoryError::Generation(e) => e.kind(),
        }
    }
}

/// Entry point for both advisory flows.
pub struct Advisor<G: ?Sized> {
    generator: Arc<G>,
}

impl<G: ?Sized> Clone for Advisor<G> {
    fn clone(&self) -> Self {
        Self {
            generator: Arc::clone(&self.generator),
        }
    }
}

impl<G: ?Sized> Advisor<G> {
    pub fn new(generator: Arc<G>) -> Self {
        Self { generator }
    }
}

impl<G> Advisor<G>
where
    G: TextGenerator + ?Sized,
{
    /// New task titles for a project. Titles already present in
    /// `input.existing_tasks` are never returned.
    pub async fn suggest_tasks(
        &self,
        input: &BreakdownInput,
    ) -> Result<Vec<String>, AdvisoryError> {
        let request = breakdown::request(input)?;
        let output: BreakdownOutput = self.run(request).await?;
        let suggested = output.tasks.len();
        let accepted = breakdown::accept(input, output);
        debug!(suggested, accepted = accepted.len(), "task breakdown received");
        Ok(accepted)
    }

    /// Narrative feedback and a suggested grade for a project snapshot.
    pub async fn draft_feedback(
        &self,
        input: &FeedbackInput,
    ) -> Result<FeedbackDraft, AdvisoryError> {
        let request = feedback::request(input)?;
        let output: FeedbackOutput = self.run(request).await?;
        let draft =
            feedback::accept(output).inspect_err(|e| warn!(error = %e, "rejected feedback"))?;
        debug!(grade = %draft.suggested_grade, "feedback draft received");
        Ok(draft)
    }

    async fn run<T: DeserializeOwned>(&self, request: PromptRequest) -> Result<T, AdvisoryError> {
        let name = request.name;
        debug!(prompt = name, chars = request.prompt.len(), "sending prompt");
        let raw = self.generator.generate(request).await?;
        serde_json::from_value(raw).map_err(|e| {
            warn!(prompt = name, error = %e, "answer does not match schema");
            AdvisoryError::SchemaViolation {
                prompt: name,
                reason: e.to_string(),
            }
        })
    }
}
