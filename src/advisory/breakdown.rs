use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    advisory::{AdvisoryError, PromptRequest, prompts},
    models::{task::Task, user::Actor},
    services::tasks::{CreateTaskParameters, TaskError, create_task},
    storage::DocumentStore,
};

pub const PROMPT_NAME: &str = "task_breakdown";

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BreakdownInput {
    pub title: String,
    pub description: String,
    /// Titles already present on the project; never suggested again.
    pub existing_tasks: Vec<String>,
}

impl BreakdownInput {
    pub fn for_project(title: &str, description: &str, tasks: &[Task]) -> Self {
        Self {
            title: title.to_string(),
            description: description.to_string(),
            existing_tasks: tasks.iter().map(|t| t.title.clone()).collect(),
        }
    }
}

#[derive(Deserialize, JsonSchema, Debug)]
#[serde(deny_unknown_fields)]
pub struct BreakdownOutput {
    /// Suggested task titles
    pub tasks: Vec<String>,
}

pub fn request(input: &BreakdownInput) -> Result<PromptRequest, AdvisoryError> {
    PromptRequest::new::<BreakdownOutput>(PROMPT_NAME, prompts::breakdown(input))
}

/// Trims the suggestions and drops blanks, existing titles and repeats.
pub fn accept(input: &BreakdownInput, output: BreakdownOutput) -> Vec<String> {
    let mut accepted: Vec<String> = Vec::with_capacity(output.tasks.len());
    for title in output.tasks {
        let title = title.trim();
        let duplicate = input.existing_tasks.iter().any(|t| t.trim() == title)
            || accepted.iter().any(|t| t == title);
        if title.is_empty() || duplicate {
            continue;
        }
        accepted.push(title.to_string());
    }
    accepted
}

#[derive(Debug, Default)]
pub struct CommitReport {
    pub created: Vec<Task>,
    pub failed: Vec<(String, TaskError)>,
    pub promoted_project: bool,
}

/// Creates one task per selected title, in order. Each creation stands on its
/// own: a failure is recorded and the remaining titles are still attempted.
pub async fn commit_suggestions<S>(
    storage: &S,
    actor: &Actor,
    project_id: Uuid,
    titles: Vec<String>,
) -> CommitReport
where
    S: DocumentStore + ?Sized,
{
    let mut report = CommitReport::default();
    for title in titles {
        let parameters = CreateTaskParameters::new(project_id, title.clone());
        match create_task(storage, actor, parameters).await {
            Ok(created) => {
                report.promoted_project |= created.promoted_project;
                report.created.push(created.task);
            }
            Err(e) => {
                warn!(%project_id, %title, error = %e, "suggested task not created");
                report.failed.push((title, e));
            }
        }
    }
    info!(
        %project_id,
        created = report.created.len(),
        failed = report.failed.len(),
        "suggestions committed"
    );
    report
}
