use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    advisory::{AdvisoryError, PromptRequest, prompts},
    models::{
        project::{Grade, Project},
        status::Status,
        task::{Task, arrange},
        user::Actor,
    },
    services::{
        projects::fetch_project,
        tasks::{TaskError, list_tasks},
    },
    storage::DocumentStore,
};

pub const PROMPT_NAME: &str = "grading_feedback";

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackInput {
    pub project_title: String,
    pub project_description: String,
    pub tasks: Vec<TaskDetail>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TaskDetail {
    pub title: String,
    pub status: Status,
    pub subtasks: Vec<SubtaskDetail>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SubtaskDetail {
    pub title: String,
    pub status: Status,
}

/// Snapshot of a project and its task tree, in creation order. Subtasks whose
/// parent is missing are left out.
pub fn feedback_snapshot(project: &Project, tasks: Vec<Task>) -> FeedbackInput {
    let tasks = arrange(tasks)
        .into_iter()
        .map(|node| TaskDetail {
            title: node.task.title,
            status: node.task.status,
            subtasks: node
                .subtasks
                .into_iter()
                .map(|subtask| SubtaskDetail {
                    title: subtask.title,
                    status: subtask.status,
                })
                .collect(),
        })
        .collect();

    FeedbackInput {
        project_title: project.title.clone(),
        project_description: project.description.clone(),
        tasks,
    }
}

pub async fn gather_feedback_input<S>(
    storage: &S,
    actor: &Actor,
    project_id: Uuid,
) -> Result<FeedbackInput, TaskError>
where
    S: DocumentStore + ?Sized,
{
    let tasks = list_tasks(storage, actor, project_id).await?;
    let project = fetch_project(storage, project_id)
        .await?
        .ok_or(TaskError::ProjectNotFound(project_id))?;
    Ok(feedback_snapshot(&project, tasks))
}

#[derive(Deserialize, JsonSchema, Debug)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FeedbackOutput {
    /// Constructive feedback addressed to the student
    pub feedback: String,
    /// Suggested grade between 0 and 100
    #[schemars(range(min = 0, max = 100))]
    pub suggested_grade: f64,
}

/// A reviewed-before-saving assessment. Nothing is persisted until a lecturer
/// submits it through grading.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedbackDraft {
    pub feedback: String,
    pub suggested_grade: Grade,
}

pub fn request(input: &FeedbackInput) -> Result<PromptRequest, AdvisoryError> {
    PromptRequest::new::<FeedbackOutput>(PROMPT_NAME, prompts::feedback(input))
}

/// Out-of-range grades are rejected, not clamped.
pub fn accept(output: FeedbackOutput) -> Result<FeedbackDraft, AdvisoryError> {
    let feedback = output.feedback.trim();
    if feedback.is_empty() {
        return Err(AdvisoryError::SchemaViolation {
            prompt: PROMPT_NAME,
            reason: String::from("feedback is empty"),
        });
    }

    let suggested_grade =
        Grade::new(output.suggested_grade).map_err(|e| AdvisoryError::SchemaViolation {
            prompt: PROMPT_NAME,
            reason: e.to_string(),
        })?;

    Ok(FeedbackDraft {
        feedback: feedback.to_string(),
        suggested_grade,
    })
}
