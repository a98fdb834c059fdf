use serde_json::json;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    error::ErrorKind,
    models::{
        status::Status,
        task::{NewTask, Task},
        user::Actor,
    },
    services::{
        AccessDenied,
        projects::fetch_project,
        validation::{self, ValidationError},
    },
    storage::{
        BatchOperation, Collection, Document, DocumentStore, Filter, StorageError,
        from_document, to_document,
    },
};

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("Project '{0}' not found")]
    ProjectNotFound(Uuid),

    #[error("Task '{0}' not found")]
    TaskNotFound(Uuid),

    #[error("Parent task '{0}' not found")]
    ParentNotFound(Uuid),

    #[error("Invalid task: {0}")]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    AccessDenied(#[from] AccessDenied),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl TaskError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TaskError::ProjectNotFound(_)
            | TaskError::TaskNotFound(_)
            | TaskError::ParentNotFound(_) => ErrorKind::NotFound,
            TaskError::Validation(_) => ErrorKind::ValidationFailure,
            TaskError::AccessDenied(_) => ErrorKind::PermissionDenied,
            TaskError::Storage(e) => e.kind(),
        }
    }
}

async fn fetch_task<S>(storage: &S, task_id: Uuid) -> Result<Option<Task>, StorageError>
where
    S: DocumentStore + ?Sized,
{
    match storage.get_document(Collection::Tasks, task_id).await {
        Ok(document) => from_document(Collection::Tasks, document).map(Some),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

pub struct CreateTaskParameters {
    pub project_id: Uuid,
    pub title: String,
    pub status: Status,
    pub parent_id: Option<Uuid>,
}

impl CreateTaskParameters {
    /// A pending top-level task.
    pub fn new(project_id: Uuid, title: impl Into<String>) -> Self {
        Self {
            project_id,
            title: title.into(),
            status: Status::Pending,
            parent_id: None,
        }
    }
}

#[derive(Debug)]
pub struct CreateTaskResult {
    pub task: Task,
    /// Whether this creation moved the project out of Pending.
    pub promoted_project: bool,
}

/// Attempts made by [`create_task`] before giving up on a project that keeps
/// changing underneath it.
const CREATE_ATTEMPTS: usize = 3;

/// Creates a task and, in the same batch, moves a Pending project to
/// In Progress.
///
/// Every batch also updates the project, guarded by the status read before
/// it. A project deleted in the meantime fails the batch with NotFound, and
/// a project whose status moved fails it with a conflict. Either way nothing
/// is written and the project is read again. Of two creations racing on a
/// Pending project, exactly one reports the promotion.
pub async fn create_task<S>(
    storage: &S,
    actor: &Actor,
    parameters: CreateTaskParameters,
) -> Result<CreateTaskResult, TaskError>
where
    S: DocumentStore + ?Sized,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        let (task_id, operations, promotion) = stage_task(storage, actor, &parameters).await?;

        match storage.run_atomic_batch(operations).await {
            Ok(()) => {
                info!(
                    %task_id,
                    project_id = %parameters.project_id,
                    actor = %actor,
                    promoted = promotion.is_some(),
                    "task created"
                );
                let task = fetch_task(storage, task_id)
                    .await?
                    .ok_or(TaskError::TaskNotFound(task_id))?;
                return Ok(CreateTaskResult {
                    task,
                    promoted_project: promotion.is_some(),
                });
            }
            Err(e) if (e.is_conflict() || e.is_not_found()) && attempt < CREATE_ATTEMPTS => {
                debug!(
                    project_id = %parameters.project_id,
                    attempt,
                    error = %e,
                    "project changed during task creation, retrying"
                );
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// Checks the request against the current project and builds the batch.
async fn stage_task<S>(
    storage: &S,
    actor: &Actor,
    parameters: &CreateTaskParameters,
) -> Result<(Uuid, Vec<BatchOperation>, Option<Status>), TaskError>
where
    S: DocumentStore + ?Sized,
{
    let project = fetch_project(storage, parameters.project_id)
        .await?
        .ok_or(TaskError::ProjectNotFound(parameters.project_id))?;
    if !project.is_participant(actor) {
        return Err(AccessDenied::new(actor, "add tasks to this project").into());
    }

    let title = validation::title(&parameters.title)?;

    if let Some(parent_id) = parameters.parent_id {
        let parent = fetch_task(storage, parent_id)
            .await?
            .ok_or(TaskError::ParentNotFound(parent_id))?;
        if parent.project_id != project.id {
            return Err(ValidationError::ParentInOtherProject.into());
        }
        if parent.is_subtask() {
            return Err(ValidationError::NestingTooDeep.into());
        }
    }

    let task_id = storage.new_document_id();
    let task = NewTask {
        project_id: project.id,
        title,
        status: parameters.status,
        parent_id: parameters.parent_id,
        created_by: actor.id.clone(),
    };

    let promotion = project.status.after_task_created();
    let project_fields = match promotion {
        Some(next) => to_document(&json!({ "status": next }))?,
        None => Document::new(),
    };

    let operations = vec![
        BatchOperation::Create {
            collection: Collection::Tasks,
            id: task_id,
            fields: to_document(&task)?,
        },
        BatchOperation::Update {
            collection: Collection::Projects,
            id: project.id,
            fields: project_fields,
            precondition: Some(Filter::equals("status", project.status.as_str())),
        },
    ];

    Ok((task_id, operations, promotion))
}

pub struct UpdateTaskStatusParameters {
    pub task_id: Uuid,
    pub status: Status,
}

/// Sets a task's status to anything. The project and any parent or subtasks
/// are left alone.
pub async fn update_task_status<S>(
    storage: &S,
    actor: &Actor,
    parameters: UpdateTaskStatusParameters,
) -> Result<Task, TaskError>
where
    S: DocumentStore + ?Sized,
{
    let task = fetch_task(storage, parameters.task_id)
        .await?
        .ok_or(TaskError::TaskNotFound(parameters.task_id))?;
    let project = fetch_project(storage, task.project_id)
        .await?
        .ok_or(TaskError::ProjectNotFound(task.project_id))?;
    if !project.is_participant(actor) {
        return Err(AccessDenied::new(actor, "update tasks of this project").into());
    }

    storage
        .update_document(
            Collection::Tasks,
            task.id,
            to_document(&json!({ "status": parameters.status }))?,
        )
        .await?;
    info!(
        task_id = %task.id,
        actor = %actor,
        from = %task.status,
        to = %parameters.status,
        "task status updated"
    );

    fetch_task(storage, task.id)
        .await?
        .ok_or(TaskError::TaskNotFound(task.id))
}

/// Every task of a project, oldest first.
pub async fn list_tasks<S>(
    storage: &S,
    actor: &Actor,
    project_id: Uuid,
) -> Result<Vec<Task>, TaskError>
where
    S: DocumentStore + ?Sized,
{
    let project = fetch_project(storage, project_id)
        .await?
        .ok_or(TaskError::ProjectNotFound(project_id))?;
    if !project.is_participant(actor) {
        return Err(AccessDenied::new(actor, "view tasks of this project").into());
    }

    let documents = storage
        .query_documents(
            Collection::Tasks,
            &[Filter::equals("projectId", project_id.to_string())],
        )
        .await?;
    debug!(%project_id, count = documents.len(), "listed tasks");

    documents
        .into_iter()
        .map(|document| from_document(Collection::Tasks, document).map_err(Into::into))
        .collect()
}
