use jiff::{Timestamp, Zoned};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    error::ErrorKind,
    models::{
        project::{Grade, NewProject, Project},
        status::Status,
        user::Actor,
    },
    services::{
        AccessDenied,
        validation::{self, ValidationError},
    },
    storage::{
        BatchOperation, Collection, DocumentStore, Filter, StorageError, from_document,
        to_document,
    },
};

#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("Project '{0}' not found")]
    ProjectNotFound(Uuid),

    #[error("Invalid project: {0}")]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    AccessDenied(#[from] AccessDenied),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl ProjectError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProjectError::ProjectNotFound(_) => ErrorKind::NotFound,
            ProjectError::Validation(_) => ErrorKind::ValidationFailure,
            ProjectError::AccessDenied(_) => ErrorKind::PermissionDenied,
            ProjectError::Storage(e) => e.kind(),
        }
    }
}

/// Reads a project, mapping a missing document to `None`.
pub(crate) async fn fetch_project<S>(
    storage: &S,
    project_id: Uuid,
) -> Result<Option<Project>, StorageError>
where
    S: DocumentStore + ?Sized,
{
    match storage
        .get_document(Collection::Projects, project_id)
        .await
    {
        Ok(document) => from_document(Collection::Projects, document).map(Some),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

async fn require_project<S>(storage: &S, project_id: Uuid) -> Result<Project, ProjectError>
where
    S: DocumentStore + ?Sized,
{
    fetch_project(storage, project_id)
        .await?
        .ok_or(ProjectError::ProjectNotFound(project_id))
}

pub async fn get_project<S>(storage: &S, project_id: Uuid) -> Result<Project, ProjectError>
where
    S: DocumentStore + ?Sized,
{
    require_project(storage, project_id).await
}

/// Projects visible to the actor: the ones a lecturer created, or the ones a
/// student is assigned to.
pub async fn list_projects<S>(storage: &S, actor: &Actor) -> Result<Vec<Project>, ProjectError>
where
    S: DocumentStore + ?Sized,
{
    let filter = if actor.is_lecturer() {
        Filter::equals("createdBy", actor.id.as_str())
    } else {
        Filter::array_contains("assignedTo", actor.id.as_str())
    };

    let documents = storage
        .query_documents(Collection::Projects, &[filter])
        .await?;
    debug!(actor = %actor, count = documents.len(), "listed projects");

    documents
        .into_iter()
        .map(|document| from_document(Collection::Projects, document).map_err(Into::into))
        .collect()
}

pub struct CreateProjectParameters {
    pub title: String,
    pub description: String,
    pub deadline: Timestamp,
    pub assigned_to: Vec<String>,
}

pub async fn create_project<S>(
    storage: &S,
    actor: &Actor,
    parameters: CreateProjectParameters,
) -> Result<Project, ProjectError>
where
    S: DocumentStore + ?Sized,
{
    if !actor.is_lecturer() {
        return Err(AccessDenied::new(actor, "create projects").into());
    }

    let now = Zoned::now();
    let title = validation::title(&parameters.title)?;
    let description = validation::description(&parameters.description)?;
    validation::deadline(parameters.deadline, now.date(), now.time_zone())?;
    let assigned_to = validation::assignees(parameters.assigned_to)?;

    let project = NewProject {
        title,
        description,
        deadline: parameters.deadline,
        status: Status::Pending,
        assigned_to,
        created_by: actor.id.clone(),
    };

    let project_id = storage
        .create_document(Collection::Projects, to_document(&project)?)
        .await?;
    info!(%project_id, actor = %actor, "project created");

    require_project(storage, project_id).await
}

pub struct UpdateProjectStatusParameters {
    pub project_id: Uuid,
    pub status: Status,
}

/// Explicit status change. The only transition allowed here is
/// In Progress → Completed; promotion out of Pending happens when the first
/// task is created.
pub async fn update_project_status<S>(
    storage: &S,
    actor: &Actor,
    parameters: UpdateProjectStatusParameters,
) -> Result<Project, ProjectError>
where
    S: DocumentStore + ?Sized,
{
    let project = require_project(storage, parameters.project_id).await?;
    if !project.is_participant(actor) {
        return Err(AccessDenied::new(actor, "change the status of this project").into());
    }

    if !project.status.allows_manual_transition(parameters.status) {
        return Err(ValidationError::InvalidTransition {
            from: project.status,
            to: parameters.status,
        }
        .into());
    }

    storage
        .update_document(
            Collection::Projects,
            project.id,
            to_document(&json!({ "status": parameters.status }))?,
        )
        .await?;
    info!(
        project_id = %project.id,
        actor = %actor,
        from = %project.status,
        to = %parameters.status,
        "project status updated"
    );

    require_project(storage, project.id).await
}

pub struct GradeProjectParameters {
    pub project_id: Uuid,
    pub grade: f64,
    pub feedback: String,
}

/// Writes grade and feedback together onto a completed project. Repeating it
/// overwrites the previous assessment.
pub async fn grade_project<S>(
    storage: &S,
    actor: &Actor,
    parameters: GradeProjectParameters,
) -> Result<Project, ProjectError>
where
    S: DocumentStore + ?Sized,
{
    let project = require_project(storage, parameters.project_id).await?;
    if !project.is_owned_by(actor) {
        return Err(AccessDenied::new(actor, "grade this project").into());
    }

    match project.status {
        Status::Completed => {}
        Status::Pending | Status::InProgress => {
            return Err(ValidationError::NotCompleted(project.status).into());
        }
    }

    let grade = Grade::new(parameters.grade).map_err(ValidationError::from)?;
    let feedback = validation::feedback(&parameters.feedback)?;

    storage
        .update_document(
            Collection::Projects,
            project.id,
            to_document(&json!({ "grade": grade, "feedback": feedback }))?,
        )
        .await?;
    info!(project_id = %project.id, actor = %actor, %grade, "project graded");

    require_project(storage, project.id).await
}

pub struct DeleteProjectParameters {
    pub project_id: Uuid,
}

#[derive(Debug)]
pub struct DeleteProjectResult {
    pub project: Project,
    pub cascaded_tasks_count: usize,
}

/// Removes the project and every task that references it in one batch.
pub async fn delete_project<S>(
    storage: &S,
    actor: &Actor,
    parameters: DeleteProjectParameters,
) -> Result<DeleteProjectResult, ProjectError>
where
    S: DocumentStore + ?Sized,
{
    let project = require_project(storage, parameters.project_id).await?;
    if !project.is_owned_by(actor) {
        return Err(AccessDenied::new(actor, "delete this project").into());
    }

    let tasks = storage
        .query_documents(
            Collection::Tasks,
            &[Filter::equals("projectId", project.id.to_string())],
        )
        .await?;

    let mut operations: Vec<BatchOperation> = tasks
        .iter()
        .filter_map(|task| task.get("id").and_then(|id| id.as_str()))
        .filter_map(|id| id.parse::<Uuid>().ok())
        .map(|id| BatchOperation::Delete {
            collection: Collection::Tasks,
            id,
        })
        .collect();
    let cascade_count = operations.len();

    operations.push(BatchOperation::Delete {
        collection: Collection::Projects,
        id: project.id,
    });

    storage.run_atomic_batch(operations).await?;
    info!(
        project_id = %project.id,
        actor = %actor,
        cascaded_tasks = cascade_count,
        "project deleted"
    );

    Ok(DeleteProjectResult {
        project,
        cascaded_tasks_count: cascade_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        services::tasks::{CreateTaskParameters, create_task},
        storage::memory::MemoryStore,
        test_support::{complete, essay_parameters, lecturer, new_essay, student},
    };
    use jiff::ToSpan;

    #[tokio::test]
    async fn test_create_project_starts_pending() {
        let storage = MemoryStore::new();
        let project = new_essay(&storage).await;

        assert_eq!(project.status, Status::Pending);
        assert_eq!(project.title, "Essay");
        assert_eq!(project.assigned_to, vec![String::from("s1")]);
        assert_eq!(project.created_by, "l1");
        assert!(project.assessment().is_none());
    }

    #[tokio::test]
    async fn test_students_cannot_create_projects() {
        let storage = MemoryStore::new();
        let result = create_project(&storage, &student(), essay_parameters()).await;
        assert_eq!(result.unwrap_err().kind(), ErrorKind::PermissionDenied);
    }

    #[tokio::test]
    async fn test_create_project_validates_before_writing() {
        let storage = MemoryStore::new();
        let parameters = CreateProjectParameters {
            deadline: Timestamp::now().checked_sub(48.hours()).unwrap(),
            ..essay_parameters()
        };

        let result = create_project(&storage, &lecturer(), parameters).await;
        assert!(matches!(
            result,
            Err(ProjectError::Validation(ValidationError::DeadlineInPast { .. }))
        ));
        assert!(storage.snapshot().await.projects.is_empty());
    }

    #[tokio::test]
    async fn test_create_project_requires_assignees() {
        let storage = MemoryStore::new();
        let parameters = CreateProjectParameters {
            assigned_to: vec![],
            ..essay_parameters()
        };

        let result = create_project(&storage, &lecturer(), parameters).await;
        assert!(matches!(
            result,
            Err(ProjectError::Validation(ValidationError::NoAssignees))
        ));
    }

    #[tokio::test]
    async fn test_list_projects_by_role() {
        let storage = MemoryStore::new();
        let essay = new_essay(&storage).await;
        create_project(
            &storage,
            &Actor::lecturer("l2"),
            CreateProjectParameters {
                assigned_to: vec![String::from("s2")],
                ..essay_parameters()
            },
        )
        .await
        .unwrap();

        let lecturer_view = list_projects(&storage, &lecturer()).await.unwrap();
        assert_eq!(lecturer_view.len(), 1);
        assert_eq!(lecturer_view[0].id, essay.id);

        let student_view = list_projects(&storage, &student()).await.unwrap();
        assert_eq!(student_view.len(), 1);
        assert_eq!(student_view[0].id, essay.id);

        let stranger_view = list_projects(&storage, &Actor::student("s9")).await.unwrap();
        assert!(stranger_view.is_empty());
    }

    #[tokio::test]
    async fn test_pending_project_cannot_be_completed_by_hand() {
        let storage = MemoryStore::new();
        let project = new_essay(&storage).await;

        for status in [Status::InProgress, Status::Completed, Status::Pending] {
            let result = update_project_status(
                &storage,
                &lecturer(),
                UpdateProjectStatusParameters {
                    project_id: project.id,
                    status,
                },
            )
            .await;
            assert!(matches!(
                result,
                Err(ProjectError::Validation(ValidationError::InvalidTransition { .. }))
            ));
        }
    }

    #[tokio::test]
    async fn test_completed_projects_never_regress() {
        let storage = MemoryStore::new();
        let project = new_essay(&storage).await;
        complete(&storage, project.id).await;

        for status in [Status::Pending, Status::InProgress, Status::Completed] {
            let result = update_project_status(
                &storage,
                &student(),
                UpdateProjectStatusParameters {
                    project_id: project.id,
                    status,
                },
            )
            .await;
            assert_eq!(result.unwrap_err().kind(), ErrorKind::ValidationFailure);
        }

        let stored = get_project(&storage, project.id).await.unwrap();
        assert_eq!(stored.status, Status::Completed);
    }

    #[tokio::test]
    async fn test_assigned_student_completes_project() {
        let storage = MemoryStore::new();
        let project = new_essay(&storage).await;
        create_task(
            &storage,
            &student(),
            CreateTaskParameters::new(project.id, "Draft outline"),
        )
        .await
        .unwrap();

        let updated = update_project_status(
            &storage,
            &student(),
            UpdateProjectStatusParameters {
                project_id: project.id,
                status: Status::Completed,
            },
        )
        .await
        .unwrap();
        assert_eq!(updated.status, Status::Completed);
    }

    #[tokio::test]
    async fn test_outsiders_cannot_change_status() {
        let storage = MemoryStore::new();
        let project = new_essay(&storage).await;

        let result = update_project_status(
            &storage,
            &Actor::student("s9"),
            UpdateProjectStatusParameters {
                project_id: project.id,
                status: Status::Completed,
            },
        )
        .await;
        assert_eq!(result.unwrap_err().kind(), ErrorKind::PermissionDenied);
    }

    #[tokio::test]
    async fn test_grading_requires_completed_project() {
        let storage = MemoryStore::new();
        let project = new_essay(&storage).await;

        let result = grade_project(
            &storage,
            &lecturer(),
            GradeProjectParameters {
                project_id: project.id,
                grade: 80.0,
                feedback: String::from("Well structured argument."),
            },
        )
        .await;
        assert!(matches!(
            result,
            Err(ProjectError::Validation(ValidationError::NotCompleted(
                Status::Pending
            )))
        ));
    }

    #[tokio::test]
    async fn test_grade_and_feedback_are_written_together() {
        let storage = MemoryStore::new();
        let project = new_essay(&storage).await;
        complete(&storage, project.id).await;

        let invalid_feedback = grade_project(
            &storage,
            &lecturer(),
            GradeProjectParameters {
                project_id: project.id,
                grade: 80.0,
                feedback: String::from("short"),
            },
        )
        .await;
        assert!(invalid_feedback.is_err());

        let invalid_grade = grade_project(
            &storage,
            &lecturer(),
            GradeProjectParameters {
                project_id: project.id,
                grade: 101.0,
                feedback: String::from("Well structured argument."),
            },
        )
        .await;
        assert!(invalid_grade.is_err());

        let stored = get_project(&storage, project.id).await.unwrap();
        assert!(stored.grade.is_none());
        assert!(stored.feedback.is_none());
    }

    #[tokio::test]
    async fn test_regrading_overwrites() {
        let storage = MemoryStore::new();
        let project = new_essay(&storage).await;
        complete(&storage, project.id).await;

        for (grade, feedback) in [(60.0, "Needs more sources."), (75.5, "Much improved sources.")] {
            grade_project(
                &storage,
                &lecturer(),
                GradeProjectParameters {
                    project_id: project.id,
                    grade,
                    feedback: feedback.to_string(),
                },
            )
            .await
            .unwrap();
        }

        let stored = get_project(&storage, project.id).await.unwrap();
        let (grade, feedback) = stored.assessment().unwrap();
        assert_eq!(grade.value(), 75.5);
        assert_eq!(feedback, "Much improved sources.");
        assert_eq!(stored.status, Status::Completed);
    }

    #[tokio::test]
    async fn test_only_owner_grades() {
        let storage = MemoryStore::new();
        let project = new_essay(&storage).await;
        complete(&storage, project.id).await;

        for actor in [student(), Actor::lecturer("l2")] {
            let result = grade_project(
                &storage,
                &actor,
                GradeProjectParameters {
                    project_id: project.id,
                    grade: 100.0,
                    feedback: String::from("Grading my own work."),
                },
            )
            .await;
            assert_eq!(result.unwrap_err().kind(), ErrorKind::PermissionDenied);
        }
    }

    #[tokio::test]
    async fn test_delete_cascades_to_every_task() {
        let storage = MemoryStore::new();
        let project = new_essay(&storage).await;
        let other = new_essay(&storage).await;

        let research = create_task(
            &storage,
            &student(),
            CreateTaskParameters::new(project.id, "Research"),
        )
        .await
        .unwrap()
        .task;
        for title in ["Draft", "Proofread"] {
            create_task(&storage, &student(), CreateTaskParameters::new(project.id, title))
                .await
                .unwrap();
        }
        create_task(
            &storage,
            &student(),
            CreateTaskParameters {
                parent_id: Some(research.id),
                ..CreateTaskParameters::new(project.id, "Collect sources")
            },
        )
        .await
        .unwrap();
        create_task(&storage, &student(), CreateTaskParameters::new(other.id, "Survive"))
            .await
            .unwrap();

        let result = delete_project(
            &storage,
            &lecturer(),
            DeleteProjectParameters {
                project_id: project.id,
            },
        )
        .await
        .unwrap();
        assert_eq!(result.cascaded_tasks_count, 4);

        let snapshot = storage.snapshot().await;
        assert!(!snapshot.projects.contains_key(&project.id));
        assert!(
            snapshot
                .tasks
                .values()
                .all(|task| task["projectId"] != serde_json::json!(project.id.to_string()))
        );
        assert_eq!(snapshot.tasks.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_requires_owner() {
        let storage = MemoryStore::new();
        let project = new_essay(&storage).await;

        let result = delete_project(
            &storage,
            &student(),
            DeleteProjectParameters {
                project_id: project.id,
            },
        )
        .await;
        assert_eq!(result.unwrap_err().kind(), ErrorKind::PermissionDenied);
        assert!(get_project(&storage, project.id).await.is_ok());
    }

    #[tokio::test]
    async fn test_missing_project() {
        let storage = MemoryStore::new();
        let missing = Uuid::new_v4();
        match get_project(&storage, missing).await {
            Err(ProjectError::ProjectNotFound(id)) => assert_eq!(id, missing),
            other => panic!("Expected ProjectNotFound, got {:?}", other),
        }
    }
}
