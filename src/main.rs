use std::{fmt::Display, sync::Arc};

use clap::{Parser, Subcommand};
use colored::*;
use jiff::{Timestamp, civil::Date, tz::TimeZone};
use thiserror::Error;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use classwork::{
    advisory::{
        Advisor,
        breakdown::{BreakdownInput, commit_suggestions},
        feedback::gather_feedback_input,
        openai::OpenAiGenerator,
    },
    config::GlobalArgs,
    models::{status::Status, task::arrange, user::Actor},
    services::{
        projects::{
            CreateProjectParameters, DeleteProjectParameters, GradeProjectParameters,
            ProjectError, UpdateProjectStatusParameters, create_project, delete_project,
            get_project, grade_project, list_projects, update_project_status,
        },
        tasks::{
            CreateTaskParameters, TaskError, UpdateTaskStatusParameters, create_task, list_tasks,
            update_task_status,
        },
    },
    storage::json::JsonFileStore,
    ui,
};

#[derive(Parser)]
#[command(
    name = "classwork",
    about = "Coursework projects and tasks for lecturers and students"
)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage projects
    #[command(subcommand)]
    Project(ProjectCommands),

    /// Manage the tasks of a project
    #[command(subcommand)]
    Task(TaskCommands),

    /// Ask the AI advisor for help
    #[command(subcommand)]
    Suggest(SuggestCommands),
}

#[derive(Debug, Subcommand)]
enum ProjectCommands {
    /// Create a new project (lecturers only)
    New {
        /// Project title
        #[arg(short, long)]
        title: String,

        /// What the students have to do
        #[arg(short, long)]
        description: String,

        /// Due date (e.g., "2026-03-01" or an RFC 3339 timestamp)
        #[arg(long, value_parser = parse_deadline)]
        deadline: Timestamp,

        /// Assign a student (can be used multiple times)
        #[arg(short, long = "assign", action = clap::ArgAction::Append)]
        assign: Vec<String>,
    },
    /// List the projects you created or are assigned to
    List,
    /// View a project and its tasks
    View { project: String },
    /// Change the status of a project
    Status { project: String, status: Status },
    /// Grade a completed project
    Grade {
        project: String,

        /// Grade between 0 and 100
        #[arg(short, long)]
        grade: f64,

        /// Feedback for the students
        #[arg(short, long)]
        feedback: String,
    },
    /// Delete a project and all of its tasks
    Delete { project: String },
}

#[derive(Debug, Subcommand)]
enum TaskCommands {
    /// Add a task to a project
    Add {
        project: String,

        /// Task title
        title: String,

        /// Make it a subtask of this task
        #[arg(short, long)]
        parent: Option<String>,

        /// Initial status
        #[arg(short, long, default_value = "pending")]
        status: Status,
    },
    /// Change the status of a task
    Status {
        project: String,
        task: String,
        status: Status,
    },
}

#[derive(Debug, Subcommand)]
enum SuggestCommands {
    /// Suggest new tasks for a project
    Tasks {
        project: String,

        /// Add the suggestions with these numbers (e.g., --pick 1,3)
        #[arg(long, value_delimiter = ',', conflicts_with = "all")]
        pick: Vec<usize>,

        /// Add every suggestion
        #[arg(long)]
        all: bool,
    },
    /// Draft feedback and a grade for a project
    Feedback {
        project: String,

        /// Save the draft as the project's assessment
        #[arg(long)]
        submit: bool,

        /// Submit this grade instead of the suggested one
        #[arg(long, requires = "submit")]
        grade: Option<f64>,
    },
}

#[derive(Debug, Error)]
enum LookupError {
    #[error("No {0} matches '{1}'")]
    NotFound(&'static str, String),

    #[error("'{1}' matches several {0}s: {ids}", ids = .2.join(", "))]
    Ambiguous(&'static str, String, Vec<String>),

    #[error(transparent)]
    Project(#[from] ProjectError),

    #[error(transparent)]
    Task(#[from] TaskError),
}

/// Accepts a plain date (end of that day, local time) or a full timestamp.
fn parse_deadline(input: &str) -> Result<Timestamp, String> {
    if let Ok(timestamp) = input.parse::<Timestamp>() {
        return Ok(timestamp);
    }
    let date: Date = input
        .parse()
        .map_err(|e| format!("expected a date like 2026-03-01: {e}"))?;
    date.at(23, 59, 59, 0)
        .to_zoned(TimeZone::system())
        .map(|zoned| zoned.timestamp())
        .map_err(|e| e.to_string())
}

/// Full ids, or any unambiguous prefix of one.
fn match_id(kind: &'static str, reference: &str, ids: Vec<Uuid>) -> Result<Uuid, LookupError> {
    if let Ok(id) = reference.parse::<Uuid>() {
        return Ok(id);
    }
    let prefix = reference.trim().to_lowercase();
    let matching: Vec<Uuid> = ids
        .into_iter()
        .filter(|id| !prefix.is_empty() && id.to_string().starts_with(&prefix))
        .collect();
    match matching.as_slice() {
        [id] => Ok(*id),
        [] => Err(LookupError::NotFound(kind, reference.to_string())),
        _ => Err(LookupError::Ambiguous(
            kind,
            reference.to_string(),
            matching
                .iter()
                .map(|id| ui::short_id(&id.to_string()).to_string())
                .collect(),
        )),
    }
}

async fn resolve_project(
    storage: &JsonFileStore,
    actor: &Actor,
    reference: &str,
) -> Result<Uuid, LookupError> {
    let projects = list_projects(storage, actor).await?;
    match_id("project", reference, projects.iter().map(|p| p.id).collect())
}

async fn resolve_task(
    storage: &JsonFileStore,
    actor: &Actor,
    project_id: Uuid,
    reference: &str,
) -> Result<Uuid, LookupError> {
    let tasks = list_tasks(storage, actor, project_id).await?;
    match_id("task", reference, tasks.iter().map(|t| t.id).collect())
}

/// The suggestions to commit, in the order picked. Repeated numbers are
/// taken once. An out-of-range number is returned as the error.
fn select_suggestions(
    suggestions: Vec<String>,
    pick: &[usize],
    all: bool,
) -> Result<Vec<String>, usize> {
    if all {
        return Ok(suggestions);
    }
    let mut picked: Vec<usize> = Vec::with_capacity(pick.len());
    for &number in pick {
        if number == 0 || number > suggestions.len() {
            return Err(number);
        }
        if !picked.contains(&number) {
            picked.push(number);
        }
    }
    Ok(picked
        .into_iter()
        .map(|number| suggestions[number - 1].clone())
        .collect())
}

fn fail(context: &str, error: impl Display) -> ! {
    eprintln!("Error: {}: {}", context, error);
    std::process::exit(1);
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn advisor(global: &GlobalArgs) -> Advisor<OpenAiGenerator> {
    let config = global
        .ai
        .openai_config()
        .unwrap_or_else(|e| fail("AI advisor unavailable", e));
    let generator =
        OpenAiGenerator::new(config).unwrap_or_else(|e| fail("AI advisor unavailable", e));
    Advisor::new(Arc::new(generator))
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.global.log_json);

    let storage_path = cli
        .global
        .store_path()
        .unwrap_or_else(|e| fail("Failed to locate store", e));

    // Create parent directory if it doesn't exist
    if let Some(parent) = storage_path.parent() {
        std::fs::create_dir_all(parent)
            .unwrap_or_else(|e| fail("Failed to create data directory", e));
    }

    let storage = JsonFileStore::new(storage_path);
    let actor = cli
        .global
        .actor()
        .unwrap_or_else(|e| fail("Invalid user", e));

    match cli.command {
        Commands::Project(ProjectCommands::New {
            title,
            description,
            deadline,
            assign,
        }) => {
            let params = CreateProjectParameters {
                title,
                description,
                deadline,
                assigned_to: assign,
            };
            match create_project(&storage, &actor, params).await {
                Ok(project) => {
                    println!(
                        "✓ Project {} created ({})",
                        project.title,
                        ui::short_id(&project.id.to_string())
                    );
                }
                Err(e) => fail("Failed to create project", e),
            }
        }
        Commands::Project(ProjectCommands::List) => {
            let projects = list_projects(&storage, &actor)
                .await
                .unwrap_or_else(|e| fail("Failed to list projects", e));

            if projects.is_empty() {
                println!("No projects found");
            } else {
                println!(
                    "{} ({} {})\n",
                    "PROJECTS".cyan(),
                    projects.len(),
                    if projects.len() == 1 {
                        "project"
                    } else {
                        "projects"
                    }
                );
                for project in &projects {
                    ui::render_project_line(project);
                }
                println!();
            }
        }
        Commands::Project(ProjectCommands::View { project }) => {
            let project_id = resolve_project(&storage, &actor, &project)
                .await
                .unwrap_or_else(|e| fail("Failed to find project", e));
            let tasks = list_tasks(&storage, &actor, project_id)
                .await
                .unwrap_or_else(|e| fail("Failed to load tasks", e));
            let project = get_project(&storage, project_id)
                .await
                .unwrap_or_else(|e| fail("Failed to load project", e));

            ui::render_project_details(&project, &arrange(tasks));
            println!();
        }
        Commands::Project(ProjectCommands::Status { project, status }) => {
            let project_id = resolve_project(&storage, &actor, &project)
                .await
                .unwrap_or_else(|e| fail("Failed to find project", e));
            let params = UpdateProjectStatusParameters { project_id, status };
            match update_project_status(&storage, &actor, params).await {
                Ok(project) => println!("✓ Project {} is now {}", project.title, project.status),
                Err(e) => fail("Failed to update project", e),
            }
        }
        Commands::Project(ProjectCommands::Grade {
            project,
            grade,
            feedback,
        }) => {
            let project_id = resolve_project(&storage, &actor, &project)
                .await
                .unwrap_or_else(|e| fail("Failed to find project", e));
            let params = GradeProjectParameters {
                project_id,
                grade,
                feedback,
            };
            match grade_project(&storage, &actor, params).await {
                Ok(project) => println!("✓ Project {} graded", project.title),
                Err(e) => fail("Failed to grade project", e),
            }
        }
        Commands::Project(ProjectCommands::Delete { project }) => {
            let project_id = resolve_project(&storage, &actor, &project)
                .await
                .unwrap_or_else(|e| fail("Failed to find project", e));
            let params = DeleteProjectParameters { project_id };
            match delete_project(&storage, &actor, params).await {
                Ok(result) => {
                    println!("✓ Project deleted: {}", result.project.title);
                    if result.cascaded_tasks_count > 0 {
                        println!("  └─ {} task(s) also deleted", result.cascaded_tasks_count);
                    }
                }
                Err(e) => fail("Failed to delete project", e),
            }
        }
        Commands::Task(TaskCommands::Add {
            project,
            title,
            parent,
            status,
        }) => {
            let project_id = resolve_project(&storage, &actor, &project)
                .await
                .unwrap_or_else(|e| fail("Failed to find project", e));
            let parent_id = match parent {
                Some(parent) => Some(
                    resolve_task(&storage, &actor, project_id, &parent)
                        .await
                        .unwrap_or_else(|e| fail("Failed to find parent task", e)),
                ),
                None => None,
            };
            let params = CreateTaskParameters {
                status,
                parent_id,
                ..CreateTaskParameters::new(project_id, title)
            };
            match create_task(&storage, &actor, params).await {
                Ok(created) => {
                    println!(
                        "✓ Task {} added ({})",
                        created.task.title,
                        ui::short_id(&created.task.id.to_string())
                    );
                    if created.promoted_project {
                        println!("  └─ project moved to {}", Status::InProgress);
                    }
                }
                Err(e) => fail("Failed to add task", e),
            }
        }
        Commands::Task(TaskCommands::Status {
            project,
            task,
            status,
        }) => {
            let project_id = resolve_project(&storage, &actor, &project)
                .await
                .unwrap_or_else(|e| fail("Failed to find project", e));
            let task_id = resolve_task(&storage, &actor, project_id, &task)
                .await
                .unwrap_or_else(|e| fail("Failed to find task", e));
            let params = UpdateTaskStatusParameters { task_id, status };
            match update_task_status(&storage, &actor, params).await {
                Ok(task) => println!("✓ Task {} is now {}", task.title, task.status),
                Err(e) => fail("Failed to update task", e),
            }
        }
        Commands::Suggest(SuggestCommands::Tasks { project, pick, all }) => {
            let project_id = resolve_project(&storage, &actor, &project)
                .await
                .unwrap_or_else(|e| fail("Failed to find project", e));
            let tasks = list_tasks(&storage, &actor, project_id)
                .await
                .unwrap_or_else(|e| fail("Failed to load tasks", e));
            let project = get_project(&storage, project_id)
                .await
                .unwrap_or_else(|e| fail("Failed to load project", e));

            let input = BreakdownInput::for_project(&project.title, &project.description, &tasks);
            let suggestions = advisor(&cli.global)
                .suggest_tasks(&input)
                .await
                .unwrap_or_else(|e| fail("Failed to suggest tasks", e));

            if suggestions.is_empty() {
                println!("No new tasks suggested");
                return;
            }
            ui::render_suggestions(&suggestions);

            let selected = select_suggestions(suggestions, &pick, all).unwrap_or_else(|number| {
                fail("Invalid selection", format!("no suggestion number {}", number))
            });
            if selected.is_empty() {
                println!("Nothing added; use --pick or --all to add suggestions");
                return;
            }

            let report = commit_suggestions(&storage, &actor, project_id, selected).await;
            for task in &report.created {
                println!("✓ Task {} added", task.title);
            }
            for (title, error) in &report.failed {
                eprintln!("Error: Failed to add task {}: {}", title, error);
            }
            if report.promoted_project {
                println!("  └─ project moved to {}", Status::InProgress);
            }
            if !report.failed.is_empty() {
                std::process::exit(1);
            }
        }
        Commands::Suggest(SuggestCommands::Feedback {
            project,
            submit,
            grade,
        }) => {
            let project_id = resolve_project(&storage, &actor, &project)
                .await
                .unwrap_or_else(|e| fail("Failed to find project", e));
            let input = gather_feedback_input(&storage, &actor, project_id)
                .await
                .unwrap_or_else(|e| fail("Failed to load project", e));
            let draft = advisor(&cli.global)
                .draft_feedback(&input)
                .await
                .unwrap_or_else(|e| fail("Failed to draft feedback", e));

            ui::render_feedback_draft(&draft);

            if !submit {
                println!("Nothing saved; use --submit to grade the project with this draft");
                return;
            }

            let params = GradeProjectParameters {
                project_id,
                grade: grade.unwrap_or(draft.suggested_grade.value()),
                feedback: draft.feedback,
            };
            match grade_project(&storage, &actor, params).await {
                Ok(project) => println!("✓ Project {} graded", project.title),
                Err(e) => fail("Failed to grade project", e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_id_by_prefix() {
        let first: Uuid = "4f1c2a9e-0000-4000-8000-000000000000".parse().unwrap();
        let second: Uuid = "4f77aa00-0000-4000-8000-000000000000".parse().unwrap();
        let ids = vec![first, second];

        assert_eq!(match_id("project", "4f1c", ids.clone()).unwrap(), first);
        assert!(matches!(
            match_id("project", "4f", ids.clone()),
            Err(LookupError::Ambiguous(..))
        ));
        assert!(matches!(
            match_id("project", "ff", ids),
            Err(LookupError::NotFound(..))
        ));
    }

    #[test]
    fn test_select_suggestions() {
        let suggestions = vec![
            String::from("Find sources"),
            String::from("Write introduction"),
            String::from("Proofread"),
        ];

        assert_eq!(
            select_suggestions(suggestions.clone(), &[3, 1, 3, 1], false).unwrap(),
            vec![String::from("Proofread"), String::from("Find sources")]
        );
        assert_eq!(
            select_suggestions(suggestions.clone(), &[], true).unwrap(),
            suggestions
        );
        assert!(select_suggestions(suggestions.clone(), &[], false).unwrap().is_empty());
        assert_eq!(select_suggestions(suggestions.clone(), &[2, 4], false), Err(4));
        assert_eq!(select_suggestions(suggestions, &[0], false), Err(0));
    }

    #[test]
    fn test_parse_deadline() {
        assert!(parse_deadline("2026-03-01").is_ok());
        assert_eq!(
            parse_deadline("2026-03-01T12:00:00Z").unwrap(),
            "2026-03-01T12:00:00Z".parse::<Timestamp>().unwrap()
        );
        assert!(parse_deadline("next friday").is_err());
    }
}
