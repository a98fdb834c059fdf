use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::status::Status;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Store-assigned id of the task
    pub id: Uuid,
    /// The project this task belongs to
    pub project_id: Uuid,
    /// Title of the task
    pub title: String,
    /// Progress of this task, independent from the project status
    pub status: Status,
    /// Set on subtasks; the parent is always a top-level task
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<Uuid>,
    /// Who created the task
    pub created_by: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Task {
    pub fn is_subtask(&self) -> bool {
        self.parent_id.is_some()
    }
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct NewTask {
    pub project_id: Uuid,
    pub title: String,
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<Uuid>,
    pub created_by: String,
}

/// A top-level task together with its subtasks.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskNode {
    pub task: Task,
    pub subtasks: Vec<Task>,
}

/// Arrange a project's tasks into top-level tasks with their subtasks. Input
/// order is preserved on both levels. Subtasks whose parent is not among
/// `tasks` are dropped.
pub fn arrange(tasks: Vec<Task>) -> Vec<TaskNode> {
    let (subtasks, top_level): (Vec<Task>, Vec<Task>) =
        tasks.into_iter().partition(Task::is_subtask);

    let mut nodes: Vec<TaskNode> = top_level
        .into_iter()
        .map(|task| TaskNode {
            task,
            subtasks: vec![],
        })
        .collect();

    for subtask in subtasks {
        if let Some(node) = nodes
            .iter_mut()
            .find(|node| Some(node.task.id) == subtask.parent_id)
        {
            node.subtasks.push(subtask);
        }
    }

    nodes
}
