//! Prompt templates. Every value is rendered verbatim into the text.

use crate::advisory::{breakdown::BreakdownInput, feedback::FeedbackInput};

pub const MIN_SUGGESTIONS: usize = 3;
pub const MAX_SUGGESTIONS: usize = 5;

pub fn breakdown(input: &BreakdownInput) -> String {
    let mut prompt = String::from(
        "You are an experienced project manager in a university setting. \
         Break the project below into actionable tasks for the students working on it.\n\n",
    );
    prompt.push_str(&format!(
        "Suggest between {MIN_SUGGESTIONS} and {MAX_SUGGESTIONS} short task titles.\n\n"
    ));

    if !input.existing_tasks.is_empty() {
        prompt.push_str("These tasks already exist:\n");
        for task in &input.existing_tasks {
            prompt.push_str(&format!("- {task}\n"));
        }
        prompt.push_str(
            "\nOnly suggest new tasks covering the next logical steps. \
             Never repeat an existing task.\n\n",
        );
    }

    prompt.push_str(&format!("Project title: {}\n", input.title));
    prompt.push_str(&format!("Project description: {}\n\n", input.description));
    prompt.push_str(
        "Answer with a JSON object whose \"tasks\" array holds the task titles and nothing else.",
    );
    prompt
}

pub fn feedback(input: &FeedbackInput) -> String {
    let mut prompt = String::from(
        "You are an experienced and encouraging university lecturer \
         reviewing a student project.\n\n",
    );
    prompt.push_str(&format!("Project title: {}\n", input.project_title));
    prompt.push_str(&format!(
        "Project description: {}\n\n",
        input.project_description
    ));

    prompt.push_str("Tasks recorded for the project:\n");
    if input.tasks.is_empty() {
        prompt.push_str("- No tasks were recorded.\n");
    }
    for task in &input.tasks {
        prompt.push_str(&format!(
            "- Task: \"{}\" (status: {})\n",
            task.title, task.status
        ));
        for subtask in &task.subtasks {
            prompt.push_str(&format!(
                "  - Subtask: \"{}\" (status: {})\n",
                subtask.title, subtask.status
            ));
        }
    }

    prompt.push_str(
        "\n1. Write a few paragraphs of specific, constructive feedback addressed directly to \
         the student. Say what went well and what to improve.\n\
         2. Suggest a grade from 0 to 100 that reflects how complete the work is: 90-100 when \
         every task and subtask is completed, 70-89 when most of them are, and lower the more \
         tasks and subtasks remain incomplete.\n\n\
         Answer with a JSON object holding \"feedback\" (text) and \"suggestedGrade\" (number).",
    );
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        advisory::feedback::{SubtaskDetail, TaskDetail},
        models::status::Status,
    };

    #[test]
    fn test_breakdown_without_existing_tasks() {
        let prompt = breakdown(&BreakdownInput {
            title: String::from("Essay"),
            description: String::from("Write a 2000-word essay"),
            existing_tasks: vec![],
        });
        assert!(prompt.contains("Project title: Essay"));
        assert!(prompt.contains("between 3 and 5"));
        assert!(!prompt.contains("already exist"));
    }

    #[test]
    fn test_breakdown_lists_existing_tasks() {
        let prompt = breakdown(&BreakdownInput {
            title: String::from("Essay"),
            description: String::from("Write a 2000-word essay"),
            existing_tasks: vec![String::from("Draft outline"), String::from("Find sources")],
        });
        assert!(prompt.contains("- Draft outline\n- Find sources\n"));
        assert!(prompt.contains("Never repeat an existing task."));
    }

    #[test]
    fn test_feedback_nests_subtasks() {
        let prompt = feedback(&FeedbackInput {
            project_title: String::from("Essay"),
            project_description: String::from("Write a 2000-word essay"),
            tasks: vec![TaskDetail {
                title: String::from("Research"),
                status: Status::InProgress,
                subtasks: vec![SubtaskDetail {
                    title: String::from("Collect sources"),
                    status: Status::Completed,
                }],
            }],
        });
        assert!(prompt.contains(
            "- Task: \"Research\" (status: In Progress)\n\
             \x20 - Subtask: \"Collect sources\" (status: Completed)\n"
        ));
        assert!(prompt.contains("90-100"));
    }
}
