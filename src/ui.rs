use colored::*;
use jiff::{Timestamp, Zoned, civil::Date, tz::TimeZone};

use crate::{
    advisory::feedback::FeedbackDraft,
    models::{
        project::Project,
        status::Status,
        task::{Task, TaskNode},
    },
};

/// Deadlines closer than this many days get a countdown instead of a date.
const DUE_SOON_DAYS: i32 = 3;

/// Get the terminal width, defaulting to 80 if unavailable
fn get_terminal_width() -> usize {
    term_size::dimensions().map(|(w, _)| w).unwrap_or(80)
}

pub fn get_status_glyph(status: Status, is_overdue: bool) -> ColoredString {
    match status {
        Status::Completed => "✓".dimmed(),
        _ if is_overdue => "●".red(),
        Status::InProgress => "◐".yellow(),
        Status::Pending => "○".normal(),
    }
}

fn local_date(timestamp: Timestamp) -> Date {
    Zoned::new(timestamp, TimeZone::system()).date()
}

fn plural_days(days: i32) -> &'static str {
    if days == 1 { "day" } else { "days" }
}

/// Human-readable deadline, e.g. "Overdue by 2 days", "Due in 1 day" or
/// "Due Mar 01, 2026". Completed projects always show the plain date.
pub fn deadline_hint(deadline: Date, status: Status, today: Date) -> String {
    let days = match today.until(deadline) {
        Ok(span) => span.get_days(),
        Err(_) => 0,
    };

    if status.is_completed() || days > DUE_SOON_DAYS {
        format!("Due {}", deadline.strftime("%b %d, %Y"))
    } else if days < 0 {
        format!("Overdue by {} {}", -days, plural_days(-days))
    } else if days == 0 {
        String::from("Due today")
    } else {
        format!("Due in {} {}", days, plural_days(days))
    }
}

fn is_overdue(project: &Project, today: Date) -> bool {
    !project.status.is_completed() && local_date(project.deadline) < today
}

/// Render a project line: short id, glyph, title and a right-aligned
/// deadline hint.
pub fn render_project_line(project: &Project) {
    let today = Zoned::now().date();
    let terminal_width = get_terminal_width();
    let overdue = is_overdue(project, today);

    let id_string = project.id.to_string();
    let id_str = short_id(&id_string);
    let glyph = get_status_glyph(project.status, overdue);
    let left_section = format!("  {}  {}  {}", id_str, glyph, project.title);
    let styled_left = if project.status.is_completed() {
        left_section.dimmed()
    } else {
        left_section.bold()
    };

    let hint = deadline_hint(local_date(project.deadline), project.status, today);
    let right_section = if overdue { hint.red() } else { hint.dimmed() };

    let left_visible_len = format!("  {}  {}  {}", id_str, " ", project.title)
        .chars()
        .count();
    let total_content = left_visible_len + hint.chars().count();

    if total_content + 4 < terminal_width {
        let padding = terminal_width - total_content - 2;
        println!("{}{}{}", styled_left, " ".repeat(padding), right_section);
    } else {
        println!("{}", styled_left);
    }
}

/// Full view of one project: header, details, assessment and its task tree.
pub fn render_project_details(project: &Project, tree: &[TaskNode]) {
    let today = Zoned::now().date();
    println!(
        "\n  {} {}\n",
        project.title.cyan().bold(),
        format!("[{}]", project.status).dimmed()
    );
    println!("  {}", project.description);
    println!(
        "\n  {}  ·  assigned to {}  ·  created by {}",
        deadline_hint(local_date(project.deadline), project.status, today),
        project.assigned_to.join(", "),
        project.created_by
    );
    println!("  {}", format!("id {}", project.id).dimmed());

    if let Some((grade, feedback)) = project.assessment() {
        render_section_header("Assessment");
        println!("  Grade: {}", grade.to_string().bold());
        for line in feedback.lines() {
            println!("  {}", line);
        }
    }

    let count = tree.iter().map(|node| 1 + node.subtasks.len()).sum();
    render_view_header("Tasks", count);
    if tree.is_empty() {
        println!("  No tasks yet");
    }
    render_task_tree(tree);
}

/// Render top-level tasks with their subtasks indented below them.
pub fn render_task_tree(tree: &[TaskNode]) {
    for node in tree {
        render_task_line(&node.task, 0);
        for subtask in &node.subtasks {
            render_task_line(subtask, 1);
        }
    }
}

pub fn render_task_line(task: &Task, depth: usize) {
    let indent = "   ".repeat(depth);
    let connector = if depth > 0 { "└ " } else { "" };
    let line = format!(
        "  {}  {}{}{}  {}",
        short_id(&task.id.to_string()),
        indent,
        connector,
        get_status_glyph(task.status, false),
        task.title
    );
    if task.status.is_completed() {
        println!("{}", line.dimmed());
    } else {
        println!("{}", line);
    }
}

/// Numbered list of AI suggestions for the user to pick from.
pub fn render_suggestions(suggestions: &[String]) {
    render_view_header("Suggested tasks", suggestions.len());
    for (index, title) in suggestions.iter().enumerate() {
        println!("  {:>3}  {}", index + 1, title);
    }
    println!();
}

pub fn render_feedback_draft(draft: &FeedbackDraft) {
    render_section_header("Suggested feedback");
    for line in draft.feedback.lines() {
        println!("  {}", line);
    }
    println!(
        "\n  Suggested grade: {}\n",
        draft.suggested_grade.to_string().bold()
    );
}

/// Render a view header with title and count
pub fn render_view_header(title: &str, count: usize) {
    let task_word = if count == 1 { "task" } else { "tasks" };
    println!("\n  {} ({} {})\n", title.cyan().bold(), count, task_word);
}

/// Render a section header (e.g., "Assessment")
pub fn render_section_header(title: &str) {
    println!("\n  ─── {} ───\n", title.bold());
}

/// First eight characters of an id, enough to tell entries apart on screen.
pub fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}
