use jiff::{Timestamp, civil::Date, tz::TimeZone};
use thiserror::Error;

use crate::models::{project::GradeOutOfRange, status::Status};

pub const MIN_TITLE_CHARS: usize = 3;
pub const MIN_DESCRIPTION_CHARS: usize = 10;
pub const MIN_FEEDBACK_CHARS: usize = 10;
pub const MAX_FEEDBACK_CHARS: usize = 2000;

#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("Title must be at least {MIN_TITLE_CHARS} characters")]
    TitleTooShort,

    #[error("Description must be at least {MIN_DESCRIPTION_CHARS} characters")]
    DescriptionTooShort,

    #[error("Deadline {deadline} is before today ({today})")]
    DeadlineInPast { deadline: Date, today: Date },

    #[error("A project must be assigned to at least one student")]
    NoAssignees,

    #[error(transparent)]
    Grade(#[from] GradeOutOfRange),

    #[error(
        "Feedback must be between {MIN_FEEDBACK_CHARS} and {MAX_FEEDBACK_CHARS} characters, got {0}"
    )]
    FeedbackLength(usize),

    #[error("Cannot move a project from {from} to {to}")]
    InvalidTransition { from: Status, to: Status },

    #[error("Only completed projects can be graded (project is {0})")]
    NotCompleted(Status),

    #[error("Subtasks cannot have subtasks of their own")]
    NestingTooDeep,

    #[error("Parent task belongs to another project")]
    ParentInOtherProject,
}

pub fn title(input: &str) -> Result<String, ValidationError> {
    let trimmed = input.trim();
    if trimmed.chars().count() < MIN_TITLE_CHARS {
        return Err(ValidationError::TitleTooShort);
    }
    Ok(trimmed.to_string())
}

pub fn description(input: &str) -> Result<String, ValidationError> {
    let trimmed = input.trim();
    if trimmed.chars().count() < MIN_DESCRIPTION_CHARS {
        return Err(ValidationError::DescriptionTooShort);
    }
    Ok(trimmed.to_string())
}

/// The deadline's calendar day, in `tz`, must not be before `today`.
pub fn deadline(deadline: Timestamp, today: Date, tz: &TimeZone) -> Result<(), ValidationError> {
    let deadline = deadline.to_zoned(tz.clone()).date();
    if deadline < today {
        return Err(ValidationError::DeadlineInPast { deadline, today });
    }
    Ok(())
}

/// Trims ids, drops blanks and repeats, and requires at least one student.
pub fn assignees(input: Vec<String>) -> Result<Vec<String>, ValidationError> {
    let mut students: Vec<String> = Vec::with_capacity(input.len());
    for id in input {
        let id = id.trim();
        if !id.is_empty() && !students.iter().any(|s| s == id) {
            students.push(id.to_string());
        }
    }
    if students.is_empty() {
        return Err(ValidationError::NoAssignees);
    }
    Ok(students)
}

pub fn feedback(input: &str) -> Result<String, ValidationError> {
    let trimmed = input.trim();
    let length = trimmed.chars().count();
    if !(MIN_FEEDBACK_CHARS..=MAX_FEEDBACK_CHARS).contains(&length) {
        return Err(ValidationError::FeedbackLength(length));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use jiff::ToSpan;
    use rstest::rstest;

    #[rstest]
    #[case("Essay", true)]
    #[case("  ab  ", false)]
    #[case("abc", true)]
    #[case("ÉÈÊ", true)]
    fn test_title(#[case] input: &str, #[case] valid: bool) {
        assert_eq!(title(input).is_ok(), valid);
    }

    #[test]
    fn test_title_is_trimmed() {
        assert_eq!(title("  Draft outline ").unwrap(), "Draft outline");
    }

    #[rstest]
    #[case("Write a 2000-word essay", true)]
    #[case("Too short", false)]
    fn test_description(#[case] input: &str, #[case] valid: bool) {
        assert_eq!(description(input).is_ok(), valid);
    }

    #[test]
    fn test_deadline_today_is_accepted() {
        let today = jiff::civil::date(2026, 10, 19);
        let noon = today
            .at(12, 0, 0, 0)
            .to_zoned(TimeZone::UTC)
            .unwrap()
            .timestamp();
        assert!(deadline(noon, today, &TimeZone::UTC).is_ok());
    }

    #[test]
    fn test_deadline_yesterday_is_rejected() {
        let today = jiff::civil::date(2026, 10, 19);
        let yesterday = today
            .at(23, 59, 0, 0)
            .to_zoned(TimeZone::UTC)
            .unwrap()
            .checked_sub(1.day())
            .unwrap()
            .timestamp();
        assert_eq!(
            deadline(yesterday, today, &TimeZone::UTC),
            Err(ValidationError::DeadlineInPast {
                deadline: jiff::civil::date(2026, 10, 18),
                today,
            })
        );
    }

    #[test]
    fn test_assignees_are_normalized() {
        let students = assignees(vec![
            String::from(" s1 "),
            String::from("s2"),
            String::from("s1"),
            String::from("  "),
        ])
        .unwrap();
        assert_eq!(students, vec![String::from("s1"), String::from("s2")]);
    }

    #[test]
    fn test_assignees_cannot_be_empty() {
        assert_eq!(
            assignees(vec![String::from(" ")]),
            Err(ValidationError::NoAssignees)
        );
    }

    #[rstest]
    #[case("Good start", true)]
    #[case("Too short", false)]
    #[case("   Too short   ", false)]
    fn test_feedback(#[case] input: &str, #[case] valid: bool) {
        assert_eq!(feedback(input).is_ok(), valid);
    }

    #[test]
    fn test_feedback_upper_bound() {
        assert!(feedback(&"x".repeat(MAX_FEEDBACK_CHARS)).is_ok());
        assert_eq!(
            feedback(&"x".repeat(MAX_FEEDBACK_CHARS + 1)),
            Err(ValidationError::FeedbackLength(MAX_FEEDBACK_CHARS + 1))
        );
    }
}
