use std::fmt;

use serde::{Deserialize, Serialize};

/// Progress of a project or a task. Both entities share the domain but track
/// it independently.
#[derive(
    Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
pub enum Status {
    #[default]
    Pending,
    #[serde(rename = "In Progress")]
    InProgress,
    Completed,
}

#[derive(Debug, thiserror::Error)]
#[error("Unknown status '{0}' (expected one of: pending, in-progress, completed)")]
pub struct UnknownStatus(pub String);

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Pending => "Pending",
            Status::InProgress => "In Progress",
            Status::Completed => "Completed",
        }
    }

    pub fn is_completed(self) -> bool {
        matches!(self, Status::Completed)
    }

    /// The status a project moves to when a task is added to it, if it moves
    /// at all.
    pub fn after_task_created(self) -> Option<Status> {
        match self {
            Status::Pending => Some(Status::InProgress),
            Status::InProgress | Status::Completed => None,
        }
    }

    /// Whether a project may be moved to `next` by an explicit status update.
    /// Completion is always a manual declaration and nothing leaves Completed.
    pub fn allows_manual_transition(self, next: Status) -> bool {
        match (self, next) {
            (Status::InProgress, Status::Completed) => true,
            (Status::Pending, _) | (Status::InProgress, _) | (Status::Completed, _) => false,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Status {
    type Err = UnknownStatus;

    /// Accepts the wire spelling as well as the kebab/snake forms typed on the
    /// command line.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace(['-', '_'], " ");
        match normalized.as_str() {
            "pending" => Ok(Status::Pending),
            "in progress" | "inprogress" => Ok(Status::InProgress),
            "completed" | "done" => Ok(Status::Completed),
            _ => Err(UnknownStatus(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_wire_spelling() {
        assert_eq!(
            serde_json::to_value(Status::InProgress).unwrap(),
            serde_json::json!("In Progress")
        );
        let decoded: Status = serde_json::from_value(serde_json::json!("Completed")).unwrap();
        assert_eq!(decoded, Status::Completed);
    }

    #[test]
    fn test_unknown_wire_value_is_rejected() {
        let decoded = serde_json::from_value::<Status>(serde_json::json!("in progress"));
        assert!(decoded.is_err());
    }

    #[rstest]
    #[case("pending", Status::Pending)]
    #[case("In Progress", Status::InProgress)]
    #[case("in-progress", Status::InProgress)]
    #[case("in_progress", Status::InProgress)]
    #[case("done", Status::Completed)]
    fn test_parse_from_cli(#[case] input: &str, #[case] expected: Status) {
        assert_eq!(input.parse::<Status>().unwrap(), expected);
    }

    #[rstest]
    #[case(Status::Pending, Some(Status::InProgress))]
    #[case(Status::InProgress, None)]
    #[case(Status::Completed, None)]
    fn test_promotion_on_task_created(#[case] current: Status, #[case] expected: Option<Status>) {
        assert_eq!(current.after_task_created(), expected);
    }

    #[test]
    fn test_manual_transitions_never_regress() {
        for from in [Status::Pending, Status::InProgress, Status::Completed] {
            for to in [Status::Pending, Status::InProgress, Status::Completed] {
                let allowed = from.allows_manual_transition(to);
                assert_eq!(
                    allowed,
                    from == Status::InProgress && to == Status::Completed,
                    "{from} -> {to}"
                );
                if allowed {
                    assert!(to > from);
                }
            }
        }
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("archived".parse::<Status>().is_err());
    }
}
