use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{status::Status, user::Actor};

pub const MIN_GRADE: f64 = 0.0;
pub const MAX_GRADE: f64 = 100.0;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    /// Store-assigned id of the project
    pub id: Uuid,
    /// Title of the project
    pub title: String,
    /// What the students are expected to deliver
    pub description: String,
    /// When the project is due
    pub deadline: Timestamp,
    /// Lifecycle status
    pub status: Status,
    /// Ids of the students working on the project
    pub assigned_to: Vec<String>,
    /// Id of the lecturer who created the project
    pub created_by: String,
    /// Grade given by the lecturer, always paired with `feedback`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grade: Option<Grade>,
    /// Feedback given by the lecturer, always paired with `grade`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Project {
    pub fn is_owned_by(&self, actor: &Actor) -> bool {
        actor.is_lecturer() && self.created_by == actor.id
    }

    /// The owning lecturer or one of the assigned students.
    pub fn is_participant(&self, actor: &Actor) -> bool {
        self.is_owned_by(actor) || self.assigned_to.iter().any(|id| *id == actor.id)
    }

    pub fn assessment(&self) -> Option<(Grade, &str)> {
        match (self.grade, self.feedback.as_deref()) {
            (Some(grade), Some(feedback)) => Some((grade, feedback)),
            _ => None,
        }
    }
}

/// Fields of a project as first written to the store.
#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct NewProject {
    pub title: String,
    pub description: String,
    pub deadline: Timestamp,
    pub status: Status,
    pub assigned_to: Vec<String>,
    pub created_by: String,
}

/// A grade in `[0, 100]`. Fractional values are allowed.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, PartialOrd)]
#[serde(try_from = "f64", into = "f64")]
pub struct Grade(f64);

#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
#[error("Grade must be between {MIN_GRADE} and {MAX_GRADE}, got {0}")]
pub struct GradeOutOfRange(pub f64);

impl Grade {
    pub fn new(value: f64) -> Result<Self, GradeOutOfRange> {
        if value.is_finite() && (MIN_GRADE..=MAX_GRADE).contains(&value) {
            Ok(Self(value))
        } else {
            Err(GradeOutOfRange(value))
        }
    }

    pub fn value(self) -> f64 {
        self.0
    }
}

impl TryFrom<f64> for Grade {
    type Error = GradeOutOfRange;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Grade::new(value)
    }
}

impl From<Grade> for f64 {
    fn from(grade: Grade) -> Self {
        grade.0
    }
}

impl std::fmt::Display for Grade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
