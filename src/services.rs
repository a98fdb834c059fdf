use thiserror::Error;

use crate::models::user::Actor;

pub mod projects;
pub mod tasks;
pub mod validation;

#[derive(Debug, Error, PartialEq)]
#[error("{actor} is not allowed to {action}")]
pub struct AccessDenied {
    pub actor: String,
    pub action: &'static str,
}

impl AccessDenied {
    pub fn new(actor: &Actor, action: &'static str) -> Self {
        Self {
            actor: actor.to_string(),
            action,
        }
    }
}
