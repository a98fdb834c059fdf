//! Project and task lifecycle for coursework, with AI-assisted task
//! breakdown and grading feedback.

pub mod advisory;
pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod storage;
pub mod ui;

#[cfg(test)]
mod test_support;
