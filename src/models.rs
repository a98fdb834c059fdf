pub mod project;
pub mod status;
pub mod store;
pub mod task;
pub mod user;
