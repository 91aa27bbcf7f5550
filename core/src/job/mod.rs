mod types;

pub use types::{BuildRequest, CommandOptions, JobKey, RunStatus, RunUpdate};
