use buildq_core::error::ConfigError;
use thiserror::Error;

use crate::plan::PlanError;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("plan error: {0}")]
    Plan(#[from] PlanError),
    #[error("logging setup failed: {0}")]
    Logging(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("internal error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

impl CliError {
    // 0: every job succeeded or warned
    // 1: at least one job failed
    // 11: config error
    // 12: plan error
    // 20: IO error
    // 50: internal/uncategorized
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Config(_) | CliError::Logging(_) => 11,
            CliError::Plan(_) => 12,
            CliError::Io(_) => 20,
            CliError::Anyhow(_) => 50,
        }
    }
}
