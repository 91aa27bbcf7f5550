use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Free-form command-selection options carried from the caller to the task factory.
pub type CommandOptions = BTreeMap<String, String>;

/// Identifies one schedulable unit of work.
///
/// At most one pending or running job exists per key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobKey {
    pub module_id: String,
    pub target: String,
}

impl JobKey {
    pub fn new(module_id: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            module_id: module_id.into(),
            target: target.into(),
        }
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.module_id, self.target)
    }
}

/// A caller's request to run `target` for a module. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildRequest {
    pub module_id: String,
    /// Human readable module name used for the display name; falls back to `module_id`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module_name: Option<String>,
    pub target: String,
    /// Scope of the diagnostics correlator and working directory of the process.
    pub working_path: PathBuf,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub options: CommandOptions,
}

impl BuildRequest {
    pub fn new(
        module_id: impl Into<String>,
        target: impl Into<String>,
        working_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            module_id: module_id.into(),
            module_name: None,
            target: target.into(),
            working_path: working_path.into(),
            options: CommandOptions::new(),
        }
    }

    pub fn with_module_name(mut self, name: impl Into<String>) -> Self {
        self.module_name = Some(name.into());
        self
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    pub fn key(&self) -> JobKey {
        JobKey::new(self.module_id.clone(), self.target.clone())
    }

    /// `"<moduleName>:<target>"`, also used to name the job's output sink.
    pub fn display_name(&self) -> String {
        let module = self.module_name.as_deref().unwrap_or(&self.module_id);
        format!("{}:{}", module, self.target)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Success,
    Warning,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, RunStatus::Running)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Success => "success",
            RunStatus::Warning => "warning",
            RunStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status transition published on the update stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunUpdate {
    pub module_id: String,
    pub target: String,
    pub status: RunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
}

impl RunUpdate {
    pub fn new(key: &JobKey, status: RunStatus, exit_code: Option<i32>) -> Self {
        Self {
            module_id: key.module_id.clone(),
            target: key.target.clone(),
            status,
            exit_code,
        }
    }

    pub fn key(&self) -> JobKey {
        JobKey::new(self.module_id.clone(), self.target.clone())
    }
}
