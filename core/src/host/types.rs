use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::job::{BuildRequest, JobKey};

/// Marker identifying task executions started by this scheduler.
pub const MANAGED_TASK_KIND: &str = "buildq";

/// Identifying fields of a task, echoed back on its end signal.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDefinition {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

impl TaskDefinition {
    pub fn managed(key: &JobKey) -> Self {
        Self {
            kind: MANAGED_TASK_KIND.to_string(),
            module_id: Some(key.module_id.clone()),
            target: Some(key.target.clone()),
        }
    }

    /// The job key, if this definition carries the managed marker and both
    /// identifying fields.
    pub fn managed_key(&self) -> Option<JobKey> {
        if self.kind != MANAGED_TASK_KIND {
            return None;
        }
        let module_id = self.module_id.as_deref().filter(|s| !s.is_empty())?;
        let target = self.target.as_deref().filter(|s| !s.is_empty())?;
        Some(JobKey::new(module_id, target))
    }
}

/// Abstract description of one task submitted to a [`super::TaskHost`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSpec {
    pub definition: TaskDefinition,
    /// `"<moduleName>:<target>"`; also names the output sink.
    pub name: String,
    pub command: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
}

impl TaskSpec {
    /// A managed task for `request` running `command args..` in its working path.
    pub fn for_request(request: &BuildRequest, command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            definition: TaskDefinition::managed(&request.key()),
            name: request.display_name(),
            command: command.into(),
            args,
            cwd: Some(request.working_path.clone()),
        }
    }
}

/// End-of-process notification published by a task host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskEnd {
    pub definition: TaskDefinition,
    pub exit_code: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn managed_key_requires_marker_and_both_fields() {
        let key = JobKey::new("app", "build");
        assert_eq!(TaskDefinition::managed(&key).managed_key(), Some(key.clone()));

        let foreign = TaskDefinition {
            kind: "shell".into(),
            ..TaskDefinition::managed(&key)
        };
        assert_eq!(foreign.managed_key(), None);

        let no_target = TaskDefinition {
            target: None,
            ..TaskDefinition::managed(&key)
        };
        assert_eq!(no_target.managed_key(), None);

        let blank_module = TaskDefinition {
            module_id: Some(String::new()),
            ..TaskDefinition::managed(&key)
        };
        assert_eq!(blank_module.managed_key(), None);
    }

    #[test]
    fn spec_for_request_uses_display_name_and_working_path() {
        let req = BuildRequest::new("m1", "test", "/ws/app").with_module_name("app");
        let spec = TaskSpec::for_request(&req, "make", vec!["test".into()]);
        assert_eq!(spec.name, "app:test");
        assert_eq!(spec.cwd.as_deref(), Some(std::path::Path::new("/ws/app")));
        assert_eq!(spec.definition.managed_key(), Some(req.key()));
    }
}
