//! Job plan files.
//!
//! ```toml
//! [[modules]]
//! id = "app"
//! name = "App"
//! path = "services/app"
//!
//! [modules.targets]
//! build = "cargo build"
//! test = "cargo test --workspace"
//! ```
//!
//! Relative module paths are resolved against the plan file's directory.
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use buildq_core::host::{TaskFactory, TaskSpec};
use buildq_core::{BuildRequest, JobKey};
use serde::Deserialize;
use thiserror::Error;

/// Request option carrying the target's command line.
pub const COMMAND_OPTION: &str = "command";

#[derive(Error, Debug)]
pub enum PlanError {
    #[error("read {path} failed: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("parse {path} failed: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
    #[error("module `{0}` is defined more than once")]
    DuplicateModule(String),
    #[error("`{0}` is not a job of this plan")]
    UnknownJob(String),
    #[error("invalid job `{0}`; expected module:target")]
    InvalidSelector(String),
    #[error("{0} has an empty command")]
    EmptyCommand(JobKey),
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlanModule {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub path: String,
    #[serde(default)]
    pub targets: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Plan {
    #[serde(default)]
    pub modules: Vec<PlanModule>,
    #[serde(skip)]
    base_dir: PathBuf,
}

pub fn load_plan(path: impl AsRef<Path>) -> Result<Plan, PlanError> {
    let path = path.as_ref();
    let display = path.display().to_string();
    let text = std::fs::read_to_string(path).map_err(|source| PlanError::Read {
        path: display.clone(),
        source,
    })?;
    let base_dir = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();
    Plan::parse(&text, base_dir).map_err(|e| match e {
        PlanError::Parse { source, .. } => PlanError::Parse {
            path: display,
            source,
        },
        other => other,
    })
}

impl Plan {
    pub fn parse(text: &str, base_dir: impl Into<PathBuf>) -> Result<Self, PlanError> {
        let mut plan: Plan = toml::from_str(text).map_err(|source| PlanError::Parse {
            path: "<inline>".into(),
            source,
        })?;
        plan.base_dir = base_dir.into();

        let mut seen = HashSet::new();
        for module in &plan.modules {
            if !seen.insert(module.id.as_str()) {
                return Err(PlanError::DuplicateModule(module.id.clone()));
            }
            for (target, command) in &module.targets {
                if command.trim().is_empty() {
                    return Err(PlanError::EmptyCommand(JobKey::new(&module.id, target)));
                }
            }
        }
        Ok(plan)
    }

    fn working_path(&self, module: &PlanModule) -> PathBuf {
        let expanded = PathBuf::from(shellexpand::tilde(&module.path).as_ref());
        if expanded.is_absolute() {
            expanded
        } else {
            self.base_dir.join(expanded)
        }
    }

    fn request(&self, module: &PlanModule, target: &str, command: &str) -> BuildRequest {
        let mut request = BuildRequest::new(&module.id, target, self.working_path(module))
            .with_option(COMMAND_OPTION, command);
        if let Some(name) = &module.name {
            request = request.with_module_name(name);
        }
        request
    }

    /// Every job: modules in plan order, targets sorted by name.
    pub fn all_requests(&self) -> Vec<BuildRequest> {
        self.modules
            .iter()
            .flat_map(|m| {
                m.targets
                    .iter()
                    .map(move |(target, command)| self.request(m, target, command))
            })
            .collect()
    }

    /// Jobs named by `module:target` selectors; all jobs when `selectors` is empty.
    pub fn select(&self, selectors: &[String]) -> Result<Vec<BuildRequest>, PlanError> {
        if selectors.is_empty() {
            return Ok(self.all_requests());
        }
        selectors
            .iter()
            .map(|sel| {
                let (module_id, target) = sel
                    .split_once(':')
                    .filter(|(m, t)| !m.is_empty() && !t.is_empty())
                    .ok_or_else(|| PlanError::InvalidSelector(sel.clone()))?;
                let module = self
                    .modules
                    .iter()
                    .find(|m| m.id == module_id)
                    .ok_or_else(|| PlanError::UnknownJob(sel.clone()))?;
                let command = module
                    .targets
                    .get(target)
                    .ok_or_else(|| PlanError::UnknownJob(sel.clone()))?;
                Ok(self.request(module, target, command))
            })
            .collect()
    }
}

/// Turns plan requests into task descriptions.
///
/// With `shell` the whole command line is handed to the platform shell;
/// otherwise it is split on whitespace into program and arguments.
pub struct PlanTaskFactory {
    shell: bool,
}

impl PlanTaskFactory {
    pub fn new(shell: bool) -> Self {
        Self { shell }
    }
}

impl TaskFactory for PlanTaskFactory {
    fn build(&self, request: &BuildRequest) -> anyhow::Result<TaskSpec> {
        let line = request
            .options
            .get(COMMAND_OPTION)
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| PlanError::EmptyCommand(request.key()))?;

        if self.shell {
            return Ok(TaskSpec::for_request(request, line, Vec::new()));
        }
        let mut parts = line.split_whitespace().map(str::to_string);
        let program = parts
            .next()
            .ok_or_else(|| PlanError::EmptyCommand(request.key()))?;
        Ok(TaskSpec::for_request(request, program, parts.collect()))
    }
}
