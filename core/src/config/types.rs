use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub runner: RunnerConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Maximum number of concurrently running jobs. Values below 1 are treated as 1.
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,

    /// How long a zero-exit run waits for the diagnostics engine before it is finalized.
    #[serde(default = "default_grace_period_ms")]
    pub grace_period_ms: u64,

    /// Capacity of the broadcast channel carrying run updates.
    #[serde(default = "default_update_channel_capacity")]
    pub update_channel_capacity: usize,
}

fn default_max_parallel() -> usize {
    4
}

fn default_grace_period_ms() -> u64 {
    750
}

fn default_update_channel_capacity() -> usize {
    1024
}

impl SchedulerConfig {
    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    pub fn effective_max_parallel(&self) -> usize {
        self.max_parallel.max(1)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_parallel: default_max_parallel(),
            grace_period_ms: default_grace_period_ms(),
            update_channel_capacity: default_update_channel_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Wrap every command in the platform shell (`sh -c` / `cmd /C`).
    #[serde(default)]
    pub shell: bool,

    /// Bytes of recent output each terminal sink keeps for `reveal`.
    #[serde(default = "default_capture_bytes")]
    pub capture_bytes: usize,
}

fn default_capture_bytes() -> usize {
    64 * 1024
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            shell: false,
            capture_bytes: default_capture_bytes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_enabled")]
    pub enabled: bool,

    /// If true, log to stderr.
    #[serde(default = "default_logging_console")]
    pub console: bool,

    /// If true, log to a file under `directory` (or OS temp dir if unset).
    #[serde(default)]
    pub file: bool,

    /// EnvFilter string, e.g. "info" or "buildq_core=debug".
    #[serde(default = "default_logging_level")]
    pub level: String,

    /// Optional directory for log files. If empty or unset, uses OS temp dir.
    #[serde(default)]
    pub directory: Option<String>,
}

fn default_logging_enabled() -> bool {
    true
}

fn default_logging_console() -> bool {
    true
}

fn default_logging_level() -> String {
    "warn".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: default_logging_enabled(),
            console: default_logging_console(),
            file: false,
            level: default_logging_level(),
            directory: None,
        }
    }
}
