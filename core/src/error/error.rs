use thiserror::Error;

#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("spawn failed: {0}")]
    Spawn(String),
    #[error("stream io error: {stream} {source}")]
    StreamIo {
        stream: &'static str,
        source: std::io::Error,
    },
}

/// Failures of the task execution facility itself.
///
/// A process that fails to spawn is not a `HostError`: the runner absorbs it
/// and finishes with exit code 1.
#[derive(Error, Debug)]
pub enum HostError {
    #[error("task description rejected: {0}")]
    InvalidTask(String),
    #[error("task host unavailable: {0}")]
    Unavailable(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot determine home directory")]
    NoHome,
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
    #[error("invalid value for {key}: {value}")]
    InvalidEnv { key: &'static str, value: String },
}
