use std::path::{Path, PathBuf};

use crate::error::ConfigError;

use super::types::AppConfig;

/// Get the default buildq data directory: ~/.buildq
pub fn get_buildq_data_dir() -> Result<PathBuf, ConfigError> {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map_err(|_| ConfigError::NoHome)?;
    Ok(PathBuf::from(home).join(".buildq"))
}

pub fn load_default() -> Result<AppConfig, ConfigError> {
    // Priority 1: ~/.buildq/config.toml
    let user_config = get_buildq_data_dir()?.join("config.toml");

    // Priority 2: ./buildq.toml (current directory)
    let local_config = Path::new("buildq.toml");

    let cfg = if user_config.exists() {
        read_config(&user_config)?
    } else if local_config.exists() {
        read_config(local_config)?
    } else {
        AppConfig::default()
    };

    apply_env_overrides(cfg, |key| std::env::var(key).ok())
}

pub fn load_from(path: impl AsRef<Path>) -> Result<AppConfig, ConfigError> {
    let cfg = read_config(path.as_ref())?;
    apply_env_overrides(cfg, |key| std::env::var(key).ok())
}

fn read_config(path: &Path) -> Result<AppConfig, ConfigError> {
    let display = path.display().to_string();
    let s = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: display.clone(),
        source,
    })?;
    toml::from_str::<AppConfig>(&s).map_err(|source| ConfigError::Parse {
        path: display,
        source,
    })
}

// Environment variable overrides (highest priority).
fn apply_env_overrides<F>(mut cfg: AppConfig, var: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let non_empty = |key: &str| var(key).filter(|v| !v.trim().is_empty());

    if let Some(v) = non_empty("BUILDQ_MAX_PARALLEL") {
        cfg.scheduler.max_parallel =
            v.trim()
                .parse::<usize>()
                .map_err(|_| ConfigError::InvalidEnv {
                    key: "BUILDQ_MAX_PARALLEL",
                    value: v.clone(),
                })?;
    }
    if let Some(v) = non_empty("BUILDQ_GRACE_MS") {
        cfg.scheduler.grace_period_ms =
            v.trim()
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidEnv {
                    key: "BUILDQ_GRACE_MS",
                    value: v.clone(),
                })?;
    }
    if let Some(v) = non_empty("BUILDQ_LOG_LEVEL") {
        cfg.logging.level = v;
    }

    Ok(cfg)
}
