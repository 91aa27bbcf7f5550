mod load;
mod types;

pub use load::{get_buildq_data_dir, load_default, load_from};
pub use types::{AppConfig, LoggingConfig, RunnerConfig, SchedulerConfig};
