use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "buildq", version, about = "Run build jobs with bounded parallelism")]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file to use instead of ~/.buildq/config.toml or ./buildq.toml.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run jobs from a plan file and stream their status.
    Run(RunArgs),
    /// List the jobs a plan file defines.
    Plan(PlanArgs),
}

#[derive(ClapArgs, Debug, Clone)]
pub struct RunArgs {
    #[arg(long)]
    pub plan: PathBuf,

    /// Overrides `scheduler.max_parallel`.
    #[arg(long)]
    pub max_parallel: Option<usize>,

    /// Overrides `scheduler.grace_period_ms`.
    #[arg(long)]
    pub grace_ms: Option<u64>,

    /// Run every command through the platform shell.
    #[arg(long)]
    pub shell: bool,

    /// JSONL file or pipe to read diagnostics from while jobs run.
    #[arg(long)]
    pub diagnostics_feed: Option<PathBuf>,

    /// Jobs to run as `module:target`. All plan jobs when omitted.
    #[arg(value_name = "JOB")]
    pub jobs: Vec<String>,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct PlanArgs {
    #[arg(long)]
    pub plan: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_run_with_overrides_and_jobs() {
        let args = Args::parse_from([
            "buildq",
            "run",
            "--plan",
            "jobs.toml",
            "--max-parallel",
            "2",
            "--grace-ms",
            "100",
            "--shell",
            "app:test",
            "lib:build",
        ]);
        let Commands::Run(run) = args.command else {
            panic!("expected run");
        };
        assert_eq!(run.plan, PathBuf::from("jobs.toml"));
        assert_eq!(run.max_parallel, Some(2));
        assert_eq!(run.grace_ms, Some(100));
        assert!(run.shell);
        assert_eq!(run.jobs, vec!["app:test", "lib:build"]);
    }

    #[test]
    fn config_flag_is_global() {
        let args = Args::parse_from(["buildq", "plan", "--plan", "p.toml", "--config", "c.toml"]);
        assert_eq!(args.config, Some(PathBuf::from("c.toml")));
    }
}
