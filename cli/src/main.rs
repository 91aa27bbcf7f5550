use buildq_cli::commands::cli::{self, Commands};
use buildq_cli::error::CliError;
use buildq_cli::plan::load_plan;
use buildq_cli::run::run_jobs;
use buildq_core::config::{AppConfig, LoggingConfig};
use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

static LOG_GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
    std::sync::OnceLock::new();

#[tokio::main]
async fn main() {
    let exit = match real_main().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("buildq: {e}");
            e.exit_code()
        }
    };

    std::process::exit(exit);
}

async fn real_main() -> Result<i32, CliError> {
    let args = cli::Args::parse();
    let cfg = match &args.config {
        Some(path) => buildq_core::config::load_from(path)?,
        None => buildq_core::config::load_default()?,
    };
    init_tracing(&cfg.logging).map_err(CliError::Logging)?;

    match args.command {
        Commands::Run(run_args) => {
            let cfg = apply_run_overrides(cfg, &run_args);
            let plan = load_plan(&run_args.plan)?;
            let requests = plan.select(&run_args.jobs)?;
            run_jobs(&cfg, requests, run_args.diagnostics_feed.as_deref()).await
        }
        Commands::Plan(plan_args) => {
            let plan = load_plan(&plan_args.plan)?;
            for request in plan.all_requests() {
                let command = request
                    .options
                    .get(buildq_cli::plan::COMMAND_OPTION)
                    .cloned()
                    .unwrap_or_default();
                println!(
                    "{}\t{}\t{}",
                    request.key(),
                    request.working_path.display(),
                    command
                );
            }
            Ok(0)
        }
    }
}

fn apply_run_overrides(mut cfg: AppConfig, args: &cli::RunArgs) -> AppConfig {
    if let Some(n) = args.max_parallel {
        cfg.scheduler.max_parallel = n;
    }
    if let Some(ms) = args.grace_ms {
        cfg.scheduler.grace_period_ms = ms;
    }
    if args.shell {
        cfg.runner.shell = true;
    }
    cfg
}

fn init_tracing(logging: &LoggingConfig) -> Result<(), String> {
    if !logging.enabled {
        return Ok(());
    }

    let filter = match std::env::var("RUST_LOG") {
        Ok(v) if !v.trim().is_empty() => EnvFilter::from_default_env(),
        _ => EnvFilter::try_new(logging.level.clone()).map_err(|e| e.to_string())?,
    };

    let maybe_writer = if logging.file {
        let dir = log_dir(logging);
        std::fs::create_dir_all(&dir).map_err(|e| format!("create log dir failed: {e}"))?;
        let appender =
            tracing_appender::rolling::never(dir, format!("buildq.{}.log", std::process::id()));
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);
        let _ = LOG_GUARD.set(guard);
        Some(non_blocking)
    } else {
        None
    };

    if !logging.console && maybe_writer.is_none() {
        return Err("logging disabled for both console and file".to_string());
    }

    let console_layer = logging.console.then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(atty::is(atty::Stream::Stderr))
    });

    let file_layer = maybe_writer.map(|w| {
        tracing_subscriber::fmt::layer()
            .with_writer(w)
            .with_ansi(false)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    Ok(())
}

/// `logging.directory` with `~` expanded, or `<tmp>/buildq`.
fn log_dir(logging: &LoggingConfig) -> std::path::PathBuf {
    match logging
        .directory
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        Some(d) => std::path::PathBuf::from(shellexpand::tilde(d).as_ref()),
        None => std::env::temp_dir().join("buildq"),
    }
}
