//! element-import - command-line control surface of the element-type import
//! engine.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tracing_subscriber::layer::SubscriberExt;

use element_import::config::{self, loader::apply_env_overrides};
use element_import::db::{self, job_repo::JobFilter};
use element_import::{Config, ImportPhase, ImportService, JobStatus, StartImport};

/// Longest time `import` follows a job before giving up.
const FOLLOW_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Parser, Debug)]
#[command(name = "element-import", version, about = "Import element types from Excel workbooks")]
struct Cli {
    /// Configuration file (JSON).
    #[arg(short, long, env = "ELEMENT_IMPORT_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Overrides the configured database URL.
    #[arg(long, env = "DATABASE_URL", global = true, hide_env_values = true)]
    database_url: Option<String>,

    /// Emit logs as JSON.
    #[arg(long, global = true)]
    json_logs: bool,

    /// Verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Apply database migrations.
    Migrate,

    /// Start an import and follow it until it finishes. Ctrl-C cancels it.
    Import {
        #[arg(short, long)]
        project: i32,
        #[arg(short, long)]
        file: PathBuf,
        #[arg(long)]
        batch_size: Option<usize>,
        #[arg(long)]
        concurrent_batches: Option<usize>,
        #[arg(long, default_value = "cli")]
        user: String,
        /// Allow the import to be rolled back later.
        #[arg(long)]
        enable_rollback: bool,
    },

    /// Show a job.
    Status { job_id: i32 },

    /// List jobs running in this process.
    Running,

    /// List jobs.
    Jobs {
        #[arg(long)]
        status: Option<JobStatus>,
        #[arg(long)]
        project: Option<i32>,
        #[arg(long, default_value_t = 20)]
        limit: u64,
    },

    /// Allow a job to be rolled back.
    EnableRollback { job_id: i32 },

    /// Cancel a job and roll back what it wrote.
    Cancel { job_id: i32 },

    /// Most recent pending or processing job of a project.
    Pending {
        #[arg(short, long)]
        project: i32,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.json_logs)?;

    let mut config = load_config(cli.config.as_deref())?;
    if let Some(url) = cli.database_url {
        config.database_url = url;
    }

    let db = db::init_database(&config.database_url)
        .await
        .context("failed to open the database")?;

    match cli.command {
        Command::Migrate => {
            // init_database already ran the migrations.
            println!("Migrations applied");
            Ok(())
        }
        Command::Import {
            project,
            file,
            batch_size,
            concurrent_batches,
            user,
            enable_rollback,
        } => {
            if enable_rollback {
                config.import.rollback_enabled_by_default = true;
            }
            let service = ImportService::new(db, config);
            let mut request = StartImport::new(project, file, user);
            request.batch_size = batch_size;
            request.concurrent_batches = concurrent_batches;
            follow_import(&service, request).await
        }
        Command::Status { job_id } => {
            let service = ImportService::new(db, config);
            print_json(&service.get_job_status(job_id).await?)
        }
        Command::Running => {
            let service = ImportService::new(db, config);
            print_json(&service.list_running())
        }
        Command::Jobs {
            status,
            project,
            limit,
        } => {
            let service = ImportService::new(db, config);
            let filter = JobFilter {
                status,
                project_id: project,
                limit: Some(limit),
                offset: None,
            };
            print_json(&service.list_jobs(&filter).await?)
        }
        Command::EnableRollback { job_id } => {
            let service = ImportService::new(db, config);
            service.enable_rollback(job_id).await?;
            println!("Rollback enabled for job {}", job_id);
            Ok(())
        }
        Command::Cancel { job_id } => {
            let service = ImportService::new(db, config);
            let (accepted, task) = service.cancel_and_schedule_rollback(job_id).await?;
            print_json(&accepted)?;
            if let Some(task) = task {
                match task.await? {
                    Ok(report) => print_json(&report)?,
                    Err(e) => anyhow::bail!(e),
                }
            }
            Ok(())
        }
        Command::Pending { project } => {
            let service = ImportService::new(db, config);
            match service.get_pending_within_30min(project).await? {
                Some(job) => print_json(&job),
                None => {
                    println!("No pending import for project {}", project);
                    Ok(())
                }
            }
        }
    }
}

async fn follow_import(service: &ImportService, request: StartImport) -> anyhow::Result<()> {
    let (interrupt_tx, mut interrupts) = mpsc::unbounded_channel();
    ctrlc::set_handler(move || {
        let _ = interrupt_tx.send(());
    })
    .context("failed to install the Ctrl-C handler")?;

    let mut events = service.subscribe();
    let job_id = service.start_import(request).await?;
    println!("Started import job {}", job_id);

    let wait = service.wait_for_job(job_id, FOLLOW_TIMEOUT);
    tokio::pin!(wait);
    let mut cancelled = false;

    let job = loop {
        tokio::select! {
            job = &mut wait => break job?,
            event = events.recv() => match event {
                Ok(event) if event.job_id == job_id => {
                    if event.phase == ImportPhase::Persisting {
                        println!("[{:>3}%] {}", event.progress, event.message);
                    } else {
                        println!("{}: {}", event.phase, event.message);
                    }
                }
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => {}
            },
            Some(()) = interrupts.recv(), if !cancelled => {
                cancelled = true;
                let accepted = service.cancel_and_rollback(job_id).await?;
                println!("{}", accepted.message);
            }
        }
    };

    // Lets a scheduled rollback finish before the process exits.
    service.graceful_shutdown().await?;
    print_json(&job)?;

    if job.status == JobStatus::Failed {
        anyhow::bail!("import job {} failed", job_id);
    }
    Ok(())
}

fn load_config(path: Option<&std::path::Path>) -> anyhow::Result<Config> {
    if let Some(path) = path {
        return config::load_config(path)
            .with_context(|| format!("failed to load {}", path.display()));
    }
    match config::default_config_path().filter(|p| p.exists()) {
        Some(path) => {
            config::load_config(&path).with_context(|| format!("failed to load {}", path.display()))
        }
        None => {
            let mut config = Config::default();
            apply_env_overrides(&mut config);
            Ok(config)
        }
    }
}

fn init_logging(verbose: bool, json: bool) -> anyhow::Result<()> {
    tracing_log::LogTracer::init().context("failed to bridge log records")?;

    let default_filter = if verbose {
        "element_import=debug,info"
    } else {
        "element_import=info,warn"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        tracing::subscriber::set_global_default(
            registry.with(tracing_subscriber::fmt::layer().json()),
        )?;
    } else {
        tracing::subscriber::set_global_default(registry.with(tracing_subscriber::fmt::layer()))?;
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
