use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::{info, warn};
use walkdir::WalkDir;

use shelf::config::load_config;
use shelf::db::{book_repo, Database};
use shelf::logging::init_logging;
use shelf::worker::{requeue_stale, IngestRequest, JobResult, WorkerPool};
use shelf::{create_backend, Config, IngestionJob, PipelineConfig};

/// Book ingestion worker for Shelf
#[derive(Parser, Debug)]
#[command(name = "shelf-worker")]
#[command(version, about)]
struct Cli {
    /// Configuration file (JSON or YAML)
    #[arg(short, long, env = "SHELF_CONFIG")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Register files (or every file under a directory) as uploads and ingest them
    Ingest {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Re-queue records left pending or processing for too long
    Sweep {
        #[arg(long, default_value_t = 900)]
        stale_after_secs: u64,
    },
    /// Print a book record as JSON
    Status { book_id: String },
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let config = load_config(&cli.config)
        .with_context(|| format!("Failed to load config from {}", cli.config.display()))?;
    init_logging(&config.logging).context("Failed to initialize logging")?;

    let db_path = config
        .database_path()
        .context("Could not determine the database path")?;
    let db = Database::open(&db_path).context("Failed to open database")?;

    match cli.command {
        Command::Status { book_id } => show_status(&db, &book_id),
        Command::Ingest { paths } => {
            let files = collect_files(&paths)?;
            let requests = files
                .iter()
                .map(|path| register(&db, path))
                .collect::<Result<Vec<_>>>()?;
            run_requests(&config, &db, requests)
        }
        Command::Sweep { stale_after_secs } => {
            let stale_after = Duration::from_secs(stale_after_secs);
            run_sweep(&config, &db, stale_after)
        }
    }
}

fn show_status(db: &Database, book_id: &str) -> Result<ExitCode> {
    match book_repo::find_by_id(db, book_id)? {
        Some(record) => {
            println!("{}", serde_json::to_string_pretty(&record)?);
            Ok(ExitCode::SUCCESS)
        }
        None => {
            eprintln!("No book with id {}", book_id);
            Ok(ExitCode::FAILURE)
        }
    }
}

fn collect_files(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            for entry in WalkDir::new(path).sort_by_file_name() {
                let entry = entry.with_context(|| format!("Failed to scan {}", path.display()))?;
                if entry.file_type().is_file() {
                    files.push(entry.into_path());
                }
            }
        } else if path.is_file() {
            files.push(path.clone());
        } else {
            bail!("Not a file or directory: {}", path.display());
        }
    }
    Ok(files)
}

fn register(db: &Database, path: &Path) -> Result<IngestRequest> {
    let path = path
        .canonicalize()
        .with_context(|| format!("Failed to resolve {}", path.display()))?;
    let filename = path.file_name().map(|n| n.to_string_lossy().into_owned());
    let record = book_repo::insert_pending(db, filename.as_deref(), &path)?;
    info!("Registered {} as {}", path.display(), record.id);
    Ok(IngestRequest::from_record(&record))
}

/// Worker pool together with the runtime its jobs run on.
struct Workers {
    runtime: tokio::runtime::Runtime,
    pool: WorkerPool,
}

fn start_workers(config: &Config, db: &Database) -> Result<Workers> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    let storage = runtime
        .block_on(create_backend(&config.storage))
        .context("Failed to initialize storage backend")?;

    let job = IngestionJob::new(
        Arc::new(PipelineConfig::from_config(config)),
        storage,
        Arc::new(db.clone()),
    );
    let pool = WorkerPool::new(Arc::new(job), runtime.handle().clone(), config.worker_count)?;

    let shutdown = pool.shutdown_handle();
    ctrlc::set_handler(move || {
        warn!("Interrupt received, finishing running jobs");
        shutdown.trigger();
    })
    .context("Failed to install Ctrl-C handler")?;

    Ok(Workers { runtime, pool })
}

fn run_requests(config: &Config, db: &Database, requests: Vec<IngestRequest>) -> Result<ExitCode> {
    if requests.is_empty() {
        info!("Nothing to ingest");
        return Ok(ExitCode::SUCCESS);
    }

    let workers = start_workers(config, db)?;
    let expected = requests.len();
    let results = workers.pool.process(requests, print_result);

    workers.pool.wait();
    drop(workers.runtime);
    report(&results, expected)
}

fn run_sweep(config: &Config, db: &Database, stale_after: Duration) -> Result<ExitCode> {
    let workers = start_workers(config, db)?;
    let sweep = requeue_stale(db, &workers.pool, stale_after, print_result)?;

    workers.pool.wait();
    drop(workers.runtime);
    report(&sweep.results, sweep.stale)
}

fn print_result(result: &JobResult) {
    match serde_json::to_string(&result.outcome) {
        Ok(outcome) => println!("{}\t{}", result.book_id, outcome),
        Err(e) => warn!("Failed to render outcome for {}: {}", result.book_id, e),
    }
}

fn report(results: &[JobResult], expected: usize) -> Result<ExitCode> {
    let completed = results.iter().filter(|r| r.is_completed()).count();
    let unfinished = expected - results.len();
    info!(
        "{} of {} completed, {} not completed, {} not run",
        completed,
        expected,
        results.len() - completed,
        unfinished
    );

    if completed == expected {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}
