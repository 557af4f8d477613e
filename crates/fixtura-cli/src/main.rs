mod config;
mod registry;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use clap::{Args, Parser, Subcommand};
use fixtura_core::{Error as CoreError, SchemaRegistry, build_reference_graph_report};
use fixtura_import::{ImportError, ImportSession, load_fixtures};
use fixtura_store::{MemoryStore, Store};
use registry::{RunContext, init_run_logging, start_run, write_entities, write_report};
use thiserror::Error;
use uuid::Uuid;

use config::{ConfigError, Overrides};

#[derive(Debug, Error)]
enum CliError {
    #[error("registry error: {0}")]
    Registry(#[from] registry::RegistryError),
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("schema error: {0}")]
    Core(#[from] CoreError),
    #[error("import failed: {0}")]
    Import(#[from] ImportError),
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

#[derive(Parser, Debug)]
#[command(name = "fixtura", version, about = "Fixture seeding CLI")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Import fixtures into an in-memory store and record the run.
    Import(ImportArgs),
    /// Validate a schema file and print its reference graph.
    Check(CheckArgs),
}

#[derive(Args, Debug)]
struct ImportArgs {
    /// Schema document describing every collection.
    #[arg(long, value_name = "FILE")]
    schema: PathBuf,
    /// Fixture root directory (overrides `base_dir` from the config).
    #[arg(long, value_name = "DIR")]
    fixtures: Option<PathBuf>,
    /// TOML config file (defaults to ./fixtura.toml when present).
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Output directory for runs.
    #[arg(long, default_value = "runs")]
    run_dir: PathBuf,
    /// Fixture id to import; empty imports everything.
    #[arg(long, default_value = "")]
    id: String,
    /// Skip the import when the admin user already exists.
    #[arg(long, default_value_t = false, conflicts_with = "id")]
    bootstrap: bool,
    #[arg(long)]
    admin_email: Option<String>,
    #[arg(long)]
    admin_password: Option<String>,
    /// Base URL used for upload links in markup content.
    #[arg(long)]
    api_url: Option<String>,
}

#[derive(Args, Debug)]
struct CheckArgs {
    /// Schema document describing every collection.
    #[arg(long, value_name = "FILE")]
    schema: PathBuf,
    /// Fail when collections reference each other in a cycle.
    #[arg(long, default_value_t = false)]
    strict: bool,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let cli = Cli::parse();

    match cli.command {
        Command::Import(args) => run_import(args).await,
        Command::Check(args) => run_check(args),
    }
}

async fn run_import(args: ImportArgs) -> Result<(), CliError> {
    let ImportArgs {
        schema,
        fixtures,
        config: config_path,
        run_dir,
        id,
        bootstrap,
        admin_email,
        admin_password,
        api_url,
    } = args;

    let options = config::resolve(
        config::load_options(config_path.as_deref())?,
        Overrides {
            fixtures,
            admin_email,
            admin_password,
            api_url,
        },
    );
    if !options.base_dir.is_dir() {
        return Err(CliError::InvalidConfig(format!(
            "fixture directory {} does not exist",
            options.base_dir.display()
        )));
    }

    let registry = load_schema(&schema)?;
    let store = Arc::new(MemoryStore::new(registry));

    let run_id = Uuid::new_v4().to_string();
    let run_ctx = RunContext {
        run_id: run_id.clone(),
        started_at: chrono::Utc::now(),
        engine: store.engine().to_string(),
        fixture_id: id.clone(),
        schema_path: schema,
        run_dir,
        options: options.clone(),
    };
    let run_paths = start_run(&run_ctx)?;
    init_run_logging(&run_paths.logs_path)?;

    tracing::info!(event = "run_started", run_id = %run_id, engine = %run_ctx.engine);
    let timer = Instant::now();

    let session = ImportSession::new(store.clone(), options)?;
    let outcome = if bootstrap {
        load_fixtures(&session).await.map(|imported| {
            if !imported {
                tracing::info!(event = "import_skipped", "admin user already present");
            }
        })
    } else {
        let result = session.import_fixtures(&id).await.map(|_| ());
        session.report().log_summary();
        result
    };

    write_report(&run_paths, &session.report())?;
    write_entities(&run_paths, &store.dump())?;
    tracing::info!(event = "artifacts_written", path = %run_paths.root.display());

    let duration_ms = timer.elapsed().as_millis();
    match outcome {
        Ok(()) => {
            tracing::info!(event = "run_finished", status = "success", duration_ms = duration_ms);
            Ok(())
        }
        Err(err) => {
            tracing::error!(event = "run_finished", status = "failed", duration_ms = duration_ms, error = %err);
            Err(err.into())
        }
    }
}

fn run_check(args: CheckArgs) -> Result<(), CliError> {
    let registry = load_schema(&args.schema)?;
    let report = build_reference_graph_report(&registry);
    println!("{}", serde_json::to_string_pretty(&report)?);

    if args.strict && report.has_cycle() {
        return Err(CliError::InvalidConfig(
            "collection reference graph contains cycles".to_string(),
        ));
    }
    Ok(())
}

/// Parses and validates a schema document.
fn load_schema(path: &Path) -> Result<SchemaRegistry, CliError> {
    let raw = std::fs::read_to_string(path).map_err(|source| CliError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(SchemaRegistry::from_json_str(&raw)?)
}
