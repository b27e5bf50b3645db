/// Version injected at compile time via HWC_RECONCILE_VERSION env var (set by CI/CD),
/// or "dev" for local builds.
pub const VERSION: &str = match option_env!("HWC_RECONCILE_VERSION") {
    Some(v) => v,
    None => "dev",
};

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use hwc_reconcile::cloud::http::format_api_error;
use hwc_reconcile::cloud::{CloudClient, Credentials};
use hwc_reconcile::config::Config;
use hwc_reconcile::resource::{get_all_kinds, get_descriptor};
use hwc_reconcile::{resource_for, DesiredState, Lifecycle, ReadOutcome, Resource, ResourceHandle};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Reconcile Huawei Cloud resources against desired-state files
#[derive(Parser, Debug)]
#[command(name = "hwc-reconcile", version = VERSION, about, long_about = None)]
struct Args {
    /// Region to use (e.g. cn-north-4)
    #[arg(short, long, global = true)]
    region: Option<String>,

    /// Project ID to use
    #[arg(short, long, global = true)]
    project: Option<String>,

    /// Log level for debugging
    #[arg(long, value_enum, default_value = "off", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the descriptor of one kind, or list all kinds
    Schema { kind: Option<String> },
    /// Create a resource from a desired-state file (YAML or JSON)
    Create { kind: String, file: PathBuf },
    /// Read the observed state of a resource
    Read { kind: String, id: String },
    /// Apply the difference between two desired-state files
    Update {
        kind: String,
        id: String,
        old: PathBuf,
        new: PathBuf,
    },
    /// Delete a resource; an already deleted one succeeds
    Delete { kind: String, id: String },
    /// Save --region and --project as defaults in the config file
    Configure,
    /// Adopt an existing resource by its import identifier
    Import {
        kind: String,
        id: String,
        /// Only parse the identifier, without reading the resource
        #[arg(long)]
        offline: bool,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Option<Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }
}

fn setup_logging(level: LogLevel) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let tracing_level = level.to_tracing_level()?;

    let log_path = get_log_path();

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let file = match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
    {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Failed to open log file {:?}: {}", log_path, e);
            return None;
        }
    };

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    // RUST_LOG takes precedence over --log-level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(tracing_level.as_str().to_lowercase()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("hwc-reconcile {} started with log level: {:?}", VERSION, level);
    tracing::info!("Log file: {:?}", log_path);

    Some(guard)
}

fn get_log_path() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("hwc-reconcile").join("hwc-reconcile.log");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".hwc-reconcile").join("hwc-reconcile.log");
    }
    PathBuf::from("hwc-reconcile.log")
}

/// Desired state from a YAML or JSON file (JSON is valid YAML)
fn load_desired(path: &Path) -> Result<DesiredState> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let value: Value = serde_yaml::from_str(&content)
        .with_context(|| format!("parsing {}", path.display()))?;
    DesiredState::from_value(value)
        .ok_or_else(|| anyhow!("{} must contain a mapping of attributes", path.display()))
}

fn lookup(kind: &str) -> Result<Box<dyn Resource>> {
    resource_for(kind).ok_or_else(|| {
        anyhow!(
            "unknown resource kind {:?} (known: {})",
            kind,
            get_all_kinds().join(", ")
        )
    })
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn parse_handle(id: &str) -> Result<ResourceHandle> {
    ResourceHandle::new(id).ok_or_else(|| anyhow!("resource id must not be empty"))
}

async fn run(args: Args) -> Result<()> {
    if let Command::Schema { kind } = &args.command {
        return match kind {
            Some(kind) => {
                let descriptor = get_descriptor(kind)
                    .ok_or_else(|| anyhow!("unknown resource kind {:?}", kind))?;
                print_json(&serde_json::to_value(descriptor)?)
            }
            None => print_json(&json!(get_all_kinds())),
        };
    }

    if let Command::Configure = &args.command {
        let mut config = Config::load();
        if let Some(region) = &args.region {
            config.set_region(region)?;
        }
        if let Some(project) = &args.project {
            config.set_project(project)?;
        }
        return print_json(&serde_json::to_value(&config)?);
    }

    // Import without a read needs no settings or credentials
    if let Command::Import {
        kind,
        id,
        offline: true,
    } = &args.command
    {
        let imported = lookup(kind)?.import(id)?;
        return print_json(&json!({
            "id": imported.handle,
            "attributes": imported.identity.into_value(),
        }));
    }

    let config = Config::load();
    let settings = config.settings(args.region.as_deref(), args.project.as_deref())?;
    tracing::info!(
        "Using region: {}, project: {}",
        settings.region,
        settings.project_id
    );

    let cloud = CloudClient::new(settings, Credentials::from_env()?)?;

    match args.command {
        Command::Schema { .. } | Command::Configure => Ok(()),
        Command::Create { kind, file } => {
            let resource = lookup(&kind)?;
            let desired = load_desired(&file)?;
            let done = Lifecycle::for_cloud(resource.as_ref(), &cloud)?
                .create(&desired)
                .await?;
            print_json(&json!({"id": done.handle, "attributes": done.observed.into_value()}))
        }
        Command::Read { kind, id } => {
            let resource = lookup(&kind)?;
            let handle = parse_handle(&id)?;
            match Lifecycle::for_cloud(resource.as_ref(), &cloud)?
                .read(&handle)
                .await?
            {
                ReadOutcome::Present(observed) => {
                    print_json(&json!({"id": handle, "attributes": observed.into_value()}))
                }
                ReadOutcome::NotFound => print_json(&json!({"id": handle, "absent": true})),
            }
        }
        Command::Update { kind, id, old, new } => {
            let resource = lookup(&kind)?;
            let handle = parse_handle(&id)?;
            let old = load_desired(&old)?;
            let new = load_desired(&new)?;
            let done = Lifecycle::for_cloud(resource.as_ref(), &cloud)?
                .update(&handle, &old, &new)
                .await?;
            print_json(&json!({"id": done.handle, "attributes": done.observed.into_value()}))
        }
        Command::Delete { kind, id } => {
            let resource = lookup(&kind)?;
            let handle = parse_handle(&id)?;
            Lifecycle::for_cloud(resource.as_ref(), &cloud)?
                .delete(&handle)
                .await?;
            print_json(&json!({"id": handle, "deleted": true}))
        }
        Command::Import { kind, id, .. } => {
            let resource = lookup(&kind)?;
            let done = Lifecycle::for_cloud(resource.as_ref(), &cloud)?
                .import_and_read(&id)
                .await?;
            print_json(&json!({"id": done.handle, "attributes": done.observed.into_value()}))
        }
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let _log_guard = setup_logging(args.log_level);

    if let Err(err) = run(args).await {
        let message = match err.downcast_ref::<hwc_reconcile::ProviderError>() {
            Some(provider_err) => format_api_error(provider_err),
            None => format!("{:#}", err),
        };
        tracing::error!("{}", message);
        eprintln!("Error: {}", message);
        std::process::exit(1);
    }
}
