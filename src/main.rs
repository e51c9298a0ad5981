use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use plon_canvas::config::CanvasConfig;
use plon_canvas::domain::canvas_state::CanvasStateDocument;
use plon_canvas::domain::task::Task;
use plon_canvas::repository::database::init_database;
use plon_canvas::repository::{CanvasSnapshotRepository, CanvasStore, JsonFileStore};
use plon_canvas::services::persistence::load_latest;
use plon_canvas::services::{CanvasEngine, InMemoryTaskStore, PersistenceScheduler, SnapshotSource};

#[derive(Parser)]
#[command(name = "plon-canvas", about = "Inspect and maintain plon canvas snapshots", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Read settings from this file instead of the user config directory
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Summarize a snapshot
    Inspect(SnapshotArgs),
    /// Drop positions, assignments and connections for tasks missing from a task list
    Prune(PruneArgs),
    /// Pick the newer of two snapshots
    Resolve(ResolveArgs),
}

#[derive(Args)]
struct SnapshotArgs {
    /// Snapshot JSON file; defaults to the configured store
    snapshot: Option<PathBuf>,
}

#[derive(Args)]
struct PruneArgs {
    #[command(flatten)]
    target: SnapshotArgs,

    /// JSON array of tasks that still exist
    #[arg(long)]
    tasks: PathBuf,

    /// Report what would be pruned without writing
    #[arg(long)]
    dry_run: bool,
}

#[derive(Args)]
struct ResolveArgs {
    local: PathBuf,
    remote: PathBuf,

    /// Write the winning snapshot here
    #[arg(long)]
    out: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => CanvasConfig::load_from(path)?,
        None => CanvasConfig::load()?,
    };

    match cli.command {
        Commands::Inspect(args) => inspect(&config, args, cli.json).await,
        Commands::Prune(args) => prune(config, args, cli.json).await,
        Commands::Resolve(args) => resolve(args, cli.json).await,
    }
}

/// Explicit path wins; then the configured SQLite database; then the JSON snapshot path.
async fn open_store(config: &CanvasConfig, snapshot: Option<PathBuf>) -> Result<Arc<dyn CanvasStore>> {
    if let Some(path) = snapshot {
        return Ok(Arc::new(JsonFileStore::new(path)));
    }
    if let Some(db_path) = &config.database_path {
        let db = db_path
            .to_str()
            .ok_or_else(|| anyhow!("Database path is not valid UTF-8"))?;
        let pool = init_database(db).await?;
        return Ok(Arc::new(CanvasSnapshotRepository::new(pool)));
    }
    Ok(Arc::new(JsonFileStore::new(config.snapshot_path()?)))
}

async fn inspect(config: &CanvasConfig, args: SnapshotArgs, json: bool) -> Result<()> {
    let store = open_store(config, args.snapshot).await?;
    let document = store
        .load()
        .await?
        .ok_or_else(|| anyhow!("No snapshot found in {} store", store.name()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary_json(&document))?);
    } else {
        print_summary(&document);
    }
    Ok(())
}

fn summary_json(document: &CanvasStateDocument) -> serde_json::Value {
    let mut by_type: BTreeMap<String, usize> = BTreeMap::new();
    for connection in &document.connections {
        *by_type
            .entry(format!("{:?}", connection.connection_type).to_lowercase())
            .or_default() += 1;
    }
    serde_json::json!({
        "version": document.version,
        "compatible": document.is_compatible(),
        "lastModified": document.last_modified,
        "viewport": document.viewport,
        "sections": document.sections.len(),
        "taskPositions": document.task_positions.len(),
        "sectionAssignments": document.section_assignments.len(),
        "connections": by_type,
    })
}

fn print_summary(document: &CanvasStateDocument) {
    let compat = if document.is_compatible() { "" } else { " (incompatible)" };
    println!("version:        {}{}", document.version, compat);
    println!("last modified:  {}", document.last_modified.to_rfc3339());
    println!(
        "viewport:       x={:.1} y={:.1} zoom={:.2}",
        document.viewport.x, document.viewport.y, document.viewport.zoom
    );
    println!("task positions: {}", document.task_positions.len());
    println!("assignments:    {}", document.section_assignments.len());
    println!("connections:    {}", document.connections.len());
    println!("sections:       {}", document.sections.len());
    for section in &document.sections {
        let filter = section.property_value.as_deref().unwrap_or("-");
        let collapsed = if section.is_collapsed { " [collapsed]" } else { "" };
        println!(
            "  {} {:?}={} at ({:.0}, {:.0}) {}x{}{}",
            section.name,
            section.section_type,
            filter,
            section.position.x,
            section.position.y,
            section.size.width,
            section.size.height,
            collapsed
        );
    }
}

fn read_tasks(path: &Path) -> Result<Vec<Task>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read task list {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid task list in {}", path.display()))
}

async fn prune(config: CanvasConfig, args: PruneArgs, json: bool) -> Result<()> {
    let tasks = read_tasks(&args.tasks)?;
    let store = open_store(&config, args.target.snapshot).await?;
    let scheduler = PersistenceScheduler::new(vec![store.clone()], config.debounce());
    let mut engine =
        CanvasEngine::new(Arc::new(InMemoryTaskStore::new(tasks)), config).with_persistence(scheduler);

    let (_, report) = engine
        .load(store.as_ref(), None)
        .await?
        .ok_or_else(|| anyhow!("No snapshot found in {} store", store.name()))?;

    if args.dry_run {
        engine.end_session();
    } else {
        engine
            .flush()
            .await
            .map_err(|e| anyhow!("Failed to write pruned snapshot: {e}"))?;
    }

    if json {
        println!(
            "{}",
            serde_json::json!({
                "orphanedPositions": report.orphaned_positions,
                "orphanedConnections": report.orphaned_connections,
                "droppedPositions": report.dropped_positions,
                "droppedSections": report.dropped_sections,
                "droppedConnections": report.dropped_connections,
                "droppedAssignments": report.dropped_assignments,
                "written": !args.dry_run,
            })
        );
    } else {
        println!(
            "pruned {} positions and {} connections{}",
            report.orphaned_positions,
            report.orphaned_connections,
            if args.dry_run { " (dry run)" } else { "" }
        );
    }
    Ok(())
}

async fn resolve(args: ResolveArgs, json: bool) -> Result<()> {
    let local = JsonFileStore::new(&args.local);
    let remote = JsonFileStore::new(&args.remote);
    let resolved = load_latest(&local, Some(&remote as &dyn CanvasStore))
        .await?
        .ok_or_else(|| anyhow!("Neither snapshot exists"))?;

    if let Some(out) = &args.out {
        JsonFileStore::new(out).save(&resolved.document).await?;
    }

    let winner = match resolved.source {
        SnapshotSource::Local => &args.local,
        SnapshotSource::Remote => &args.remote,
    };
    if json {
        println!(
            "{}",
            serde_json::json!({
                "winner": winner,
                "lastModified": resolved.document.last_modified,
            })
        );
    } else {
        println!(
            "{} wins (last modified {})",
            winner.display(),
            resolved.document.last_modified.to_rfc3339()
        );
    }
    Ok(())
}
