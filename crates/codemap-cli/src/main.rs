use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{ArgGroup, Parser, Subcommand};
use codemap_ai::provider_from_config;
use codemap_core::{CodeMapConfig, ConfigManager, ProjectId};
use codemap_daemon::{ProjectEntry, ProjectList, ProjectRegistry};
use codemap_generator::{GenerationOutcome, GenerationRequest, ProjectGenerator};
use colored::*;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{info, warn};
use tracing_subscriber::{filter::EnvFilter, layer::SubscriberExt, Registry};

#[derive(Parser)]
#[command(
    name = "codemap",
    version,
    author,
    about = "CodeMap - keeps a markdown map of your project's structure up to date",
    long_about = "CodeMap writes a project-structure document for each registered project and \
                  regenerates it incrementally as files change."
)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, global = true, help = "Enable verbose logging")]
    verbose: bool,

    #[arg(long, global = true, help = "Configuration file path")]
    config: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        help = "Also write logs to a file under <output dir>/logs"
    )]
    log_file: bool,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Register a project for watching")]
    Add {
        #[arg(help = "Path to the project root")]
        path: PathBuf,

        #[arg(long, help = "Project id (defaults to the directory name)")]
        id: Option<String>,
    },

    #[command(about = "Unregister a project")]
    Remove {
        #[arg(help = "Project id")]
        id: String,
    },

    #[command(about = "List registered projects")]
    List {
        #[arg(long, help = "Print the list as JSON")]
        json: bool,
    },

    #[command(about = "Enable or disable automatic regeneration for a project")]
    #[command(group(ArgGroup::new("toggle").required(true).args(["on", "off"])))]
    AutoUpdate {
        #[arg(help = "Project id")]
        id: String,

        #[arg(long, help = "Regenerate on relevant changes")]
        on: bool,

        #[arg(long, help = "Keep observing but never regenerate")]
        off: bool,
    },

    #[command(about = "Generate the project structure document once")]
    Generate {
        #[arg(help = "Path to the project root", default_value = ".")]
        path: PathBuf,

        #[arg(long, help = "Regenerate even if nothing changed")]
        force: bool,
    },

    #[command(about = "Forget cached fingerprints and snapshot for a project")]
    ClearCache {
        #[arg(help = "Path to the project root", default_value = ".")]
        path: PathBuf,
    },

    #[command(about = "Watch projects and regenerate on change until interrupted")]
    Watch {
        #[arg(help = "Project roots to watch (defaults to every registered project)")]
        paths: Vec<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let manager = match &cli.config {
        Some(path) => ConfigManager::from_path(path),
        None => ConfigManager::load(),
    }
    .context("failed to load configuration")?;
    let config = manager.into_config();

    let log_path = init_logging(&config, cli.verbose, cli.log_file)?;
    if let Some(path) = log_path {
        println!("{} {}", "Log file:".cyan(), path.display());
    }

    match cli.command {
        Commands::Add { path, id } => handle_add(&config, &path, id),
        Commands::Remove { id } => handle_remove(&config, id),
        Commands::List { json } => handle_list(&config, json),
        Commands::AutoUpdate { id, on, off: _ } => handle_auto_update(&config, id, on),
        Commands::Generate { path, force } => handle_generate(&config, &path, force).await,
        Commands::ClearCache { path } => handle_clear_cache(&config, &path),
        Commands::Watch { paths } => handle_watch(config, paths).await,
    }
}

fn init_logging(config: &CodeMapConfig, verbose: bool, log_file: bool) -> Result<Option<PathBuf>> {
    let env_filter = || {
        if verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.logging.level.as_str()))
        }
    };

    if !log_file {
        let subscriber = Registry::default()
            .with(env_filter())
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr));
        tracing::subscriber::set_global_default(subscriber).ok();
        return Ok(None);
    }

    let cwd = std::env::current_dir().context("cannot resolve current directory")?;
    let log_dir = config.output.output_dir(&cwd).join("logs");
    fs::create_dir_all(&log_dir)
        .with_context(|| format!("cannot create log directory {}", log_dir.display()))?;
    let log_path = log_dir.join(format!("codemap-{}.log", Utc::now().format("%Y%m%dT%H%M%S")));
    let file = File::create(&log_path)
        .with_context(|| format!("cannot create log file {}", log_path.display()))?;

    let subscriber = Registry::default()
        .with(env_filter())
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(Mutex::new(file))
                .with_ansi(false),
        );
    tracing::subscriber::set_global_default(subscriber).ok();
    Ok(Some(log_path))
}

fn resolve_root(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

/// Registered id for `root`, or its directory name.
fn project_id_for(list: &ProjectList, root: &Path) -> ProjectId {
    list.entries()
        .iter()
        .find(|e| e.path == root)
        .map(|e| e.id.clone())
        .unwrap_or_else(|| ProjectId::from_path(root))
}

fn handle_add(config: &CodeMapConfig, path: &Path, id: Option<String>) -> Result<()> {
    let root = resolve_root(path);
    let id = id.map(ProjectId::from).unwrap_or_else(|| ProjectId::from_path(&root));
    let mut list = ProjectList::load(&config.daemon.projects_file);

    if !root.is_dir() {
        println!(
            "{} {} does not exist yet; it will be watched once it does",
            "Warning:".yellow().bold(),
            root.display()
        );
    } else {
        let output_dir = config.output.output_dir(&root);
        fs::create_dir_all(&output_dir)
            .with_context(|| format!("cannot create {}", output_dir.display()))?;
    }

    let added = list.add(ProjectEntry {
        id: id.clone(),
        path: root.clone(),
        auto_update: config.daemon.auto_update,
    });
    if !added {
        println!("{} {} is already registered", "Note:".cyan(), id.as_str().bold());
        return Ok(());
    }
    list.save().context("failed to save project list")?;
    info!(project = %id, "Registered {}", root.display());
    println!("{} {} -> {}", "Added".green().bold(), id.as_str().bold(), root.display());
    Ok(())
}

fn handle_remove(config: &CodeMapConfig, id: String) -> Result<()> {
    let id = ProjectId::from(id);
    let mut list = ProjectList::load(&config.daemon.projects_file);
    if !list.remove(&id) {
        bail!("no project registered as '{}'", id);
    }
    list.save().context("failed to save project list")?;
    println!("{} {}", "Removed".green().bold(), id.as_str().bold());
    Ok(())
}

fn handle_list(config: &CodeMapConfig, json: bool) -> Result<()> {
    let list = ProjectList::load(&config.daemon.projects_file);
    if json {
        println!("{}", serde_json::to_string_pretty(list.entries())?);
        return Ok(());
    }
    if list.is_empty() {
        println!("No projects registered. Use {} to add one.", "codemap add <path>".cyan());
        return Ok(());
    }

    println!("{}", "Registered projects".green().bold());
    for entry in list.entries() {
        let auto = if entry.auto_update {
            "auto-update on".green()
        } else {
            "auto-update off".yellow()
        };
        let missing = if entry.path.is_dir() {
            "".normal()
        } else {
            " (missing)".red()
        };
        println!(
            "  {} {}{} [{}]",
            entry.id.as_str().bold(),
            entry.path.display(),
            missing,
            auto
        );
    }
    Ok(())
}

fn handle_auto_update(config: &CodeMapConfig, id: String, enabled: bool) -> Result<()> {
    let id = ProjectId::from(id);
    let mut list = ProjectList::load(&config.daemon.projects_file);
    if !list.set_auto_update(&id, enabled) {
        bail!("no project registered as '{}'", id);
    }
    list.save().context("failed to save project list")?;
    println!(
        "Auto-update for {}: {}",
        id.as_str().bold(),
        if enabled { "on".green() } else { "off".yellow() }
    );
    Ok(())
}

fn build_generator(config: &CodeMapConfig, path: &Path) -> Result<ProjectGenerator> {
    let root = resolve_root(path);
    if !root.is_dir() {
        bail!("project path {} does not exist", root.display());
    }
    let list = ProjectList::load(&config.daemon.projects_file);
    let id = project_id_for(&list, &root);
    let provider = provider_from_config(&config.description);
    Ok(ProjectGenerator::new(id, root, config, provider))
}

async fn handle_generate(config: &CodeMapConfig, path: &Path, force: bool) -> Result<()> {
    let mut generator = build_generator(config, path)?;
    let request = GenerationRequest {
        force,
        ..Default::default()
    };
    let report = generator
        .generate(request)
        .await
        .with_context(|| format!("generation failed for {}", generator.project_id()))?;

    let outcome = match report.outcome {
        GenerationOutcome::Full => "full".green(),
        GenerationOutcome::Incremental => "incremental".green(),
        GenerationOutcome::Reused => "up to date".cyan(),
    };
    println!(
        "{} {} ({})",
        "Generated".green().bold(),
        report.artifact.display(),
        outcome
    );
    println!(
        "  files processed: {}, reused: {}, descriptions: {}, took {:.2?}",
        report.files_processed, report.files_reused, report.description_calls, report.duration
    );
    Ok(())
}

fn handle_clear_cache(config: &CodeMapConfig, path: &Path) -> Result<()> {
    let mut generator = build_generator(config, path)?;
    generator.clear_cache()?;
    println!(
        "{} {}",
        "Cleared cache for".green().bold(),
        generator.project_id().as_str().bold()
    );
    Ok(())
}

async fn handle_watch(config: CodeMapConfig, paths: Vec<PathBuf>) -> Result<()> {
    let list = ProjectList::load(&config.daemon.projects_file);
    let targets: Vec<ProjectEntry> = if paths.is_empty() {
        list.entries().to_vec()
    } else {
        paths
            .iter()
            .map(|p| {
                let root = resolve_root(p);
                ProjectEntry {
                    id: project_id_for(&list, &root),
                    path: root,
                    auto_update: config.daemon.auto_update,
                }
            })
            .collect()
    };

    let (valid, missing): (Vec<_>, Vec<_>) = targets.into_iter().partition(|e| e.path.is_dir());
    for entry in &missing {
        warn!(project = %entry.id, "Skipping missing project path {}", entry.path.display());
    }
    if valid.is_empty() {
        println!("{}", "Nothing to watch.".yellow());
        return Ok(());
    }

    let mut registry = ProjectRegistry::new(config);
    for entry in &valid {
        let id = registry.add_project(&entry.path, Some(entry.id.clone()));
        registry.set_auto_update(&id, entry.auto_update);
        println!(
            "{} {} ({})",
            "Watching".green().bold(),
            id.as_str().bold(),
            entry.path.display()
        );
    }
    // catch up on edits made while no session was running
    registry.request_regeneration_all();
    println!("Press Ctrl-C to stop.");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    println!("\n{}", "Stopping watch sessions...".cyan());
    for status in registry.status() {
        info!(
            project = %status.id,
            regenerations = status.metrics.regenerations,
            failures = status.metrics.failures,
            "Session summary"
        );
    }
    registry.stop_all().await;
    println!("{}", "Stopped.".green());
    Ok(())
}
