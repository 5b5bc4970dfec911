//! stagetrack CLI - staged-workflow tracker
//!
//! Command-line interface for creating projects from workflow templates,
//! moving their stages through the lifecycle and inspecting progress.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use stagetrack_core::{
    EventBus, Note, ProjectCoordinator, ProjectId, Publisher, StageInstance, StagePatch,
    StageRegistry, StageStatus, StageTracker, TrackerConfig, TransitionOutcome,
};
use stagetrack_notify::{NotificationManager, Notifier};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};

mod tui;

/// stagetrack - staged-workflow tracker
///
/// Tracks projects through ordered stages whose completion is gated on
/// their dependencies.
#[derive(Parser)]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Tracker root (defaults to the nearest directory containing .stagetrack)
    #[arg(long, global = true)]
    root: Option<PathBuf>,
}

/// Available stagetrack commands
#[derive(Subcommand)]
enum Commands {
    /// Initialize a tracker in the current directory
    ///
    /// Creates .stagetrack/ with a default config.toml, the project store and
    /// a directory for notification template overrides.
    Init,

    /// List workflow types, or the stages of one workflow
    Workflows {
        /// Workflow to describe
        name: Option<String>,
    },

    /// Create a project from a workflow type
    Create {
        /// Workflow type (e.g. "conveyancing")
        workflow: String,

        /// Project id (generated when omitted)
        #[arg(long)]
        id: Option<ProjectId>,
    },

    /// List projects
    List,

    /// Show the stages of a project
    Status {
        /// Project id
        project: ProjectId,

        /// Print the snapshot as JSON
        #[arg(long)]
        json: bool,
    },

    /// Request a status change for one stage
    Transition {
        /// Project id
        project: ProjectId,

        /// Stage id
        stage: String,

        /// New status (not_started, in_progress, in_review, approved,
        /// completed, delayed, blocked)
        status: StageStatus,

        /// Who requests the change (defaults to tracker.default_actor)
        #[arg(long)]
        actor: Option<String>,
    },

    /// Update progress, assignees or notes of one stage
    Update {
        /// Project id
        project: ProjectId,

        /// Stage id
        stage: String,

        /// New status
        #[arg(long)]
        status: Option<StageStatus>,

        /// Progress percentage (0-100)
        #[arg(long)]
        progress: Option<u8>,

        /// Assigned party; repeat to assign several, replaces the current list
        #[arg(long = "assign")]
        assign: Vec<String>,

        /// Remove every assigned party
        #[arg(long, conflicts_with = "assign")]
        unassign: bool,

        /// Note to append
        #[arg(long)]
        note: Option<String>,

        /// Who makes the change (defaults to tracker.default_actor)
        #[arg(long)]
        actor: Option<String>,
    },

    /// Show completion, active stages and the critical path of a project
    Summary {
        /// Project id
        project: ProjectId,

        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Delete a project
    Delete {
        /// Project id
        project: ProjectId,
    },

    /// Open the interactive dashboard for a project
    Dashboard {
        /// Project id
        project: ProjectId,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Initialize tracing subscriber
    init_tracing(cli.verbose);

    // Execute command
    if let Err(e) = run_command(cli.command, cli.root).await {
        error!("Command failed: {:#}", e);
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}

/// Initialize tracing subscriber for structured logging
fn init_tracing(verbose: bool) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = if verbose {
        EnvFilter::new("stagetrack=debug,stagetrack_core=debug,stagetrack_notify=debug")
    } else {
        EnvFilter::new("stagetrack=warn,stagetrack_core=warn,stagetrack_notify=warn")
    };

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true)
        .with_writer(std::io::stderr)
        .init();
}

/// Execute the specified command
async fn run_command(command: Commands, root: Option<PathBuf>) -> Result<()> {
    match command {
        Commands::Init => run_init(root),
        Commands::Workflows { name } => {
            let session = Session::open(root)?;
            run_workflows(&session, name.as_deref())
        }
        Commands::Create { workflow, id } => {
            let session = Session::open(root)?;
            let project = match id {
                Some(id) => session.coordinator.create_project_with_id(id, &workflow),
                None => session.coordinator.create_project(&workflow),
            }
            .with_context(|| format!("Failed to create {workflow} project"))?;
            info!("Created project {}", project);
            println!("✔ Created {} project {}", workflow, project);
            println!("\nNext steps:");
            println!("  stagetrack status {}", project);
            Ok(())
        }
        Commands::List => {
            let session = Session::open(root)?;
            run_list(&session)
        }
        Commands::Status { project, json } => {
            let session = Session::open(root)?;
            run_status(&session, &project, json)
        }
        Commands::Transition {
            project,
            stage,
            status,
            actor,
        } => {
            let session = Session::open(root)?;
            let actor = session.actor(actor);
            session.attach_printer(&project)?;
            let outcome = session
                .coordinator
                .request_stage_transition(&project, &stage, status, &actor)
                .with_context(|| format!("Failed to move '{stage}' to {status}"))?;
            print_outcome(&stage, &outcome);
            Ok(())
        }
        Commands::Update {
            project,
            stage,
            status,
            progress,
            assign,
            unassign,
            note,
            actor,
        } => {
            let session = Session::open(root)?;
            let actor = session.actor(actor);

            let mut patch = StagePatch {
                status,
                progress,
                ..Default::default()
            };
            if unassign {
                patch = patch.with_assigned_parties(Vec::new());
            } else if !assign.is_empty() {
                patch = patch.with_assigned_parties(assign);
            }
            if let Some(text) = note {
                patch = patch.with_note(Note::new(actor.as_str(), text));
            }
            if patch.is_empty() {
                anyhow::bail!("Nothing to update: pass --status, --progress, --assign, --unassign or --note");
            }

            session.attach_printer(&project)?;
            let outcome = session
                .coordinator
                .update_stage(&project, &stage, patch, &actor)
                .with_context(|| format!("Failed to update '{stage}'"))?;
            print_outcome(&stage, &outcome);
            Ok(())
        }
        Commands::Summary { project, json } => {
            let session = Session::open(root)?;
            run_summary(&session, &project, json)
        }
        Commands::Delete { project } => {
            let session = Session::open(root)?;
            session
                .coordinator
                .delete_project(&project)
                .with_context(|| format!("Failed to delete project {project}"))?;
            println!("✔ Deleted project {}", project);
            Ok(())
        }
        Commands::Dashboard { project } => {
            let session = Session::open(root)?;
            info!("Starting dashboard for {}", project);
            tui::run_dashboard(&session, &project)
                .await
                .context("Dashboard failed")
        }
    }
}

/// Loaded configuration plus a coordinator wired to an event bus.
pub(crate) struct Session {
    pub(crate) config: TrackerConfig,
    pub(crate) bus: Arc<EventBus>,
    pub(crate) coordinator: ProjectCoordinator,
}

impl Session {
    /// Opens the tracker at `root`, or the nearest initialized ancestor of
    /// the current directory.
    fn open(root: Option<PathBuf>) -> Result<Self> {
        let root = match root {
            Some(root) => root,
            None => find_tracker_root()?,
        };
        let config = load_config(&root)?;

        let bus = Arc::new(EventBus::new());
        let coordinator =
            ProjectCoordinator::from_config(&config, Arc::clone(&bus) as Arc<dyn Publisher>)
                .context("Failed to load workflows")?;

        Ok(Self {
            config,
            bus,
            coordinator,
        })
    }

    /// Actor for a change, falling back to the configured default.
    fn actor(&self, actor: Option<String>) -> String {
        actor.unwrap_or_else(|| self.config.tracker.default_actor.clone())
    }

    /// Builds a notifier for `project` using the template overrides.
    pub(crate) fn notifier(&self, project: &ProjectId) -> Result<Notifier> {
        let manager = NotificationManager::discover(&self.config.templates_dir)
            .context("Failed to load notification templates")?;
        let registry = self.coordinator.project_registry(project)?;
        Ok(Notifier::new(manager).with_registry(registry))
    }

    /// Prints every event raised by the next operation.
    fn attach_printer(&self, project: &ProjectId) -> Result<()> {
        let notifier = Arc::new(self.notifier(project)?);
        notifier.attach(&self.bus, |_, message| {
            println!("  → {message}");
            Ok(())
        });
        Ok(())
    }
}

/// Run the init command
fn run_init(root: Option<PathBuf>) -> Result<()> {
    let root = match root {
        Some(root) => root,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };
    let config = TrackerConfig::new(root);

    if config.is_initialized() {
        println!("Tracker already initialized at {}", config.state_dir.display());
        return Ok(());
    }

    config.save().context("Failed to write default configuration")?;
    for dir in [&config.data_dir, &config.templates_dir] {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    info!("Initialized tracker at {}", config.root.display());

    println!("✔ Created .stagetrack/ directory");
    println!("✔ Generated default configuration");
    println!("✔ Created project store and template directory");
    println!("\nTracker initialized!");
    println!("\nNext steps:");
    println!("  stagetrack workflows             List workflow types");
    println!("  stagetrack create <workflow>     Create a project");

    Ok(())
}

/// Run the workflows command
fn run_workflows(session: &Session, name: Option<&str>) -> Result<()> {
    let catalog = session.coordinator.catalog();

    let Some(name) = name else {
        for (name, entry) in catalog.iter() {
            println!(
                "{:<16} {:>2} stages  {}",
                name,
                entry.registry.len(),
                entry.description
            );
        }
        return Ok(());
    };

    let registry = catalog.get(name)?;
    let (path, days) = registry.critical_path();
    println!("{} ({} stages)", name, registry.len());
    for stage in registry.stages() {
        let deps = if stage.dependencies.is_empty() {
            "-".to_string()
        } else {
            stage.dependencies.join(", ")
        };
        let estimate = stage
            .estimated_days
            .map(|d| format!("{d}d"))
            .unwrap_or_default();
        let approval = if stage.approval_required { "approval" } else { "" };
        println!(
            "  {:<14} {:<32} {:>5}  after: {:<24} {}",
            stage.id, stage.name, estimate, deps, approval
        );
    }
    println!("\nCritical path: {} ({} days)", path.join(" -> "), days);

    Ok(())
}

/// Run the list command
fn run_list(session: &Session) -> Result<()> {
    let projects = session.coordinator.list_projects()?;
    if projects.is_empty() {
        println!("No projects yet. Create one with 'stagetrack create <workflow>'.");
        return Ok(());
    }

    for id in projects {
        let summary = session.coordinator.project_summary(&id)?;
        println!(
            "{:<38} {:<14} {:>3}%",
            id, summary.workflow, summary.completion_percentage
        );
    }
    Ok(())
}

/// Run the status command
fn run_status(session: &Session, project: &ProjectId, json: bool) -> Result<()> {
    let snapshot = session.coordinator.get_project_stage_snapshot(project)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
        return Ok(());
    }

    let registry = session.coordinator.project_registry(project)?;
    print_snapshot(&registry, &snapshot);
    Ok(())
}

fn print_snapshot(registry: &StageRegistry, snapshot: &[StageInstance]) {
    println!(
        "{:<14} {:<32} {:<12} {:>5}  ASSIGNED",
        "STAGE", "NAME", "STATUS", "PROG"
    );
    for instance in snapshot {
        let name = registry
            .get(&instance.stage_id)
            .map(|s| s.name.as_str())
            .unwrap_or_default();
        println!(
            "{:<14} {:<32} {:<12} {:>4}%  {}",
            instance.stage_id,
            name,
            instance.status,
            instance.progress,
            instance.assigned_parties.join(", ")
        );
        if let Some(note) = instance.notes.last() {
            println!("{:<14} └ {}: {}", "", note.author, note.text);
        }
    }
}

/// Run the summary command
fn run_summary(session: &Session, project: &ProjectId, json: bool) -> Result<()> {
    let summary = session.coordinator.project_summary(project)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("Project:       {} ({})", summary.project_id, summary.workflow);
    println!(
        "Completion:    {}% ({}/{} stages)",
        summary.completion_percentage, summary.terminal_stages, summary.total_stages
    );
    println!("Active:        {}", list_or_dash(&summary.active));
    println!("Ready:         {}", list_or_dash(&summary.ready));
    println!("Stalled:       {}", list_or_dash(&summary.stalled));
    println!(
        "Critical path: {} ({} days remaining)",
        summary.critical_path.join(" -> "),
        summary.remaining_critical_days
    );
    Ok(())
}

fn list_or_dash(items: &[String]) -> String {
    if items.is_empty() {
        "-".to_string()
    } else {
        items.join(", ")
    }
}

fn print_outcome(stage: &str, outcome: &TransitionOutcome) {
    if !outcome.changed {
        println!("✔ '{}' unchanged ({})", stage, outcome.instance.status);
        return;
    }
    if outcome.previous_status != outcome.instance.status {
        println!(
            "✔ '{}' {} -> {}",
            stage, outcome.previous_status, outcome.instance.status
        );
    } else {
        println!("✔ '{}' updated ({}%)", stage, outcome.instance.progress);
    }
    for id in &outcome.auto_advanced {
        println!("✔ '{}' started", id);
    }
}

/// Find the tracker root by searching for a .stagetrack directory
fn find_tracker_root() -> Result<PathBuf> {
    let current_dir = std::env::current_dir().context("Failed to get current directory")?;

    let mut path = current_dir.as_path();
    loop {
        if path.join(stagetrack_core::config::STATE_DIR).is_dir() {
            return Ok(path.to_path_buf());
        }

        match path.parent() {
            Some(parent) => path = parent,
            None => {
                anyhow::bail!("Not a stagetrack directory. Run 'stagetrack init' first.")
            }
        }
    }
}

/// Load configuration from .stagetrack/config.toml
fn load_config(root: &Path) -> Result<TrackerConfig> {
    let config = TrackerConfig::load(root.to_path_buf())
        .with_context(|| format!("Failed to load configuration under {}", root.display()))?;
    if !config.is_initialized() {
        anyhow::bail!(
            "Tracker not initialized. Run 'stagetrack init' first.\n\
             Expected directory: {}",
            config.state_dir.display()
        );
    }
    Ok(config)
}
