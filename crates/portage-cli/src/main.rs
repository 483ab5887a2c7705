//! Portage CLI - move a GitLab estate to GitHub and Docker Hub.

use clap::{Args, Parser, Subcommand};
use portage_migrate::{snapshot::DEFAULT_SNAPSHOT, RunSummary};
use std::path::PathBuf;

mod commands;
mod logging;

use commands::Settings;

/// Exit status when `--strict` is set and something failed.
const EXIT_PARTIAL_FAILURE: i32 = 2;

/// Portage - migrate GitLab projects, images and remotes
#[derive(Parser, Debug)]
#[command(name = "portage")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Env file with credentials (default: .env when present)
    #[arg(long, global = true)]
    env_file: Option<PathBuf>,

    /// Directory for per-run log files
    #[arg(long, default_value = "logs", global = true)]
    log_dir: PathBuf,

    /// Exit with status 2 when any item failed
    #[arg(long, global = true)]
    strict: bool,

    #[command(flatten)]
    settings: SettingsArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct SettingsArgs {
    /// Base URL of the GitLab instance
    #[arg(long, env = "GITLAB_URL", global = true)]
    gitlab_url: Option<String>,

    /// Registry queried for tag listings
    #[arg(long, env = "REGISTRY_URL", global = true)]
    registry_url: Option<String>,

    /// Registry host[:port] images are pulled from (default: the GitLab host)
    #[arg(long, env = "SOURCE_REGISTRY", global = true)]
    source_registry: Option<String>,

    /// Namespace of the projects on GitLab and in the registry
    #[arg(long, env = "SOURCE_NAMESPACE", global = true)]
    source_namespace: Option<String>,

    /// Destination GitHub organization
    #[arg(long, env = "GITHUB_ORG", global = true)]
    github_org: Option<String>,

    /// Accept invalid TLS certificates from the GitLab host
    #[arg(long, global = true)]
    insecure: bool,
}

impl From<SettingsArgs> for Settings {
    fn from(args: SettingsArgs) -> Self {
        Self {
            gitlab_url: args.gitlab_url,
            registry_url: args.registry_url,
            source_registry: args.source_registry,
            source_namespace: args.source_namespace,
            github_org: args.github_org,
            insecure: args.insecure,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List GitLab projects with branches and images, and write a snapshot
    Discover {
        /// Pre-seed file of known image references
        #[arg(long)]
        preseed: Option<PathBuf>,
        /// Snapshot output path
        #[arg(long, default_value = DEFAULT_SNAPSHOT)]
        snapshot: PathBuf,
    },

    /// Copy every known image tag to Docker Hub
    MigrateImages {
        /// Use a snapshot instead of running discovery
        #[arg(long)]
        from_snapshot: Option<PathBuf>,
        /// Pre-seed file of known image references
        #[arg(long, conflicts_with = "from_snapshot")]
        preseed: Option<PathBuf>,
        /// Snapshot output path when discovery runs
        #[arg(long, default_value = DEFAULT_SNAPSHOT)]
        snapshot: PathBuf,
    },

    /// Clone projects and rewrite image and source references on every branch
    RewriteRepos {
        /// Directory to clone into
        target_dir: PathBuf,
        /// Use a snapshot instead of listing GitLab
        #[arg(long)]
        from_snapshot: Option<PathBuf>,
        /// Push each branch after committing
        #[arg(long)]
        push: bool,
    },

    /// Repoint local clones from GitLab to GitHub
    UpdateRemotes {
        /// Directory holding the clones
        target_dir: PathBuf,
    },

    /// Mirror GitLab projects into the GitHub organization
    MoveRepos {
        /// Directory for temporary bare clones
        #[arg(long, default_value = "repos")]
        work_dir: PathBuf,
        /// Projects allowed to overwrite an existing GitHub repository
        #[arg(long, num_args = 1..)]
        force: Vec<String>,
        /// Only move these projects
        #[arg(long, num_args = 1..)]
        only: Vec<String>,
    },

    /// Show version information
    Version,
}

fn run(command: Commands, settings: &Settings) -> commands::Result<Option<RunSummary>> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    let summary = match command {
        Commands::Discover { preseed, snapshot } => {
            runtime.block_on(commands::discover(settings, preseed, snapshot))?
        }
        Commands::MigrateImages {
            from_snapshot,
            preseed,
            snapshot,
        } => runtime.block_on(commands::migrate_images(
            settings,
            from_snapshot,
            preseed,
            snapshot,
        ))?,
        Commands::RewriteRepos {
            target_dir,
            from_snapshot,
            push,
        } => runtime.block_on(commands::rewrite_repos(
            settings,
            &target_dir,
            from_snapshot,
            push,
        ))?,
        Commands::UpdateRemotes { target_dir } => commands::update_remotes(settings, &target_dir)?,
        Commands::MoveRepos {
            work_dir,
            force,
            only,
        } => runtime.block_on(commands::move_repos(settings, &work_dir, force, &only))?,
        Commands::Version => {
            println!("portage {}", env!("CARGO_PKG_VERSION"));
            return Ok(None);
        }
    };
    Ok(Some(summary))
}

fn label(command: &Commands) -> &'static str {
    match command {
        Commands::Discover { .. } => "Discovery",
        Commands::MigrateImages { .. } => "Image Migration",
        Commands::RewriteRepos { .. } => "Repository Rewrite",
        Commands::UpdateRemotes { .. } => "Remote Update",
        Commands::MoveRepos { .. } => "Repository Move",
        Commands::Version => "Version",
    }
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = commands::load_env_file(cli.env_file.as_deref()) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
    // Parse again so `env` fallbacks see values from the env file.
    let cli = Cli::parse();

    if !matches!(cli.command, Commands::Version) {
        if let Err(e) = logging::init_logging(&cli.log_dir, logging::level_for(cli.verbose)) {
            eprintln!("Error: cannot open log file in {}: {e}", cli.log_dir.display());
            std::process::exit(1);
        }
    }

    let label = label(&cli.command);
    let settings = Settings::from(cli.settings);

    match run(cli.command, &settings) {
        Ok(Some(summary)) => {
            summary.log_summary(label);
            summary.print_summary(label);
            if cli.strict && !summary.is_successful() {
                std::process::exit(EXIT_PARTIAL_FAILURE);
            }
        }
        Ok(None) => {}
        Err(e) => {
            tracing::error!("{e}");
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}
