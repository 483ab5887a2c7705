//! CLI command implementations.

use portage_migrate::{
    default_rules, snapshot, Credentials, Discovery, GitLabClient, ImageMigrator, MigrationConfig,
    MigrationError, Project, RemoteUpdater, RepoMover, RepoRewriter, RunSummary, SystemRunner,
};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// CLI errors.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Migration(#[from] MigrationError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to load env file {path}: {message}")]
    EnvFile { path: String, message: String },

    #[error("Missing setting: {0}")]
    MissingSetting(&'static str),
}

pub type Result<T> = std::result::Result<T, CliError>;

/// Non-secret settings shared by every command.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub gitlab_url: Option<String>,
    pub registry_url: Option<String>,
    pub source_registry: Option<String>,
    pub source_namespace: Option<String>,
    pub github_org: Option<String>,
    pub insecure: bool,
}

impl Settings {
    /// Build the library configuration, with credentials from the environment.
    pub fn to_config(&self) -> Result<MigrationConfig> {
        self.to_config_with(Credentials::from_env())
    }

    pub fn to_config_with(&self, credentials: Credentials) -> Result<MigrationConfig> {
        let gitlab_url = self
            .gitlab_url
            .as_deref()
            .ok_or(CliError::MissingSetting("--gitlab-url / GITLAB_URL"))?;
        let namespace = self
            .source_namespace
            .as_deref()
            .ok_or(CliError::MissingSetting("--source-namespace / SOURCE_NAMESPACE"))?;

        let mut config = MigrationConfig::new(gitlab_url, "", namespace)
            .with_insecure_tls(self.insecure)
            .with_credentials(credentials);
        // The registry usually lives on the GitLab host.
        config.source_registry = match &self.source_registry {
            Some(registry) => registry.trim_end_matches('/').to_string(),
            None => config.gitlab_host()?,
        };
        if let Some(url) = &self.registry_url {
            config = config.with_registry_url(url);
        }
        if let Some(org) = &self.github_org {
            config = config.with_github_org(org);
        }
        Ok(config)
    }
}

/// Load `KEY=VALUE` pairs from an env file.
///
/// A missing default file is skipped; a missing explicit file is an error.
pub fn load_env_file(path: Option<&Path>) -> Result<()> {
    match path {
        Some(path) => dotenvy::from_path(path)
            .map(|_| ())
            .map_err(|e| CliError::EnvFile {
                path: path.display().to_string(),
                message: e.to_string(),
            }),
        None => {
            dotenvy::dotenv().ok();
            Ok(())
        }
    }
}

/// List and enrich projects, writing the snapshot.
pub async fn discover(
    settings: &Settings,
    preseed: Option<PathBuf>,
    snapshot_path: PathBuf,
) -> Result<RunSummary> {
    let config = settings.to_config()?;
    tracing::info!(gitlab = %config.gitlab_url, "Discovering projects");

    let (projects, summary) = Discovery::new(&config)?
        .with_preseed(preseed)
        .with_snapshot(Some(snapshot_path.clone()))
        .run()
        .await?;

    println!(
        "Discovered {} projects ({} images), snapshot written to {}",
        projects.len(),
        projects.iter().map(|p| p.images.len()).sum::<usize>(),
        snapshot_path.display()
    );
    Ok(summary)
}

/// Migrate container images to Docker Hub.
pub async fn migrate_images(
    settings: &Settings,
    from_snapshot: Option<PathBuf>,
    preseed: Option<PathBuf>,
    snapshot_path: PathBuf,
) -> Result<RunSummary> {
    let config = settings.to_config()?;
    let mut summary = RunSummary::new();

    let projects = match from_snapshot {
        Some(path) => {
            tracing::info!(path = %path.display(), "Loading projects from snapshot");
            snapshot::read_projects(&path)?
        }
        None => {
            let (projects, discovery) = Discovery::new(&config)?
                .with_preseed(preseed)
                .with_snapshot(Some(snapshot_path))
                .run()
                .await?;
            summary.warnings.extend(discovery.warnings);
            projects
        }
    };

    let runner = SystemRunner;
    let migrated = ImageMigrator::new(&config, &runner)?.migrate(&projects).await?;
    summary.absorb(migrated);
    summary.complete();
    Ok(summary)
}

/// List projects with their branches, without image discovery.
async fn projects_with_branches(config: &MigrationConfig, summary: &mut RunSummary) -> Result<Vec<Project>> {
    let gitlab = GitLabClient::new(config)?;
    let mut projects = gitlab.list_projects().await?;
    for project in &mut projects {
        if let Err(e) = gitlab.enrich_branches(project).await {
            tracing::warn!(project = %project.name, "Failed to fetch branches: {e}");
            summary.add_warning(format!("{}: branches: {e}", project.name));
        }
    }
    Ok(projects)
}

/// Clone every project and rewrite image and source references on each branch.
pub async fn rewrite_repos(
    settings: &Settings,
    target_dir: &Path,
    from_snapshot: Option<PathBuf>,
    push: bool,
) -> Result<RunSummary> {
    let config = settings.to_config()?;
    let rules = default_rules(&config)?;
    let mut summary = RunSummary::new();

    let projects = match from_snapshot {
        Some(path) => snapshot::read_projects(&path)?,
        None => projects_with_branches(&config, &mut summary).await?,
    };

    std::fs::create_dir_all(target_dir)?;
    let runner = SystemRunner;
    let rewritten = RepoRewriter::new(&config, &runner, rules, target_dir)
        .with_push(push)
        .rewrite_all(&projects);
    summary.absorb(rewritten);
    summary.complete();
    Ok(summary)
}

/// Repoint every clone under `target_dir` at GitHub.
pub fn update_remotes(settings: &Settings, target_dir: &Path) -> Result<RunSummary> {
    let config = settings.to_config()?;
    let runner = SystemRunner;
    Ok(RemoteUpdater::new(&config, &runner)?.update_all(target_dir)?)
}

/// Mirror GitLab projects into the GitHub organization.
pub async fn move_repos(
    settings: &Settings,
    work_dir: &Path,
    force: Vec<String>,
    only: &[String],
) -> Result<RunSummary> {
    let config = settings.to_config()?;
    let gitlab = GitLabClient::new(&config)?;
    let projects: Vec<Project> = gitlab
        .list_projects()
        .await?
        .into_iter()
        .filter(|project| only.is_empty() || only.contains(&project.name))
        .collect();
    tracing::info!(count = projects.len(), "Projects selected for moving");

    let runner = SystemRunner;
    let mover = RepoMover::new(&config, &runner, work_dir)?.with_force_overwrite(force);
    Ok(mover.move_all(&projects).await?)
}
