//! Discovery: list GitLab projects and enrich them with branches and images.

use crate::config::MigrationConfig;
use crate::error::Result;
use crate::gitlab::GitLabClient;
use crate::preseed::Preseed;
use crate::reconcile::{reconcile, RegistryMerge};
use crate::registry::RegistryClient;
use crate::snapshot;
use crate::types::{Project, RunSummary};

use std::path::PathBuf;
use tracing::{info, info_span, warn, Instrument};

/// Runs the discovery pipeline.
pub struct Discovery {
    gitlab: GitLabClient,
    registry: RegistryClient,
    registry_hostname: String,
    namespace: String,
    preseed_path: Option<PathBuf>,
    snapshot_path: Option<PathBuf>,
}

impl Discovery {
    pub fn new(config: &MigrationConfig) -> Result<Self> {
        Ok(Self {
            gitlab: GitLabClient::new(config)?,
            registry: RegistryClient::new(config)?,
            registry_hostname: config.source_registry_hostname().to_string(),
            namespace: config.source_namespace.clone(),
            preseed_path: None,
            snapshot_path: None,
        })
    }

    /// Read previously observed image references from `path`. The file must exist.
    pub fn with_preseed(mut self, path: Option<PathBuf>) -> Self {
        self.preseed_path = path;
        self
    }

    /// Write the enriched projects to `path` when the run finishes.
    pub fn with_snapshot(mut self, path: Option<PathBuf>) -> Self {
        self.snapshot_path = path;
        self
    }

    fn load_preseed(&self) -> Result<Preseed> {
        match &self.preseed_path {
            Some(path) => {
                let preseed = Preseed::load(path, &self.registry_hostname, &self.namespace)?;
                info!(path = %path.display(), images = preseed.images().len(), "Loaded pre-seed");
                Ok(preseed)
            }
            None => Ok(Preseed::empty()),
        }
    }

    /// Enrich one project. Failures here are recorded as warnings.
    pub async fn enrich(&self, project: &mut Project, preseed: &Preseed, summary: &mut RunSummary) {
        if let Err(e) = self.gitlab.enrich_branches(project).await {
            warn!(project = %project.name, "Failed to fetch branches: {e}");
            summary.add_warning(format!("{}: branches: {e}", project.name));
        }

        let token = match self.gitlab.registry_token(project).await {
            Ok(token) => token,
            Err(e) => {
                warn!(project = %project.name, "Failed to fetch registry token, skipping images: {e}");
                summary.add_warning(format!("{}: registry token: {e}", project.name));
                return;
            }
        };

        let lookup = match self
            .registry
            .list_tags(&project.path_with_namespace, &token)
            .await
        {
            Ok(lookup) => Some(lookup),
            Err(e) => {
                warn!(project = %project.name, "Failed to query registry: {e}");
                summary.add_warning(format!("{}: registry: {e}", project.name));
                None
            }
        };

        let report = reconcile(project, preseed, lookup);
        if let Some(RegistryMerge::Errors(errors)) = &report.registry {
            summary.add_warning(format!("{}: registry errors: {}", project.name, errors.join("; ")));
        }
    }

    /// List, enrich and snapshot every project.
    ///
    /// Listing and snapshot I/O are fatal; everything per project is not.
    pub async fn run(&self) -> Result<(Vec<Project>, RunSummary)> {
        let mut summary = RunSummary::new();
        let preseed = self.load_preseed()?;
        let mut projects = self.gitlab.list_projects().await?;

        for project in &mut projects {
            let span = info_span!("project", name = %project.name);
            self.enrich(project, &preseed, &mut summary)
                .instrument(span)
                .await;
            info!(
                project = %project.name,
                branches = project.branches.len(),
                images = project.images.len(),
                "Discovered project"
            );
            summary.record_success(&project.name);
        }

        if let Some(path) = &self.snapshot_path {
            snapshot::write_projects(path, &projects)?;
        }

        summary.complete();
        Ok((projects, summary))
    }
}

