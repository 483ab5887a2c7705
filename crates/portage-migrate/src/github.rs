//! GitHub organization client and the repository mover.

use crate::command::CommandRunner;
use crate::config::MigrationConfig;
use crate::error::{MigrationError, Result};
use crate::git::Git;
use crate::types::{Project, RunSummary};

use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

const API_VERSION: &str = "2022-11-28";
const PER_PAGE: u32 = 100;

/// Branch GitHub repositories end up with.
pub const MAIN_BRANCH: &str = "main";
/// Branch renamed to [`MAIN_BRANCH`] when it is the default.
pub const LEGACY_BRANCH: &str = "master";

/// A repository as listed by the GitHub API.
#[derive(Debug, Clone, Deserialize)]
pub struct GitHubRepo {
    pub name: String,
    #[serde(default)]
    pub private: bool,
    #[serde(default)]
    pub default_branch: Option<String>,
}

#[derive(Debug, Serialize)]
struct CreateRepoRequest<'a> {
    name: &'a str,
    private: bool,
    has_issues: bool,
    has_projects: bool,
    has_wiki: bool,
}

#[derive(Debug, Serialize)]
struct RenameBranchRequest<'a> {
    new_name: &'a str,
}

/// Client for one GitHub organization.
pub struct GitHubClient {
    client: Client,
    api_url: String,
    org: String,
    token: String,
    poll_interval: Duration,
    poll_attempts: u32,
}

impl GitHubClient {
    /// Requires `GITHUB_TOKEN` and a GitHub organization.
    pub fn new(config: &MigrationConfig) -> Result<Self> {
        Ok(Self {
            client: config.http_client(false)?,
            api_url: config.github_api_url.clone(),
            org: config.github_org()?.to_string(),
            token: config.credentials.github_token()?.to_string(),
            poll_interval: config.branch_poll_interval,
            poll_attempts: config.branch_poll_attempts,
        })
    }

    pub fn org(&self) -> &str {
        &self.org
    }

    fn repo_url(&self, name: &str) -> String {
        format!("{}/repos/{}/{name}", self.api_url, self.org)
    }

    async fn github_send(&self, request: RequestBuilder, what: &str) -> Result<reqwest::Response> {
        let response = request
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION)
            .send()
            .await
            .map_err(|e| MigrationError::NetworkError(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        match status {
            StatusCode::NOT_FOUND => Err(MigrationError::NotFound(what.to_string())),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(
                MigrationError::AuthenticationFailed(format!("GitHub rejected {what}: {body}")),
            ),
            _ => Err(MigrationError::ApiError(format!(
                "GitHub API error for {what} ({status}): {body}"
            ))),
        }
    }

    /// Every repository in the organization, paged until an empty page.
    pub async fn list_repos(&self) -> Result<Vec<GitHubRepo>> {
        let url = format!("{}/orgs/{}/repos", self.api_url, self.org);
        let mut repos = Vec::new();
        let mut page = 1u32;

        loop {
            let request = self
                .client
                .get(&url)
                .query(&[("page", page), ("per_page", PER_PAGE)]);
            let batch: Vec<GitHubRepo> = self
                .github_send(request, "organization repositories")
                .await?
                .json()
                .await
                .map_err(|e| MigrationError::ApiError(e.to_string()))?;

            if batch.is_empty() {
                break;
            }
            debug!(page, count = batch.len(), "Fetched GitHub repositories");
            repos.extend(batch);
            page += 1;
        }

        repos.sort_by(|a, b| a.name.cmp(&b.name));
        info!(org = %self.org, count = repos.len(), "Listed GitHub repositories");
        Ok(repos)
    }

    /// Create a private repository. Anything but `201` fails.
    pub async fn create_repo(&self, name: &str) -> Result<()> {
        let url = format!("{}/orgs/{}/repos", self.api_url, self.org);
        let body = CreateRepoRequest {
            name,
            private: true,
            has_issues: false,
            has_projects: false,
            has_wiki: false,
        };
        let response = self
            .github_send(self.client.post(&url).json(&body), name)
            .await?;

        if response.status() != StatusCode::CREATED {
            return Err(MigrationError::ApiError(format!(
                "Creating {name} returned {}",
                response.status()
            )));
        }
        info!(repo = name, "Created GitHub repository");
        Ok(())
    }

    pub async fn set_private(&self, name: &str) -> Result<()> {
        let body = serde_json::json!({ "name": name, "private": true });
        self.github_send(self.client.patch(self.repo_url(name)).json(&body), name)
            .await?;
        info!(repo = name, "Set repository private");
        Ok(())
    }

    /// Current default branch, read live.
    pub async fn default_branch(&self, name: &str) -> Result<String> {
        let repo: GitHubRepo = self
            .github_send(self.client.get(self.repo_url(name)), name)
            .await?
            .json()
            .await
            .map_err(|e| MigrationError::ApiError(e.to_string()))?;
        repo.default_branch
            .ok_or_else(|| MigrationError::ApiError(format!("{name} has no default branch")))
    }

    /// Set the default branch and wait until GitHub reports it.
    pub async fn set_default_branch(&self, name: &str, branch: &str) -> Result<()> {
        let body = serde_json::json!({ "default_branch": branch });
        self.github_send(self.client.patch(self.repo_url(name)).json(&body), name)
            .await?;
        self.wait_for_default_branch(name, branch).await?;
        info!(repo = name, branch, "Default branch set");
        Ok(())
    }

    /// Rename a branch once it is visible as the default.
    pub async fn rename_branch(&self, name: &str, from: &str, to: &str) -> Result<()> {
        self.wait_for_default_branch(name, from).await?;
        let url = format!("{}/branches/{from}/rename", self.repo_url(name));
        self.github_send(
            self.client.post(&url).json(&RenameBranchRequest { new_name: to }),
            name,
        )
        .await?;
        info!(repo = name, from, to, "Renamed branch");
        Ok(())
    }

    /// Poll the default branch at a fixed interval, up to the configured attempts.
    pub async fn wait_for_default_branch(&self, name: &str, expected: &str) -> Result<()> {
        for attempt in 1..=self.poll_attempts {
            let current = self.default_branch(name).await?;
            if current == expected {
                return Ok(());
            }
            debug!(repo = name, attempt, current = %current, expected, "Waiting for default branch");
            tokio::time::sleep(self.poll_interval).await;
        }
        Err(MigrationError::Timeout(format!(
            "default branch of {name} never became {expected}"
        )))
    }
}

/// Moves GitLab projects into the GitHub organization by mirroring bare clones.
pub struct RepoMover<'a, R: CommandRunner> {
    github: GitHubClient,
    git: Git<'a, R>,
    work_dir: PathBuf,
    force_overwrite: HashSet<String>,
}

impl<'a, R: CommandRunner> RepoMover<'a, R> {
    pub fn new(config: &MigrationConfig, runner: &'a R, work_dir: impl Into<PathBuf>) -> Result<Self> {
        Ok(Self {
            github: GitHubClient::new(config)?,
            git: Git::new(runner),
            work_dir: work_dir.into(),
            force_overwrite: HashSet::new(),
        })
    }

    /// Projects allowed to overwrite an existing GitHub repository.
    pub fn with_force_overwrite<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.force_overwrite = names.into_iter().map(Into::into).collect();
        self
    }

    fn mirror_target(&self, name: &str) -> String {
        format!("https://github.com/{}/{name}", self.github.org())
    }

    /// Move one project. `existing` holds the repository names already on GitHub.
    pub async fn move_project(&self, project: &Project, existing: &BTreeSet<String>) -> Result<()> {
        let name = project.name.as_str();
        let on_github = existing.contains(name);

        if on_github && !self.force_overwrite.contains(name) {
            return Err(MigrationError::AlreadyExists(format!(
                "not overwriting existing GitHub repository {name}"
            )));
        }
        if on_github {
            info!(repo = name, "Forcing overwrite of GitHub repository");
        } else {
            self.github.create_repo(name).await?;
        }

        std::fs::create_dir_all(&self.work_dir)?;
        let bare = self.work_dir.join(format!("{name}.git"));
        remove_dir(&bare)?;

        self.git.clone_bare(&project.url, &self.work_dir)?;
        self.git.push_mirror(&bare, &self.mirror_target(name))?;
        info!(repo = name, "Pushed mirror to GitHub");

        self.github.set_private(name).await?;
        self.configure_default_branch(project, on_github).await?;
        remove_dir(&bare)?;
        Ok(())
    }

    /// Point the default branch at `main`, renaming `master` on the way.
    async fn configure_default_branch(&self, project: &Project, on_github: bool) -> Result<()> {
        let name = project.name.as_str();
        let primary = if on_github {
            self.github.default_branch(name).await?
        } else {
            project
                .default_branch
                .clone()
                .unwrap_or_else(|| MAIN_BRANCH.to_string())
        };
        info!(repo = name, primary = %primary, on_github, "Configuring default branch");

        self.github.set_default_branch(name, &primary).await?;
        if primary == LEGACY_BRANCH {
            self.github
                .rename_branch(name, LEGACY_BRANCH, MAIN_BRANCH)
                .await?;
        }
        self.github.set_default_branch(name, MAIN_BRANCH).await
    }

    /// Move every project. Listing the organization is fatal; per-project failures are recorded.
    pub async fn move_all(&self, projects: &[Project]) -> Result<RunSummary> {
        let mut summary = RunSummary::new();
        let existing: BTreeSet<String> = self
            .github
            .list_repos()
            .await?
            .into_iter()
            .map(|repo| repo.name)
            .collect();

        for project in projects {
            info!(project = %project.name, "Moving project");
            match self.move_project(project, &existing).await {
                Ok(()) => summary.record_success(&project.name),
                Err(e) => {
                    warn!(project = %project.name, "Move failed: {e}");
                    summary.record_failure(&project.name, "move", e.to_string());
                }
            }
        }

        summary.complete();
        Ok(summary)
    }
}

fn remove_dir(path: &Path) -> Result<()> {
    if path.exists() {
        info!(path = %path.display(), "Removing existing folder");
        std::fs::remove_dir_all(path)?;
    }
    Ok(())
}
