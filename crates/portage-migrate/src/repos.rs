//! Local repository work: rewriting references in fresh clones and
//! repointing existing clones at GitHub.

use crate::command::CommandRunner;
use crate::config::MigrationConfig;
use crate::error::Result;
use crate::git::{CommitOutcome, Git};
use crate::rewrite::{RewriteOutcome, RewriteRule};
use crate::types::{Project, RunSummary};

use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Clones projects and rewrites image and source references on every branch.
pub struct RepoRewriter<'a, R: CommandRunner> {
    git: Git<'a, R>,
    rules: Vec<RewriteRule>,
    target_dir: PathBuf,
    commit_message: String,
    push: bool,
}

impl<'a, R: CommandRunner> RepoRewriter<'a, R> {
    pub fn new(
        config: &MigrationConfig,
        runner: &'a R,
        rules: Vec<RewriteRule>,
        target_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            git: Git::new(runner),
            rules,
            target_dir: target_dir.into(),
            commit_message: config.commit_message.clone(),
            push: false,
        }
    }

    /// Push each branch after committing.
    pub fn with_push(mut self, push: bool) -> Self {
        self.push = push;
        self
    }

    /// Clone one project and rewrite every branch.
    pub fn rewrite_project(&self, project: &Project) -> Result<()> {
        let dest = self.target_dir.join(&project.name);
        self.git.clone_repo(&project.url, &dest)?;

        for branch in &project.branches {
            self.rewrite_branch(&dest, &branch.name)?;
        }

        match project.default_branch() {
            Some(default) => self.git.checkout(&dest, &default.name)?,
            None => warn!(project = %project.name, "No default branch to check out"),
        }
        Ok(())
    }

    fn rewrite_branch(&self, dest: &Path, branch: &str) -> Result<()> {
        info!(dir = %dest.display(), branch, "Rewriting branch");
        self.git.checkout(dest, branch)?;
        self.git.fetch_and_pull(dest)?;

        for rule in &self.rules {
            if let RewriteOutcome::Rewritten { capture } = rule.apply(dest)? {
                info!(branch, file = %rule.file_name, capture = %capture, "Applied rewrite");
            }
        }

        if self.git.commit_all(dest, &self.commit_message)? == CommitOutcome::Committed && self.push {
            self.git.push(dest)?;
        }
        Ok(())
    }

    /// Rewrite every project, recording per-project failures.
    pub fn rewrite_all(&self, projects: &[Project]) -> RunSummary {
        let mut summary = RunSummary::new();
        for project in projects {
            match self.rewrite_project(project) {
                Ok(()) => summary.record_success(&project.name),
                Err(e) => {
                    warn!(project = %project.name, "Rewrite failed: {e}");
                    summary.record_failure(&project.name, "rewrite", e.to_string());
                }
            }
        }
        summary.complete();
        summary
    }
}

/// Repoints local clones from the GitLab namespace to the GitHub organization.
pub struct RemoteUpdater<'a, R: CommandRunner> {
    git: Git<'a, R>,
    from: String,
    to: String,
}

impl<'a, R: CommandRunner> RemoteUpdater<'a, R> {
    /// Requires the GitLab URL to have a host and a GitHub organization.
    pub fn new(config: &MigrationConfig, runner: &'a R) -> Result<Self> {
        Ok(Self {
            git: Git::new(runner),
            from: format!("{}/{}", config.gitlab_host()?, config.source_namespace),
            to: format!("github.com/{}", config.github_org()?),
        })
    }

    /// Swap the GitLab namespace for the GitHub organization in `url`.
    pub fn rewrite_remote_url(&self, url: &str) -> String {
        url.replace(&self.from, &self.to)
    }

    /// Update one clone.
    pub fn update_folder(&self, folder: &Path) -> Result<()> {
        let pre: [&[&str]; 3] = [&["fetch"], &["status"], &["remote", "show", "origin"]];
        for args in pre {
            let output = self.git.raw(folder, args)?;
            info!(folder = %folder.display(), command = %args.join(" "), output = %output, "Ran");
        }

        let origin = self.git.remote_url(folder, "origin")?;
        let updated = self.rewrite_remote_url(&origin);
        self.git.set_remote_url(folder, "origin", &updated)?;
        info!(folder = %folder.display(), from = %origin, to = %updated, "Updated origin");

        if self.git.has_local_branch(folder, "master")? {
            self.git.raw(folder, &["branch", "-m", "master", "main"])?;
        }
        self.git.raw(folder, &["fetch", "origin"])?;
        self.git.raw(folder, &["branch", "-u", "origin/main", "main"])?;
        self.git.raw(folder, &["remote", "set-head", "origin", "-a"])?;
        Ok(())
    }

    /// Update every clone directly under `target_dir`.
    pub fn update_all(&self, target_dir: &Path) -> Result<RunSummary> {
        let folders = find_git_folders(target_dir)?;
        info!(count = folders.len(), "Found git folders");

        let mut summary = RunSummary::new();
        for folder in folders {
            let label = folder.display().to_string();
            match self.update_folder(&folder) {
                Ok(()) => summary.record_success(label),
                Err(e) => {
                    warn!(folder = %label, "Remote update failed: {e}");
                    summary.record_failure(label, "update-remote", e.to_string());
                }
            }
        }
        summary.complete();
        Ok(summary)
    }
}

/// Immediate subdirectories of `target_dir` that contain `.git`, sorted.
pub fn find_git_folders(target_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut folders = Vec::new();
    for entry in std::fs::read_dir(target_dir)? {
        let path = entry?.path();
        if path.is_dir() && path.join(".git").exists() {
            folders.push(path);
        }
    }
    folders.sort();
    Ok(folders)
}
