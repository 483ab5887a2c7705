//! Common types for migration operations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A GitLab project as listed by the admin API and enriched by discovery.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Project {
    /// Numeric project id.
    pub id: u64,

    /// Short project name (last path segment).
    pub name: String,

    /// Full path including the namespace, e.g. `group/project`.
    pub path_with_namespace: String,

    /// Whether the project is archived.
    #[serde(default)]
    pub archived: bool,

    /// Visibility level (`private`, `internal`, `public`).
    #[serde(default)]
    pub visibility: String,

    /// HTTP clone URL.
    #[serde(rename = "http_url_to_repo")]
    pub url: String,

    /// Name of the default branch, when the project has one.
    #[serde(default)]
    pub default_branch: Option<String>,

    /// Related API links.
    #[serde(rename = "_links", default)]
    pub links: ProjectLinks,

    /// Branches, replaced wholesale on every enrichment.
    #[serde(default)]
    pub branches: Vec<Branch>,

    /// Container images with their known tags.
    #[serde(default)]
    pub images: Vec<Image>,
}

/// Links attached to a project record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectLinks {
    /// URL of the project's branch listing.
    #[serde(default)]
    pub repo_branches: Option<String>,
}

/// A branch of a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
    /// Branch name.
    pub name: String,

    /// Whether this is the project's default branch.
    #[serde(default)]
    pub default: bool,
}

impl Branch {
    /// Create a branch record.
    pub fn new(name: impl Into<String>, default: bool) -> Self {
        Self {
            name: name.into(),
            default,
        }
    }
}

/// A container image and the set of tags known for it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    /// Image path below the source namespace, e.g. `project` or `project/worker`.
    pub name: String,

    /// Known tags. An empty string stands for an untagged reference.
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

impl Image {
    /// Create an image with no tags.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tags: BTreeSet::new(),
        }
    }

    /// Create an image with the given tags.
    pub fn with_tags<I, S>(name: impl Into<String>, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut image = Self::new(name);
        image.merge_tags(tags);
        image
    }

    /// Union tags into this image. Returns how many were new.
    pub fn merge_tags<I, S>(&mut self, tags: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut added = 0;
        for tag in tags {
            if self.tags.insert(tag.into()) {
                added += 1;
            }
        }
        added
    }

    /// The project segment of the image name (text before the first `/`).
    pub fn project_prefix(&self) -> &str {
        self.name.split('/').next().unwrap_or(&self.name)
    }
}

impl Project {
    /// Look up an attached image by name.
    pub fn image(&self, name: &str) -> Option<&Image> {
        self.images.iter().find(|image| image.name == name)
    }

    /// Attach an image, unioning tags when an image of that name exists.
    pub fn attach_image(&mut self, image: Image) {
        match self.images.iter_mut().find(|i| i.name == image.name) {
            Some(existing) => {
                existing.merge_tags(image.tags);
            }
            None => self.images.push(image),
        }
    }

    /// The branch flagged as default, falling back to the declared default name.
    pub fn default_branch(&self) -> Option<&Branch> {
        self.branches.iter().find(|b| b.default).or_else(|| {
            let name = self.default_branch.as_deref()?;
            self.branches.iter().find(|b| b.name == name)
        })
    }
}

/// Outcome of a sequential run over many items.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSummary {
    /// Items that completed.
    pub succeeded: Vec<String>,

    /// Items that failed, with the reason.
    pub failures: Vec<FailureInfo>,

    /// Recoverable problems that did not fail an item.
    pub warnings: Vec<String>,

    /// Start time of the run.
    pub started_at: Option<DateTime<Utc>>,

    /// End time of the run.
    pub completed_at: Option<DateTime<Utc>>,
}

/// Information about a failed item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureInfo {
    /// The item that failed (project, folder, `image:tag`).
    pub item: String,

    /// Step that failed (e.g. "pull", "branches", "clone").
    pub stage: String,

    /// Error message.
    pub message: String,
}

impl RunSummary {
    /// Create a new empty summary.
    pub fn new() -> Self {
        Self {
            started_at: Some(Utc::now()),
            ..Default::default()
        }
    }

    /// Mark the run as complete.
    pub fn complete(&mut self) {
        self.completed_at = Some(Utc::now());
    }

    /// Record a completed item.
    pub fn record_success(&mut self, item: impl Into<String>) {
        self.succeeded.push(item.into());
    }

    /// Record a failed item.
    pub fn record_failure(
        &mut self,
        item: impl Into<String>,
        stage: impl Into<String>,
        message: impl Into<String>,
    ) {
        self.failures.push(FailureInfo {
            item: item.into(),
            stage: stage.into(),
            message: message.into(),
        });
    }

    /// Add a warning.
    pub fn add_warning(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    /// Fold another summary's items into this one.
    pub fn absorb(&mut self, other: RunSummary) {
        self.succeeded.extend(other.succeeded);
        self.failures.extend(other.failures);
        self.warnings.extend(other.warnings);
    }

    /// True when nothing failed.
    pub fn is_successful(&self) -> bool {
        self.failures.is_empty()
    }

    /// Get the duration of the run.
    pub fn duration(&self) -> Option<chrono::Duration> {
        match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) => Some(end - start),
            _ => None,
        }
    }

    /// Emit the summary as log events.
    pub fn log_summary(&self, label: &str) {
        tracing::info!(
            label,
            succeeded = self.succeeded.len(),
            failed = self.failures.len(),
            warnings = self.warnings.len(),
            "Run finished"
        );
        tracing::info!("Succeeded: {:?}", self.succeeded);
        for failure in &self.failures {
            tracing::warn!(
                item = %failure.item,
                stage = %failure.stage,
                "Failed: {}",
                failure.message
            );
        }
    }

    /// Print a summary of the run.
    pub fn print_summary(&self, label: &str) {
        println!("\n=== {label} Summary ===\n");
        println!("Succeeded: {}", self.succeeded.len());
        for item in &self.succeeded {
            println!("  ✓ {item}");
        }

        if let Some(duration) = self.duration() {
            println!("\nCompleted in {} seconds", duration.num_seconds());
        }

        if !self.failures.is_empty() {
            println!("\nFailures ({}):", self.failures.len());
            for failure in &self.failures {
                println!("  ✗ {} [{}]: {}", failure.item, failure.stage, failure.message);
            }
        }

        if !self.warnings.is_empty() {
            println!("\nWarnings ({}):", self.warnings.len());
            for warning in &self.warnings {
                println!("  - {warning}");
            }
        }

        let status = if self.is_successful() {
            "SUCCESS"
        } else {
            "FAILED"
        };
        println!("\nOverall Status: {status}");
    }
}
