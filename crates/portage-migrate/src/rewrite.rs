//! Pattern-based file rewriting.

use crate::config::MigrationConfig;
use crate::error::{MigrationError, Result};

use regex::bytes::{NoExpand, Regex};
use std::path::Path;
use tracing::{debug, info};

/// Placeholder in a replacement template for the first capture group.
pub const PLACEHOLDER: &str = "{}";

/// What happened to a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RewriteOutcome {
    /// The file does not exist.
    Missing,
    /// The pattern did not match; the file is untouched.
    NoMatch,
    /// The file was rewritten using this capture.
    Rewritten { capture: String },
}

/// A rewrite applied to a named file inside a repository.
#[derive(Debug, Clone)]
pub struct RewriteRule {
    /// File path relative to the repository root.
    pub file_name: String,
    /// Pattern with at least one capture group.
    pub pattern: Regex,
    /// Replacement containing one `{}`.
    pub template: String,
}

impl RewriteRule {
    /// Build a rule. The pattern must have a capture group.
    pub fn new(file_name: impl Into<String>, pattern: &str, template: impl Into<String>) -> Result<Self> {
        let pattern = Regex::new(pattern)?;
        if pattern.captures_len() < 2 {
            return Err(MigrationError::InvalidConfig(format!(
                "rewrite pattern `{pattern}` has no capture group"
            )));
        }
        Ok(Self {
            file_name: file_name.into(),
            pattern,
            template: template.into(),
        })
    }

    /// Apply this rule inside `repo_dir`.
    pub fn apply(&self, repo_dir: &Path) -> Result<RewriteOutcome> {
        rewrite_file(&repo_dir.join(&self.file_name), &self.pattern, &self.template)
    }
}

/// Default rules moving image and source references off the GitLab host.
pub fn default_rules(config: &MigrationConfig) -> Result<Vec<RewriteRule>> {
    let image_prefix = regex::escape(&config.source_image_prefix());
    let source_prefix = regex::escape(&format!(
        "{}/{}",
        config.gitlab_host()?,
        config.source_namespace
    ));
    let dockerhub_org = config.credentials.dockerhub_org()?;
    let github_org = config.github_org()?;

    Ok(vec![
        RewriteRule::new(
            "docker-compose.yml",
            &format!("image: {image_prefix}/(.*?)"),
            format!("image: {dockerhub_org}/{PLACEHOLDER}"),
        )?,
        RewriteRule::new(
            "README.md",
            &format!("{image_prefix}/(.*?)"),
            format!("{dockerhub_org}/{PLACEHOLDER}"),
        )?,
        RewriteRule::new(
            "README.md",
            &format!("{source_prefix}/(.*?)"),
            format!("github.com/{github_org}/{PLACEHOLDER}"),
        )?,
    ])
}

/// Rewrite `path` by substituting the first match's first capture group
/// into `template`.
///
/// The rendered text replaces every occurrence of `pattern` literally; only
/// the first match's capture is used. Contents are matched as bytes, so files
/// that are not valid UTF-8 are rewritten too. The file's permission bits are
/// kept.
pub fn rewrite_file(path: &Path, pattern: &Regex, template: &str) -> Result<RewriteOutcome> {
    debug!(path = %path.display(), pattern = %pattern, template, "Rewriting file");

    let metadata = match std::fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "Skipping missing file");
            return Ok(RewriteOutcome::Missing);
        }
        Err(e) => return Err(e.into()),
    };

    let contents = std::fs::read(path)?;
    let Some(capture) = pattern
        .captures(&contents)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_bytes().to_vec())
    else {
        info!(path = %path.display(), pattern = %pattern, "Pattern not found");
        return Ok(RewriteOutcome::NoMatch);
    };

    let rendered = render(template, &capture);
    let rewritten = pattern.replace_all(&contents, NoExpand(rendered.as_slice()));

    std::fs::write(path, &*rewritten)?;
    std::fs::set_permissions(path, metadata.permissions())?;

    let capture = String::from_utf8_lossy(&capture).into_owned();
    info!(path = %path.display(), capture = %capture, "Rewrote file");
    Ok(RewriteOutcome::Rewritten { capture })
}

/// Fill the first `{}` in `template` with `capture`.
fn render(template: &str, capture: &[u8]) -> Vec<u8> {
    match template.split_once(PLACEHOLDER) {
        Some((before, after)) => [before.as_bytes(), capture, after.as_bytes()].concat(),
        None => template.as_bytes().to_vec(),
    }
}
