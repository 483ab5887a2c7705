//! Pre-seed file of previously observed image references.
//!
//! The file is typically produced by grepping compose files on the hosts
//! that run the images, so lines look like
//! `  image: 'registry.example.com:8000/dev/app/worker:1.2'`. Only lines
//! naming the source registry are used.

use crate::error::Result;
use crate::types::Image;

use std::io::BufRead;
use std::path::Path;
use tracing::debug;

/// A parsed `registry[:port]/repository[:tag]` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    /// Registry host and optional port.
    pub registry: Option<String>,
    /// Repository path.
    pub repository: String,
    /// Tag, when present.
    pub tag: Option<String>,
}

impl ImageReference {
    /// Parse an image reference. Digests (`@sha256:...`) are dropped.
    pub fn parse(reference: &str) -> Option<Self> {
        let reference = reference.trim();
        let reference = reference.split('@').next().unwrap_or(reference);
        if reference.is_empty() {
            return None;
        }

        let (registry, rest) = match reference.split_once('/') {
            Some((first, rest))
                if first.contains('.') || first.contains(':') || first == "localhost" =>
            {
                (Some(first.to_string()), rest)
            }
            _ => (None, reference),
        };

        let last_slash = rest.rfind('/').map_or(0, |i| i + 1);
        let (repository, tag) = match rest[last_slash..].rfind(':') {
            Some(colon) => {
                let split = last_slash + colon;
                (&rest[..split], Some(&rest[split + 1..]))
            }
            None => (rest, None),
        };

        if repository.is_empty() {
            return None;
        }

        Some(Self {
            registry,
            repository: repository.to_string(),
            tag: tag.filter(|t| !t.is_empty()).map(str::to_string),
        })
    }

    /// Host part of the registry, without port.
    pub fn registry_host(&self) -> Option<&str> {
        self.registry.as_deref().and_then(|r| r.split(':').next())
    }
}

/// Pull the reference token out of a pre-seed line.
fn extract_reference<'a>(line: &'a str, hostname: &str) -> Option<&'a str> {
    line.split(|c: char| c.is_whitespace() || c == '\'' || c == '"')
        .find(|token| token.contains(hostname))
}

/// Images grouped by name, parsed from the pre-seed file.
#[derive(Debug, Clone, Default)]
pub struct Preseed {
    images: Vec<Image>,
}

impl Preseed {
    /// No pre-seed data.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load and parse a pre-seed file.
    pub fn load(path: &Path, hostname: &str, namespace: &str) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        Self::parse(std::io::BufReader::new(file), hostname, namespace)
    }

    /// Parse pre-seed lines.
    ///
    /// `hostname` filters lines; `namespace` is stripped from repository
    /// paths so the remaining name is `project[/image]`. Lines are read as
    /// bytes; invalid UTF-8 is replaced rather than rejected.
    pub fn parse<R: BufRead>(reader: R, hostname: &str, namespace: &str) -> Result<Self> {
        let mut preseed = Self::default();
        let prefix = format!("{}/", namespace.trim_matches('/'));

        for raw in reader.split(b'\n') {
            let raw = raw?;
            let decoded = String::from_utf8_lossy(&raw);
            let line = decoded.trim_end_matches('\r');
            let Some(token) = extract_reference(line, hostname) else {
                if !line.trim().is_empty() {
                    debug!(line = %line, "Skipping line without source registry");
                }
                continue;
            };

            let Some(reference) = ImageReference::parse(token) else {
                debug!(line = %line, "Skipping unparseable reference");
                continue;
            };

            if reference.registry_host() != Some(hostname) {
                debug!(line = %line, "Skipping reference on another registry");
                continue;
            }

            let Some(name) = reference.repository.strip_prefix(&prefix) else {
                debug!(line = %line, namespace, "Skipping reference outside namespace");
                continue;
            };

            preseed.insert(name, reference.tag.unwrap_or_default());
        }

        Ok(preseed)
    }

    /// Add one `name:tag` observation.
    pub fn insert(&mut self, name: &str, tag: impl Into<String>) {
        match self.images.iter_mut().find(|i| i.name == name) {
            Some(image) => {
                image.merge_tags([tag.into()]);
            }
            None => self.images.push(Image::with_tags(name, [tag.into()])),
        }
    }

    /// All grouped images.
    pub fn images(&self) -> &[Image] {
        &self.images
    }

    /// Images whose project prefix equals `prefix`.
    pub fn with_prefix<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = &'a Image> + 'a {
        self.images
            .iter()
            .filter(move |image| image.project_prefix() == prefix)
    }

    /// True when no image was parsed.
    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}
