//! Image/tag reconciliation for one project.
//!
//! Three sources feed a project's image list, applied in order:
//!
//! 1. pre-seed images whose project prefix is the project name,
//! 2. for each attached image, pre-seed images whose prefix is that image's name,
//! 3. the registry's tag list for the project's own repository.
//!
//! Tags are unioned into sets, so re-running any step adds nothing.

use crate::preseed::Preseed;
use crate::registry::TagLookup;
use crate::types::Project;

use tracing::{debug, info, warn};

/// What the registry step did to the project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryMerge {
    /// Tags were unioned into the image named after the project.
    Merged {
        /// Tags not seen before.
        added: usize,
        /// Whether the image entry had to be created.
        created: bool,
    },
    /// The registry does not know the repository.
    NameUnknown,
    /// The tags field was null.
    NoTags,
    /// The registry reported errors; nothing was merged.
    Errors(Vec<String>),
}

/// Counts from a full reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Images attached from the pre-seed.
    pub preseeded: usize,
    /// Tags added by cross-referencing.
    pub cross_referenced: usize,
    /// Result of the registry merge, when a lookup was available.
    pub registry: Option<RegistryMerge>,
}

/// Attach pre-seed images belonging to the project. Returns the number attached.
pub fn apply_preseed(project: &mut Project, preseed: &Preseed) -> usize {
    let matching: Vec<_> = preseed.with_prefix(&project.name).cloned().collect();
    let count = matching.len();
    for image in matching {
        project.attach_image(image);
    }
    count
}

/// Union pre-seed tags into attached images whose name is a pre-seed prefix.
/// Returns the number of tags added.
pub fn cross_reference(project: &mut Project, preseed: &Preseed) -> usize {
    let mut added = 0;
    for image in &mut project.images {
        let tags: Vec<String> = preseed
            .with_prefix(&image.name)
            .flat_map(|seed| seed.tags.iter().cloned())
            .collect();
        added += image.merge_tags(tags);
    }
    added
}

/// Merge a registry lookup for the project's repository.
pub fn merge_registry_tags(project: &mut Project, lookup: TagLookup) -> RegistryMerge {
    match lookup {
        TagLookup::NameUnknown => {
            info!(project = %project.name, "No image found in registry");
            RegistryMerge::NameUnknown
        }
        TagLookup::NoTags => {
            warn!(project = %project.name, "Registry returned null tags");
            RegistryMerge::NoTags
        }
        TagLookup::Errors(errors) => {
            warn!(project = %project.name, ?errors, "Registry returned errors");
            RegistryMerge::Errors(errors)
        }
        TagLookup::Tags(tags) => {
            let name = project.name.clone();
            match project.images.iter_mut().find(|image| image.name == name) {
                Some(image) => RegistryMerge::Merged {
                    added: image.merge_tags(tags),
                    created: false,
                },
                None => {
                    let image = crate::types::Image::with_tags(name, tags);
                    let added = image.tags.len();
                    project.images.push(image);
                    RegistryMerge::Merged {
                        added,
                        created: true,
                    }
                }
            }
        }
    }
}

/// Run all three steps in order.
pub fn reconcile(
    project: &mut Project,
    preseed: &Preseed,
    lookup: Option<TagLookup>,
) -> ReconcileReport {
    let preseeded = apply_preseed(project, preseed);
    let cross_referenced = cross_reference(project, preseed);
    let registry = lookup.map(|lookup| merge_registry_tags(project, lookup));

    debug!(
        project = %project.name,
        preseeded,
        cross_referenced,
        images = project.images.len(),
        "Reconciled images"
    );

    ReconcileReport {
        preseeded,
        cross_referenced,
        registry,
    }
}
