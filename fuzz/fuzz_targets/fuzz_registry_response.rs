#![no_main]

use libfuzzer_sys::fuzz_target;
use portage_migrate::reconcile::merge_registry_tags;
use portage_migrate::registry::TagListResponse;
use portage_migrate::Project;

fuzz_target!(|data: &[u8]| {
    // Registry bodies of any shape must classify without panicking
    let Ok(response) = serde_json::from_slice::<TagListResponse>(data) else {
        return;
    };

    let mut project = Project {
        name: "app".to_string(),
        path_with_namespace: "dev/app".to_string(),
        ..Default::default()
    };
    let lookup = response.into_lookup();
    merge_registry_tags(&mut project, lookup.clone());
    let once = project.clone();

    // Merging the same listing again adds nothing
    merge_registry_tags(&mut project, lookup);
    assert_eq!(project, once);
});
