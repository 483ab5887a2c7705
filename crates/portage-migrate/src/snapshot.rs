//! JSON snapshot of enriched projects.

use crate::error::Result;
use crate::types::Project;

use std::io::Write;
use std::path::Path;

/// Default snapshot filename.
pub const DEFAULT_SNAPSHOT: &str = "gitlab_projects.json";

/// Write projects as pretty JSON with two-space indentation.
pub fn write_projects(path: &Path, projects: &[Project]) -> Result<()> {
    let mut file = std::io::BufWriter::new(std::fs::File::create(path)?);
    serde_json::to_writer_pretty(&mut file, projects)?;
    file.write_all(b"\n")?;
    file.flush()?;
    tracing::info!(path = %path.display(), count = projects.len(), "Wrote project snapshot");
    Ok(())
}

/// Read projects back from a snapshot.
pub fn read_projects(path: &Path) -> Result<Vec<Project>> {
    let file = std::fs::File::open(path)?;
    let projects = serde_json::from_reader(std::io::BufReader::new(file))?;
    Ok(projects)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Branch, Image};

    #[test]
    fn test_snapshot_layout_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_SNAPSHOT);
        let projects = vec![Project {
            id: 1,
            name: "app".into(),
            path_with_namespace: "dev/app".into(),
            url: "https://gitlab.example.com/dev/app.git".into(),
            branches: vec![Branch::new("main", true)],
            images: vec![Image::with_tags("app", ["v2", "v1"])],
            ..Default::default()
        }];

        write_projects(&path, &projects).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();

        assert!(text.starts_with("[\n  {\n    \"id\": 1,"));
        assert!(text.ends_with("]\n"));
        assert!(text.contains("\"http_url_to_repo\""));
        assert_eq!(read_projects(&path).unwrap(), projects);
    }
}
