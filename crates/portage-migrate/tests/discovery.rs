//! End-to-end tests for the discovery pipeline against mocked GitLab and registry APIs.

use portage_migrate::{snapshot, Credentials, Discovery, MigrationConfig, MigrationError};
use serde_json::json;
use std::collections::BTreeSet;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config(server: &MockServer) -> MigrationConfig {
    MigrationConfig::new(server.uri(), "registry.example.com:8000", "dev")
        .with_registry_url(server.uri())
        .with_credentials(Credentials {
            gitlab_token: Some("glpat".into()),
            gitlab_user: Some("me".into()),
            gitlab_pass: Some("pw".into()),
            ..Default::default()
        })
}

fn project_json(id: u64, name: &str) -> serde_json::Value {
    json!({
        "id": id,
        "name": name,
        "path_with_namespace": format!("dev/{name}"),
        "archived": false,
        "visibility": "private",
        "http_url_to_repo": format!("https://gitlab.example.com/dev/{name}.git"),
        "default_branch": "main"
    })
}

async fn mount_listing(server: &MockServer, projects: Vec<serde_json::Value>) {
    Mock::given(method("GET"))
        .and(path("/api/v4/projects"))
        .and(query_param("page", "1"))
        .and(header("PRIVATE-TOKEN", "glpat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(projects))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v4/projects"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(server)
        .await;
}

async fn mount_token(server: &MockServer, project_path: &str, status: u16) {
    Mock::given(method("GET"))
        .and(path("/jwt/auth"))
        .and(query_param("scope", format!("repository:{project_path}:push,pull")))
        .respond_with(ResponseTemplate::new(status).set_body_json(json!({ "token": "registry-jwt" })))
        .mount(server)
        .await;
}

async fn mount_tags(server: &MockServer, project_path: &str, status: u16, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path(format!("/v2/{project_path}/tags/list")))
        .and(header("Authorization", "Bearer registry-jwt"))
        .respond_with(ResponseTemplate::new(status).set_body_json(body))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_registry_tags_become_project_image() {
    let server = MockServer::start().await;
    mount_listing(&server, vec![project_json(1, "app")]).await;
    Mock::given(method("GET"))
        .and(path("/api/v4/projects/1/repository/branches"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "name": "main", "default": true },
            { "name": "dev", "default": false }
        ])))
        .mount(&server)
        .await;
    mount_token(&server, "dev/app", 200).await;
    mount_tags(&server, "dev/app", 200, json!({ "name": "dev/app", "tags": ["v1", "v2"] })).await;

    let (projects, summary) = Discovery::new(&config(&server))
        .unwrap()
        .run()
        .await
        .unwrap();

    assert!(summary.warnings.is_empty(), "{:?}", summary.warnings);
    assert_eq!(projects.len(), 1);
    let app = &projects[0];
    assert_eq!(app.branches.len(), 2);
    assert_eq!(app.default_branch().unwrap().name, "main");
    assert_eq!(app.images.len(), 1);
    assert_eq!(app.images[0].name, "app");
    assert_eq!(
        app.images[0].tags,
        BTreeSet::from(["v1".to_string(), "v2".to_string()])
    );
}

#[tokio::test]
async fn test_unknown_repository_and_token_failure_are_recoverable() {
    let server = MockServer::start().await;
    mount_listing(
        &server,
        vec![project_json(1, "lib"), project_json(2, "broken")],
    )
    .await;
    mount_token(&server, "dev/lib", 200).await;
    mount_token(&server, "dev/broken", 401).await;
    mount_tags(
        &server,
        "dev/lib",
        404,
        json!({ "errors": [{ "code": "NAME_UNKNOWN", "message": "repository name not known to registry" }] }),
    )
    .await;

    let dir = tempfile::tempdir().unwrap();
    let preseed = dir.path().join("preseed.txt");
    std::fs::write(
        &preseed,
        "    image: \"registry.example.com:8000/dev/lib/worker:1.0\"\n\
         image: registry.example.com:8000/dev/broken:2.0\n\
         image: postgres:15\n",
    )
    .unwrap();
    let snapshot_path = dir.path().join(snapshot::DEFAULT_SNAPSHOT);

    let (projects, summary) = Discovery::new(&config(&server))
        .unwrap()
        .with_preseed(Some(preseed))
        .with_snapshot(Some(snapshot_path.clone()))
        .run()
        .await
        .unwrap();

    assert_eq!(summary.succeeded, ["lib", "broken"]);

    let lib = &projects[0];
    assert_eq!(lib.images.len(), 1);
    assert_eq!(lib.images[0].name, "lib/worker");
    assert!(lib.image("lib").is_none());

    // No token means no image enrichment at all, pre-seed included.
    let broken = &projects[1];
    assert!(broken.images.is_empty());
    assert!(summary
        .warnings
        .iter()
        .any(|w| w.starts_with("broken: registry token")));

    assert_eq!(snapshot::read_projects(&snapshot_path).unwrap(), projects);
}

#[tokio::test]
async fn test_branch_failure_still_discovers_images() {
    let server = MockServer::start().await;
    mount_listing(&server, vec![project_json(1, "app")]).await;
    Mock::given(method("GET"))
        .and(path("/api/v4/projects/1/repository/branches"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    mount_token(&server, "dev/app", 200).await;
    mount_tags(&server, "dev/app", 200, json!({ "name": "dev/app", "tags": ["v1"] })).await;

    let (projects, summary) = Discovery::new(&config(&server))
        .unwrap()
        .run()
        .await
        .unwrap();

    assert_eq!(summary.succeeded, ["app"]);
    assert_eq!(summary.warnings.len(), 1, "{:?}", summary.warnings);
    assert!(summary.warnings[0].starts_with("app: branches"));

    let app = &projects[0];
    assert!(app.branches.is_empty());
    assert_eq!(app.default_branch.as_deref(), Some("main"));
    assert_eq!(app.images.len(), 1);
    assert_eq!(app.images[0].tags, BTreeSet::from(["v1".to_string()]));
}

#[tokio::test]
async fn test_listing_failure_is_fatal() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v4/projects"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let result = Discovery::new(&config(&server)).unwrap().run().await;
    assert!(matches!(result, Err(MigrationError::AuthenticationFailed(_))));
}

#[tokio::test]
async fn test_missing_preseed_file_is_fatal() {
    let server = MockServer::start().await;
    mount_listing(&server, vec![]).await;

    let result = Discovery::new(&config(&server))
        .unwrap()
        .with_preseed(Some("/nonexistent/preseed.txt".into()))
        .run()
        .await;
    assert!(matches!(result, Err(MigrationError::IoError(_))));
}
