//! GitLab admin API: project listing, branch enrichment and registry tokens.

use crate::config::MigrationConfig;
use crate::error::{MigrationError, Result};
use crate::registry::RegistryToken;
use crate::types::{Branch, Project};

use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use tracing::{debug, info};

/// Page size requested from list endpoints.
pub const PER_PAGE: u32 = 100;

/// Client for the source GitLab instance.
pub struct GitLabClient {
    client: Client,
    gitlab_url: String,
    token: String,
    basic_auth: Option<(String, String)>,
}

impl GitLabClient {
    /// Create a client from the migration configuration.
    ///
    /// Requires the private token; the basic-auth pair is only needed for
    /// [`GitLabClient::registry_token`].
    pub fn new(config: &MigrationConfig) -> Result<Self> {
        let token = config.credentials.gitlab_token()?.to_string();
        let basic_auth = config
            .credentials
            .gitlab_basic_auth()
            .ok()
            .map(|(u, p)| (u.to_string(), p.to_string()));

        Ok(Self {
            client: config.http_client(true)?,
            gitlab_url: config.gitlab_url.clone(),
            token,
            basic_auth,
        })
    }

    async fn gitlab_get<T: DeserializeOwned>(&self, request: RequestBuilder, what: &str) -> Result<T> {
        let response = request
            .header("PRIVATE-TOKEN", &self.token)
            .send()
            .await
            .map_err(|e| MigrationError::NetworkError(e.to_string()))?;

        if response.status() == 404 {
            return Err(MigrationError::NotFound(what.to_string()));
        }

        if response.status() == 401 {
            return Err(MigrationError::AuthenticationFailed(
                "Invalid GitLab token".to_string(),
            ));
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(MigrationError::ApiError(format!(
                "GitLab API error ({status}): {body}"
            )));
        }

        response
            .json()
            .await
            .map_err(|e| MigrationError::ApiError(format!("{what}: {e}")))
    }

    /// Fetch one page of the project listing.
    pub async fn list_page(&self, page: u32) -> Result<Vec<Project>> {
        let url = format!("{}/api/v4/projects", self.gitlab_url);
        let request = self
            .client
            .get(&url)
            .query(&[("page", page), ("per_page", PER_PAGE)]);
        self.gitlab_get(request, &format!("projects page {page}")).await
    }

    /// List every project, paging until a page comes back empty.
    ///
    /// The first error aborts the listing.
    pub async fn list_projects(&self) -> Result<Vec<Project>> {
        let mut projects = Vec::new();
        let mut page = 1;

        loop {
            let items = self.list_page(page).await?;
            if items.is_empty() {
                break;
            }
            debug!(page, count = items.len(), "Fetched project page");
            projects.extend(items);
            page += 1;
        }

        info!(count = projects.len(), "Listed GitLab projects");
        Ok(projects)
    }

    fn branches_url(&self, project: &Project) -> String {
        project.links.repo_branches.clone().unwrap_or_else(|| {
            format!(
                "{}/api/v4/projects/{}/repository/branches",
                self.gitlab_url, project.id
            )
        })
    }

    /// Fetch the branch list of a project.
    pub async fn fetch_branches(&self, project: &Project) -> Result<Vec<Branch>> {
        let request = self
            .client
            .get(self.branches_url(project))
            .query(&[("per_page", PER_PAGE)]);
        self.gitlab_get(request, &format!("branches of {}", project.name))
            .await
    }

    /// Replace the project's branches with a fresh listing.
    ///
    /// On error the project keeps whatever branches it had.
    pub async fn enrich_branches(&self, project: &mut Project) -> Result<()> {
        let branches = self.fetch_branches(project).await?;
        debug!(project = %project.name, count = branches.len(), "Fetched branches");
        project.branches = branches;
        Ok(())
    }

    /// Exchange basic credentials for a registry token scoped to the project.
    pub async fn registry_token(&self, project: &Project) -> Result<RegistryToken> {
        let (user, pass) = self.basic_auth.as_ref().ok_or_else(|| {
            MigrationError::InvalidConfig("GitLab user and password are required for registry tokens".into())
        })?;

        let scope = format!("repository:{}:push,pull", project.path_with_namespace);
        let url = format!("{}/jwt/auth", self.gitlab_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("client_id", "docker"),
                ("offline_token", "true"),
                ("service", "container_registry"),
                ("scope", scope.as_str()),
            ])
            .basic_auth(user, Some(pass))
            .send()
            .await
            .map_err(|e| MigrationError::NetworkError(e.to_string()))?;

        if response.status() == 401 || response.status() == 403 {
            return Err(MigrationError::AuthenticationFailed(format!(
                "registry token for {} ({})",
                project.path_with_namespace,
                response.status()
            )));
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(MigrationError::ApiError(format!(
                "Registry token request failed ({status}): {body}"
            )));
        }

        response
            .json()
            .await
            .map_err(|e| MigrationError::ApiError(format!("registry token: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Credentials;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(uri: &str) -> MigrationConfig {
        MigrationConfig::new(uri, "registry.example.com:8000", "dev").with_credentials(Credentials {
            gitlab_token: Some("glpat".into()),
            gitlab_user: Some("me".into()),
            gitlab_pass: Some("pw".into()),
            ..Default::default()
        })
    }

    fn project_json(id: u64) -> serde_json::Value {
        serde_json::json!({
            "id": id,
            "name": format!("p{id}"),
            "path_with_namespace": format!("dev/p{id}"),
            "http_url_to_repo": format!("https://gitlab.example.com/dev/p{id}.git"),
        })
    }

    #[tokio::test]
    async fn test_pagination_stops_on_empty_page() {
        let server = MockServer::start().await;
        let sizes = [100u64, 100, 37, 0];
        let mut next_id = 0;
        for (i, size) in sizes.iter().enumerate() {
            let page: Vec<_> = (0..*size)
                .map(|_| {
                    next_id += 1;
                    project_json(next_id)
                })
                .collect();
            Mock::given(method("GET"))
                .and(path("/api/v4/projects"))
                .and(query_param("page", (i + 1).to_string()))
                .and(header("PRIVATE-TOKEN", "glpat"))
                .respond_with(ResponseTemplate::new(200).set_body_json(page))
                .expect(1)
                .mount(&server)
                .await;
        }

        let client = GitLabClient::new(&config(&server.uri())).unwrap();
        let projects = client.list_projects().await.unwrap();

        assert_eq!(projects.len(), 237);
        assert_eq!(projects[236].id, 237);
    }

    #[tokio::test]
    async fn test_listing_error_aborts() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v4/projects"))
            .respond_with(ResponseTemplate::new(500).set_body_string("down"))
            .mount(&server)
            .await;

        let client = GitLabClient::new(&config(&server.uri())).unwrap();
        let err = client.list_projects().await.unwrap_err();
        assert!(matches!(err, MigrationError::ApiError(_)));
    }

    #[tokio::test]
    async fn test_enrich_branches_replaces_list() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v4/projects/3/repository/branches"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                { "name": "main", "default": true, "protected": true },
                { "name": "feature", "default": false }
            ])))
            .mount(&server)
            .await;

        let client = GitLabClient::new(&config(&server.uri())).unwrap();
        let mut project = Project {
            id: 3,
            name: "p3".into(),
            branches: vec![Branch::new("stale", true)],
            ..Default::default()
        };
        client.enrich_branches(&mut project).await.unwrap();

        assert_eq!(project.branches.len(), 2);
        assert_eq!(project.default_branch().unwrap().name, "main");
    }

    #[tokio::test]
    async fn test_enrich_branches_failure_keeps_existing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = GitLabClient::new(&config(&server.uri())).unwrap();
        let mut project = Project {
            id: 3,
            branches: vec![Branch::new("main", true)],
            ..Default::default()
        };
        assert!(client.enrich_branches(&mut project).await.is_err());
        assert_eq!(project.branches.len(), 1);
    }

    #[tokio::test]
    async fn test_registry_token_exchange() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/jwt/auth"))
            .and(query_param("scope", "repository:dev/p1:push,pull"))
            .and(query_param("service", "container_registry"))
            .and(header("Authorization", "Basic bWU6cHc="))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "token": "jwt" })),
            )
            .mount(&server)
            .await;

        let client = GitLabClient::new(&config(&server.uri())).unwrap();
        let project: Project = serde_json::from_value(project_json(1)).unwrap();
        let token = client.registry_token(&project).await.unwrap();
        assert_eq!(token.secret(), "jwt");
    }

    #[tokio::test]
    async fn test_registry_token_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/jwt/auth"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let client = GitLabClient::new(&config(&server.uri())).unwrap();
        let project: Project = serde_json::from_value(project_json(1)).unwrap();
        let err = client.registry_token(&project).await.unwrap_err();
        assert!(matches!(err, MigrationError::AuthenticationFailed(_)));
    }

    #[test]
    fn test_client_requires_token() {
        let config = MigrationConfig::new("https://gitlab.example.com", "r:8000", "dev");
        assert!(GitLabClient::new(&config).is_err());
    }
}
