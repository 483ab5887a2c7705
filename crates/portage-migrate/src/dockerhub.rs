//! Docker Hub API client: login and repository creation.

use crate::config::MigrationConfig;
use crate::error::{MigrationError, Result};

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    token: String,
}

/// Body of `POST /v2/repositories/`.
#[derive(Debug, Clone, Serialize)]
pub struct CreateRepoRequest {
    pub name: String,
    pub namespace: String,
    pub description: String,
    pub is_private: bool,
}

#[derive(Debug, Default, Deserialize)]
struct HubErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    detail: Option<String>,
}

/// Result of ensuring a repository exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepoStatus {
    Created,
    AlreadyExists,
}

/// Docker Hub JWT returned by login.
#[derive(Clone)]
pub struct HubToken(String);

impl HubToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl std::fmt::Debug for HubToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("HubToken(<redacted>)")
    }
}

/// Client for the Docker Hub API.
pub struct DockerHubClient {
    client: Client,
    base_url: String,
}

impl DockerHubClient {
    pub fn new(config: &MigrationConfig) -> Result<Self> {
        Ok(Self {
            client: config.http_client(false)?,
            base_url: config.dockerhub_url.clone(),
        })
    }

    /// Exchange user and access token for a JWT.
    pub async fn login(&self, username: &str, password: &str) -> Result<HubToken> {
        let url = format!("{}/v2/users/login/", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&LoginRequest { username, password })
            .send()
            .await
            .map_err(|e| MigrationError::NetworkError(e.to_string()))?;

        if response.status() != StatusCode::OK {
            return Err(MigrationError::AuthenticationFailed(format!(
                "Docker Hub login returned {}",
                response.status()
            )));
        }

        let body: LoginResponse = response
            .json()
            .await
            .map_err(|e| MigrationError::ApiError(e.to_string()))?;
        Ok(HubToken(body.token))
    }

    /// Create a repository; an existing repository is success.
    pub async fn ensure_repository(
        &self,
        request: &CreateRepoRequest,
        token: &HubToken,
    ) -> Result<RepoStatus> {
        let url = format!("{}/v2/repositories/", self.base_url);
        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("JWT {}", token.0))
            .json(request)
            .send()
            .await
            .map_err(|e| MigrationError::NetworkError(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::CREATED {
            info!(repository = %request.name, "Repository created");
            return Ok(RepoStatus::Created);
        }

        let body = response.text().await.unwrap_or_default();
        let parsed: HubErrorBody = serde_json::from_str(&body).unwrap_or_default();
        let message = parsed.message.or(parsed.detail).unwrap_or_default();
        if message.contains("already exists") {
            info!(repository = %request.name, "Repository already exists");
            return Ok(RepoStatus::AlreadyExists);
        }

        Err(MigrationError::ApiError(format!(
            "Failed to create repository {}/{} ({status}): {body}",
            request.namespace, request.name
        )))
    }
}
