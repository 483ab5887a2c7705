//! Migration configuration and credentials.

use crate::error::{MigrationError, Result};

use reqwest::Client;
use std::time::Duration;

/// Environment variable holding the GitLab private token.
pub const ENV_GITLAB_TOKEN: &str = "GITLAB_TOKEN";
/// Environment variable holding the GitLab user for basic auth.
pub const ENV_GITLAB_USER: &str = "GITLAB_USER";
/// Environment variable holding the GitLab password for basic auth.
pub const ENV_GITLAB_PASS: &str = "GITLAB_PASS";
/// Environment variable holding the Docker Hub user.
pub const ENV_DOCKERHUB_USER: &str = "DOCKERHUB_USER";
/// Environment variable holding the Docker Hub access token.
pub const ENV_DOCKERHUB_TOKEN: &str = "DOCKERHUB_TOKEN";
/// Environment variable holding the Docker Hub organization.
pub const ENV_DOCKERHUB_ORG: &str = "DOCKERHUB_ORG";
/// Environment variable holding the GitHub token.
pub const ENV_GITHUB_TOKEN: &str = "GITHUB_TOKEN";

/// Secrets read from the environment. Passed through, never stored.
#[derive(Clone, Default)]
pub struct Credentials {
    pub gitlab_token: Option<String>,
    pub gitlab_user: Option<String>,
    pub gitlab_pass: Option<String>,
    pub dockerhub_user: Option<String>,
    pub dockerhub_token: Option<String>,
    pub dockerhub_org: Option<String>,
    pub github_token: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mask = |v: &Option<String>| if v.is_some() { "<set>" } else { "<unset>" };
        f.debug_struct("Credentials")
            .field("gitlab_token", &mask(&self.gitlab_token))
            .field("gitlab_user", &self.gitlab_user)
            .field("gitlab_pass", &mask(&self.gitlab_pass))
            .field("dockerhub_user", &self.dockerhub_user)
            .field("dockerhub_token", &mask(&self.dockerhub_token))
            .field("dockerhub_org", &self.dockerhub_org)
            .field("github_token", &mask(&self.github_token))
            .finish()
    }
}

impl Credentials {
    /// Read credentials from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read credentials through an arbitrary lookup. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Self {
            gitlab_token: get(ENV_GITLAB_TOKEN),
            gitlab_user: get(ENV_GITLAB_USER),
            gitlab_pass: get(ENV_GITLAB_PASS),
            dockerhub_user: get(ENV_DOCKERHUB_USER),
            dockerhub_token: get(ENV_DOCKERHUB_TOKEN),
            dockerhub_org: get(ENV_DOCKERHUB_ORG),
            github_token: get(ENV_GITHUB_TOKEN),
        }
    }

    pub fn gitlab_token(&self) -> Result<&str> {
        require(&self.gitlab_token, ENV_GITLAB_TOKEN)
    }

    /// User and password for the registry token exchange.
    pub fn gitlab_basic_auth(&self) -> Result<(&str, &str)> {
        Ok((
            require(&self.gitlab_user, ENV_GITLAB_USER)?,
            require(&self.gitlab_pass, ENV_GITLAB_PASS)?,
        ))
    }

    /// User and token for Docker Hub.
    pub fn dockerhub_login(&self) -> Result<(&str, &str)> {
        Ok((
            require(&self.dockerhub_user, ENV_DOCKERHUB_USER)?,
            require(&self.dockerhub_token, ENV_DOCKERHUB_TOKEN)?,
        ))
    }

    pub fn dockerhub_org(&self) -> Result<&str> {
        require(&self.dockerhub_org, ENV_DOCKERHUB_ORG)
    }

    pub fn github_token(&self) -> Result<&str> {
        require(&self.github_token, ENV_GITHUB_TOKEN)
    }
}

fn require<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str> {
    value
        .as_deref()
        .ok_or_else(|| MigrationError::InvalidConfig(format!("{name} is not set")))
}

/// Configuration shared by every migration step.
#[derive(Debug, Clone)]
pub struct MigrationConfig {
    /// Base URL of the source GitLab instance.
    pub gitlab_url: String,

    /// Base URL of the registry mirror queried for tags.
    pub registry_url: String,

    /// Source registry host and port images are pulled from, e.g. `gitlab.example.com:8000`.
    pub source_registry: String,

    /// Namespace under the source registry and GitLab host, e.g. `dev-team`.
    pub source_namespace: String,

    /// Destination GitHub organization.
    pub github_org: Option<String>,

    /// Docker Hub API base URL.
    pub dockerhub_url: String,

    /// GitHub API base URL.
    pub github_api_url: String,

    /// Skip TLS verification for the GitLab host.
    pub accept_invalid_certs: bool,

    /// Commit message used when rewriting repositories.
    pub commit_message: String,

    /// Delay between default-branch polls on GitHub.
    pub branch_poll_interval: Duration,

    /// Number of default-branch polls before giving up.
    pub branch_poll_attempts: u32,

    /// Secrets.
    pub credentials: Credentials,
}

impl MigrationConfig {
    /// Create a new migration configuration.
    pub fn new(
        gitlab_url: impl Into<String>,
        source_registry: impl Into<String>,
        source_namespace: impl Into<String>,
    ) -> Self {
        Self {
            gitlab_url: trim_url(gitlab_url.into()),
            registry_url: "http://localhost:5000".to_string(),
            source_registry: source_registry.into().trim_end_matches('/').to_string(),
            source_namespace: source_namespace.into().trim_matches('/').to_string(),
            github_org: None,
            dockerhub_url: "https://hub.docker.com".to_string(),
            github_api_url: "https://api.github.com".to_string(),
            accept_invalid_certs: false,
            commit_message: "Updating git & image references".to_string(),
            branch_poll_interval: Duration::from_secs(100),
            branch_poll_attempts: 18,
            credentials: Credentials::default(),
        }
    }

    /// Set the registry mirror URL.
    pub fn with_registry_url(mut self, url: impl Into<String>) -> Self {
        self.registry_url = trim_url(url.into());
        self
    }

    /// Set the GitHub organization.
    pub fn with_github_org(mut self, org: impl Into<String>) -> Self {
        self.github_org = Some(org.into());
        self
    }

    /// Set the Docker Hub API URL.
    pub fn with_dockerhub_url(mut self, url: impl Into<String>) -> Self {
        self.dockerhub_url = trim_url(url.into());
        self
    }

    /// Set the GitHub API URL.
    pub fn with_github_api_url(mut self, url: impl Into<String>) -> Self {
        self.github_api_url = trim_url(url.into());
        self
    }

    /// Accept invalid TLS certificates from the GitLab host.
    pub fn with_insecure_tls(mut self, insecure: bool) -> Self {
        self.accept_invalid_certs = insecure;
        self
    }

    /// Set the default-branch polling budget.
    pub fn with_branch_polling(mut self, interval: Duration, attempts: u32) -> Self {
        self.branch_poll_interval = interval;
        self.branch_poll_attempts = attempts;
        self
    }

    /// Set the credentials.
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    /// Host name of the GitLab instance, without scheme or port.
    pub fn gitlab_host(&self) -> Result<String> {
        let parsed = url::Url::parse(&self.gitlab_url)
            .map_err(|e| MigrationError::InvalidConfig(format!("gitlab url: {e}")))?;
        parsed
            .host_str()
            .map(str::to_string)
            .ok_or_else(|| MigrationError::InvalidConfig("gitlab url has no host".to_string()))
    }

    /// `registry[:port]/namespace`, the prefix of every source image reference.
    pub fn source_image_prefix(&self) -> String {
        format!("{}/{}", self.source_registry, self.source_namespace)
    }

    /// Host of the source registry without its port.
    pub fn source_registry_hostname(&self) -> &str {
        self.source_registry
            .split(':')
            .next()
            .unwrap_or(&self.source_registry)
    }

    pub fn github_org(&self) -> Result<&str> {
        self.github_org
            .as_deref()
            .ok_or_else(|| MigrationError::InvalidConfig("GitHub organization is not set".into()))
    }

    /// Build an HTTP client. `insecure` only applies to the GitLab host.
    pub(crate) fn http_client(&self, insecure: bool) -> Result<Client> {
        Client::builder()
            .user_agent("portage-migrate")
            .danger_accept_invalid_certs(insecure && self.accept_invalid_certs)
            .build()
            .map_err(|e| MigrationError::NetworkError(e.to_string()))
    }
}

fn trim_url(url: String) -> String {
    url.trim_end_matches('/').to_string()
}
