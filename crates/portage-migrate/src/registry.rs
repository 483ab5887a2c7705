//! Docker Registry v2 tag listing.

use crate::config::MigrationConfig;
use crate::error::{MigrationError, Result};

use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

/// Registry error code for a repository the registry has never seen.
pub const NAME_UNKNOWN: &str = "NAME_UNKNOWN";

/// Bearer token scoped to one repository. Never persisted.
#[derive(Clone, Deserialize)]
pub struct RegistryToken {
    token: String,
}

impl RegistryToken {
    /// Wrap a raw bearer token.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }

    /// The raw token, for the `Authorization` header.
    pub fn secret(&self) -> &str {
        &self.token
    }
}

impl std::fmt::Debug for RegistryToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("RegistryToken(<redacted>)")
    }
}

/// Body of `GET /v2/<name>/tags/list`, success or failure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TagListResponse {
    #[serde(default)]
    pub name: Option<String>,

    /// `None` both when the field is absent and when it is `null`.
    #[serde(default)]
    pub tags: Option<Vec<String>>,

    #[serde(default)]
    pub errors: Option<Vec<RegistryErrorEntry>>,
}

/// One entry of a registry `errors` array.
#[derive(Debug, Clone, Deserialize)]
pub struct RegistryErrorEntry {
    pub code: String,
    #[serde(default)]
    pub message: Option<String>,
}

/// Interpretation of a tag listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagLookup {
    /// The registry returned a tag list.
    Tags(Vec<String>),
    /// The registry does not know the repository.
    NameUnknown,
    /// The tags field was null or missing.
    NoTags,
    /// The registry reported other errors.
    Errors(Vec<String>),
}

impl TagListResponse {
    /// Classify the response. Errors take precedence over tags.
    pub fn into_lookup(self) -> TagLookup {
        if let Some(errors) = self.errors.filter(|e| !e.is_empty()) {
            if errors.iter().any(|e| e.code == NAME_UNKNOWN) {
                return TagLookup::NameUnknown;
            }
            return TagLookup::Errors(
                errors
                    .into_iter()
                    .map(|e| match e.message {
                        Some(message) => format!("{}: {message}", e.code),
                        None => e.code,
                    })
                    .collect(),
            );
        }

        match self.tags {
            Some(tags) => TagLookup::Tags(tags),
            None => TagLookup::NoTags,
        }
    }
}

/// Client for the registry mirror.
pub struct RegistryClient {
    client: Client,
    registry_url: String,
}

impl RegistryClient {
    /// Client for `config.registry_url`.
    pub fn new(config: &MigrationConfig) -> Result<Self> {
        Ok(Self {
            client: config.http_client(false)?,
            registry_url: config.registry_url.clone(),
        })
    }

    /// List the tags of a repository.
    ///
    /// Registry-level errors (any status with a JSON error body) are
    /// returned as a [`TagLookup`], not as `Err`; only transport failures
    /// and undecodable bodies are errors.
    pub async fn list_tags(&self, repository: &str, token: &RegistryToken) -> Result<TagLookup> {
        let url = format!("{}/v2/{repository}/tags/list", self.registry_url);
        let response = self
            .client
            .get(&url)
            .header(
                "Accept",
                "application/vnd.docker.distribution.manifest.v2+json",
            )
            .bearer_auth(token.secret())
            .send()
            .await
            .map_err(|e| MigrationError::NetworkError(e.to_string()))?;

        let status = response.status();
        let body = response.text().await?;
        debug!(repository, %status, body = %body, "Registry tag listing");

        let parsed: TagListResponse = serde_json::from_str(&body).map_err(|e| {
            MigrationError::ApiError(format!("registry response ({status}) for {repository}: {e}"))
        })?;
        Ok(parsed.into_lookup())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn lookup(json: &str) -> TagLookup {
        serde_json::from_str::<TagListResponse>(json)
            .unwrap()
            .into_lookup()
    }

    #[test]
    fn test_classify_tags() {
        assert_eq!(
            lookup(r#"{"name":"dev/app","tags":["v1","v2"]}"#),
            TagLookup::Tags(vec!["v1".into(), "v2".into()])
        );
    }

    #[test]
    fn test_classify_null_tags() {
        assert_eq!(lookup(r#"{"name":"dev/app","tags":null}"#), TagLookup::NoTags);
    }

    #[test]
    fn test_classify_name_unknown() {
        let json = r#"{"errors":[{"code":"NAME_UNKNOWN","message":"repository name not known to registry"}]}"#;
        assert_eq!(lookup(json), TagLookup::NameUnknown);
    }

    #[test]
    fn test_classify_other_errors() {
        let json = r#"{"errors":[{"code":"UNAUTHORIZED","message":"authentication required"}]}"#;
        assert_eq!(
            lookup(json),
            TagLookup::Errors(vec!["UNAUTHORIZED: authentication required".into()])
        );
    }

    #[test]
    fn test_token_debug_is_redacted() {
        assert!(!format!("{:?}", RegistryToken::new("abc")).contains("abc"));
    }

    #[tokio::test]
    async fn test_list_tags_not_found_is_not_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/dev/app/tags/list"))
            .and(header("Authorization", "Bearer jwt"))
            .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
                "errors": [{ "code": "NAME_UNKNOWN", "message": "unknown", "detail": { "name": "dev/app" } }]
            })))
            .mount(&server)
            .await;

        let config = MigrationConfig::new("https://gitlab.example.com", "r:8000", "dev")
            .with_registry_url(server.uri());
        let client = RegistryClient::new(&config).unwrap();
        let result = client
            .list_tags("dev/app", &RegistryToken::new("jwt"))
            .await
            .unwrap();
        assert_eq!(result, TagLookup::NameUnknown);
    }
}
