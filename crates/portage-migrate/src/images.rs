//! Container image migration to Docker Hub.
//!
//! Each image/tag moves through `Pending → Pulled → Retagged → Pushed`, or
//! stops at `Failed` on the first step that fails. A failed tag never stops
//! its siblings.

use crate::command::{CommandRunner, Invocation};
use crate::config::MigrationConfig;
use crate::dockerhub::{CreateRepoRequest, DockerHubClient, HubToken};
use crate::error::Result;
use crate::types::{Image, Project, RunSummary};

use std::collections::BTreeSet;
use tracing::{info, warn};

/// Tag used when a reference carries none.
pub const DEFAULT_TAG: &str = "latest";

/// Step of a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStage {
    Pull,
    Tag,
    Login,
    Push,
}

impl std::fmt::Display for TransferStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pull => write!(f, "pull"),
            Self::Tag => write!(f, "tag"),
            Self::Login => write!(f, "login"),
            Self::Push => write!(f, "push"),
        }
    }
}

/// State of one image/tag transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferState {
    Pending,
    Pulled,
    Retagged,
    Pushed,
    Failed { stage: TransferStage, reason: String },
}

/// One image/tag being moved.
#[derive(Debug, Clone)]
pub struct ImageTransfer {
    pub source: String,
    pub destination: String,
    pub state: TransferState,
}

/// Destination repository name: `/` becomes `-`.
pub fn destination_name(image_name: &str) -> String {
    image_name.replace('/', "-")
}

/// Tags to migrate, with empty tags mapped to `latest`.
pub fn effective_tags(image: &Image) -> BTreeSet<String> {
    image
        .tags
        .iter()
        .map(|tag| {
            if tag.is_empty() {
                DEFAULT_TAG.to_string()
            } else {
                tag.clone()
            }
        })
        .collect()
}

/// Pulls from the source registry and pushes to a Docker Hub organization.
pub struct ImageMigrator<'a, R: CommandRunner> {
    runner: &'a R,
    hub: DockerHubClient,
    source_prefix: String,
    organization: String,
    username: String,
    password: String,
}

impl<'a, R: CommandRunner> ImageMigrator<'a, R> {
    /// Requires Docker Hub user, token and organization.
    pub fn new(config: &MigrationConfig, runner: &'a R) -> Result<Self> {
        let (username, password) = config.credentials.dockerhub_login()?;
        Ok(Self {
            runner,
            hub: DockerHubClient::new(config)?,
            source_prefix: config.source_image_prefix(),
            organization: config.credentials.dockerhub_org()?.to_string(),
            username: username.to_string(),
            password: password.to_string(),
        })
    }

    pub fn source_reference(&self, image_name: &str, tag: &str) -> String {
        format!("{}/{image_name}:{tag}", self.source_prefix)
    }

    pub fn destination_reference(&self, image_name: &str, tag: &str) -> String {
        format!(
            "{}/{}:{tag}",
            self.organization,
            destination_name(image_name)
        )
    }

    /// Pull, retag, log in and push one tag.
    pub fn transfer(&self, image_name: &str, tag: &str) -> ImageTransfer {
        let tag = if tag.is_empty() { DEFAULT_TAG } else { tag };
        let mut transfer = ImageTransfer {
            source: self.source_reference(image_name, tag),
            destination: self.destination_reference(image_name, tag),
            state: TransferState::Pending,
        };

        let steps = [
            (
                TransferStage::Pull,
                Invocation::new("docker", ["pull", transfer.source.as_str()]),
                TransferState::Pulled,
            ),
            (
                TransferStage::Tag,
                Invocation::new(
                    "docker",
                    ["tag", transfer.source.as_str(), transfer.destination.as_str()],
                ),
                TransferState::Retagged,
            ),
            (
                TransferStage::Login,
                Invocation::new(
                    "docker",
                    ["login", "--username", self.username.as_str(), "--password-stdin"],
                )
                .with_stdin(self.password.clone()),
                TransferState::Retagged,
            ),
            (
                TransferStage::Push,
                Invocation::new("docker", ["push", transfer.destination.as_str()]),
                TransferState::Pushed,
            ),
        ];

        for (stage, invocation, next) in steps {
            match self.runner.run_checked(&invocation) {
                Ok(output) => {
                    info!(
                        stage = %stage,
                        image = %transfer.source,
                        output = %output.combined(),
                        "Step finished"
                    );
                    transfer.state = next;
                }
                Err(e) => {
                    warn!(stage = %stage, image = %transfer.source, "Step failed: {e}");
                    transfer.state = TransferState::Failed {
                        stage,
                        reason: e.to_string(),
                    };
                    break;
                }
            }
        }

        transfer
    }

    /// Migrate every image of one project, recording results in `summary`.
    pub async fn migrate_project(&self, project: &Project, token: &HubToken, summary: &mut RunSummary) {
        for image in &project.images {
            let request = CreateRepoRequest {
                name: destination_name(&image.name),
                namespace: self.organization.clone(),
                description: String::new(),
                is_private: true,
            };

            if let Err(e) = self.hub.ensure_repository(&request, token).await {
                warn!(project = %project.name, image = %image.name, "Failed to create repository: {e}");
                summary.record_failure(&image.name, "create-repository", e.to_string());
                continue;
            }

            for tag in effective_tags(image) {
                let transfer = self.transfer(&image.name, &tag);
                if let TransferState::Failed { stage, reason } = transfer.state {
                    summary.record_failure(transfer.source, stage.to_string(), reason);
                } else {
                    info!(source = %transfer.source, destination = %transfer.destination, "Migrated image");
                    summary.record_success(transfer.destination);
                }
            }
        }
    }

    /// Migrate all projects' images. Only the Docker Hub login is fatal.
    pub async fn migrate(&self, projects: &[Project]) -> Result<RunSummary> {
        let mut summary = RunSummary::new();
        let token = self.hub.login(&self.username, &self.password).await?;

        for project in projects {
            if project.images.is_empty() {
                continue;
            }
            info!(project = %project.name, images = project.images.len(), "Migrating images");
            self.migrate_project(project, &token, &mut summary).await;
        }

        summary.complete();
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::testing::ScriptedRunner;
    use crate::command::CommandOutput;
    use crate::config::Credentials;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(hub: &str) -> MigrationConfig {
        MigrationConfig::new("https://gitlab.example.com", "registry.example.com:8000", "dev")
            .with_dockerhub_url(hub)
            .with_credentials(Credentials {
                dockerhub_user: Some("bot".into()),
                dockerhub_token: Some("dckr_pat".into()),
                dockerhub_org: Some("acme".into()),
                ..Default::default()
            })
    }

    #[test]
    fn test_names() {
        assert_eq!(destination_name("app/worker"), "app-worker");
        let image = Image::with_tags("app", ["", "latest", "v1"]);
        assert_eq!(
            effective_tags(&image).into_iter().collect::<Vec<_>>(),
            ["latest", "v1"]
        );
    }

    #[test]
    fn test_transfer_success_runs_all_steps() {
        let runner = ScriptedRunner::new();
        let migrator = ImageMigrator::new(&config("http://unused"), &runner).unwrap();

        let transfer = migrator.transfer("app/worker", "");
        assert_eq!(transfer.state, TransferState::Pushed);
        assert_eq!(
            runner.commands(),
            [
                "docker pull registry.example.com:8000/dev/app/worker:latest",
                "docker tag registry.example.com:8000/dev/app/worker:latest acme/app-worker:latest",
                "docker login --username bot --password-stdin",
                "docker push acme/app-worker:latest",
            ]
        );
        assert_eq!(runner.calls.borrow()[2].stdin.as_deref(), Some("dckr_pat"));
    }

    #[test]
    fn test_transfer_pull_failure_stops() {
        let runner = ScriptedRunner::new()
            .respond("docker pull", CommandOutput::failed("manifest unknown"));
        let migrator = ImageMigrator::new(&config("http://unused"), &runner).unwrap();

        let transfer = migrator.transfer("app", "v1");
        match transfer.state {
            TransferState::Failed { stage, reason } => {
                assert_eq!(stage, TransferStage::Pull);
                assert!(reason.contains("manifest unknown"));
            }
            other => panic!("unexpected state {other:?}"),
        }
        assert_eq!(runner.commands().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_tag_does_not_stop_siblings() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/users/login/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "token": "jwt" })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v2/repositories/"))
            .respond_with(ResponseTemplate::new(201))
            .mount(&server)
            .await;

        let runner = ScriptedRunner::new().respond(
            "docker pull registry.example.com:8000/dev/app:v1",
            CommandOutput::failed("not found"),
        );
        let migrator = ImageMigrator::new(&config(&server.uri()), &runner).unwrap();
        let project = Project {
            name: "app".into(),
            images: vec![Image::with_tags("app", ["v1", "v2"])],
            ..Default::default()
        };

        let summary = migrator.migrate(&[project]).await.unwrap();

        assert_eq!(summary.succeeded, ["acme/app:v2"]);
        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.failures[0].stage, "pull");
        assert_eq!(summary.failures[0].item, "registry.example.com:8000/dev/app:v1");
    }

    #[tokio::test]
    async fn test_repository_failure_skips_image() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/users/login/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "token": "jwt" })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v2/repositories/"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let runner = ScriptedRunner::new();
        let migrator = ImageMigrator::new(&config(&server.uri()), &runner).unwrap();
        let project = Project {
            name: "app".into(),
            images: vec![Image::with_tags("app", ["v1"])],
            ..Default::default()
        };

        let summary = migrator.migrate(&[project]).await.unwrap();
        assert_eq!(summary.failures[0].stage, "create-repository");
        assert!(runner.commands().is_empty());
    }

    #[tokio::test]
    async fn test_login_failure_is_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let runner = ScriptedRunner::new();
        let migrator = ImageMigrator::new(&config(&server.uri()), &runner).unwrap();
        assert!(migrator.migrate(&[]).await.is_err());
    }
}
