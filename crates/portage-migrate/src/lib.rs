//! # Portage Migration Tools
//!
//! This crate moves a self-hosted GitLab estate off its host: source code to a
//! GitHub organization, container images to a Docker Hub organization, and
//! references inside repositories and local clones along with them.
//!
//! ## Features
//!
//! - **Discovery**: List every GitLab project, enrich it with branches and with
//!   container images reconciled from a pre-seed file and the registry
//! - **Image Migration**: Pull, retag and push every known image tag
//! - **Repository Rewriting**: Rewrite image and source references on every branch
//! - **Remote Updates**: Repoint local clones at GitHub
//! - **Repository Moves**: Mirror bare clones into GitHub and normalize the default branch
//!
//! ## Example
//!
//! ```rust,ignore
//! use portage_migrate::{Credentials, Discovery, MigrationConfig};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> portage_migrate::Result<()> {
//!     let config = MigrationConfig::new(
//!         "https://gitlab.example.com",
//!         "gitlab.example.com:8000",
//!         "dev-team",
//!     )
//!     .with_credentials(Credentials::from_env());
//!
//!     let (projects, summary) = Discovery::new(&config)?
//!         .with_snapshot(Some("gitlab_projects.json".into()))
//!         .run()
//!         .await?;
//!
//!     println!("{} projects", projects.len());
//!     summary.print_summary("Discovery");
//!     Ok(())
//! }
//! ```

pub mod command;
pub mod config;
pub mod discovery;
pub mod dockerhub;
pub mod error;
pub mod git;
pub mod github;
pub mod gitlab;
pub mod images;
pub mod preseed;
pub mod reconcile;
pub mod registry;
pub mod repos;
pub mod rewrite;
pub mod snapshot;
pub mod types;

// Re-export main types
pub use command::{CommandRunner, SystemRunner};
pub use config::{Credentials, MigrationConfig};
pub use discovery::Discovery;
pub use error::{MigrationError, Result};
pub use github::{GitHubClient, RepoMover};
pub use gitlab::GitLabClient;
pub use images::ImageMigrator;
pub use preseed::Preseed;
pub use repos::{RemoteUpdater, RepoRewriter};
pub use rewrite::{default_rules, RewriteRule};
pub use types::*;

/// Version of the migration tools.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
