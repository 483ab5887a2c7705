//! Thin wrapper over the git CLI.

use crate::command::{CommandOutput, CommandRunner, Invocation};
use crate::error::{MigrationError, Result};

use std::path::Path;
use tracing::{debug, info};

/// git output when the clone target is already populated.
const ALREADY_CLONED: &str = "already exists and is not an empty directory";
/// git output when a commit has nothing staged.
const NOTHING_TO_COMMIT: &str = "nothing to commit";

/// Whether a clone happened or was skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloneOutcome {
    Cloned,
    AlreadyPresent,
}

/// Whether a commit was created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed,
    NothingToCommit,
}

/// git commands over a [`CommandRunner`].
pub struct Git<'a, R: CommandRunner> {
    runner: &'a R,
}

impl<'a, R: CommandRunner> Git<'a, R> {
    pub fn new(runner: &'a R) -> Self {
        Self { runner }
    }

    fn run(&self, dir: &Path, args: &[&str]) -> Result<CommandOutput> {
        self.runner
            .run_checked(&Invocation::new("git", args.iter().copied()).in_dir(dir))
    }

    /// `git clone <url> <dest>`; an existing non-empty destination counts as done.
    pub fn clone_repo(&self, url: &str, dest: &Path) -> Result<CloneOutcome> {
        info!(url, dest = %dest.display(), "Cloning");
        let dest_arg = dest.to_string_lossy();
        let output = self
            .runner
            .run(&Invocation::new("git", ["clone", url, dest_arg.as_ref()]))?;

        if output.combined().contains(ALREADY_CLONED) {
            info!(dest = %dest.display(), "Already cloned, not cloning again");
            return Ok(CloneOutcome::AlreadyPresent);
        }
        if !output.success {
            return Err(MigrationError::CommandFailed {
                command: format!("git clone {url}"),
                output: output.combined(),
            });
        }
        Ok(CloneOutcome::Cloned)
    }

    /// `git clone --bare <url>` inside `work_dir`.
    pub fn clone_bare(&self, url: &str, work_dir: &Path) -> Result<()> {
        info!(url, "Cloning bare");
        self.run(work_dir, &["clone", "--bare", url])?;
        Ok(())
    }

    /// `git fetch --all` then `git pull --all`.
    pub fn fetch_and_pull(&self, dir: &Path) -> Result<()> {
        self.run(dir, &["fetch", "--all"])?;
        self.run(dir, &["pull", "--all"])?;
        Ok(())
    }

    pub fn checkout(&self, dir: &Path, branch: &str) -> Result<()> {
        debug!(dir = %dir.display(), branch, "Checking out");
        self.run(dir, &["checkout", branch])?;
        Ok(())
    }

    /// `git add .` and commit; an empty commit is not an error.
    pub fn commit_all(&self, dir: &Path, message: &str) -> Result<CommitOutcome> {
        self.run(dir, &["add", "."])?;
        let output = self
            .runner
            .run(&Invocation::new("git", ["commit", "-m", message]).in_dir(dir))?;

        if output.combined().contains(NOTHING_TO_COMMIT) {
            info!(dir = %dir.display(), "Nothing to commit");
            return Ok(CommitOutcome::NothingToCommit);
        }
        if !output.success {
            return Err(MigrationError::CommandFailed {
                command: "git commit".to_string(),
                output: output.combined(),
            });
        }
        Ok(CommitOutcome::Committed)
    }

    pub fn push(&self, dir: &Path) -> Result<()> {
        self.run(dir, &["push"])?;
        Ok(())
    }

    /// `git push --mirror <url>`.
    pub fn push_mirror(&self, dir: &Path, url: &str) -> Result<()> {
        self.run(dir, &["push", "--mirror", url])?;
        Ok(())
    }

    pub fn remote_url(&self, dir: &Path, remote: &str) -> Result<String> {
        let key = format!("remote.{remote}.url");
        let output = self.run(dir, &["config", "--get", &key])?;
        Ok(output.stdout.trim().to_string())
    }

    pub fn set_remote_url(&self, dir: &Path, remote: &str, url: &str) -> Result<()> {
        self.run(dir, &["remote", "set-url", remote, url])?;
        Ok(())
    }

    /// True when a local branch of that name exists.
    pub fn has_local_branch(&self, dir: &Path, branch: &str) -> Result<bool> {
        let reference = format!("refs/heads/{branch}");
        let output = self.runner.run(
            &Invocation::new("git", ["rev-parse", "--verify", "--quiet", reference.as_str()])
                .in_dir(dir),
        )?;
        Ok(output.success)
    }

    /// Run arbitrary git arguments in `dir`, failing on non-zero exit.
    pub fn raw(&self, dir: &Path, args: &[&str]) -> Result<String> {
        let output = self.run(dir, args)?;
        Ok(output.stdout.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::testing::ScriptedRunner;

    #[test]
    fn test_clone_existing_directory_is_success() {
        let runner = ScriptedRunner::new().respond(
            "git clone",
            CommandOutput::failed("fatal: destination path 'app' already exists and is not an empty directory."),
        );
        let outcome = Git::new(&runner)
            .clone_repo("https://h/dev/app.git", Path::new("/tmp/app"))
            .unwrap();
        assert_eq!(outcome, CloneOutcome::AlreadyPresent);
    }

    #[test]
    fn test_clone_failure() {
        let runner =
            ScriptedRunner::new().respond("git clone", CommandOutput::failed("fatal: auth"));
        let result = Git::new(&runner).clone_repo("u", Path::new("/tmp/x"));
        assert!(matches!(result, Err(MigrationError::CommandFailed { .. })));
    }

    #[test]
    fn test_commit_nothing_to_commit() {
        let runner = ScriptedRunner::new().respond(
            "git commit",
            CommandOutput {
                success: false,
                stdout: "On branch main\nnothing to commit, working tree clean".into(),
                stderr: String::new(),
            },
        );
        let outcome = Git::new(&runner)
            .commit_all(Path::new("/repo"), "msg")
            .unwrap();
        assert_eq!(outcome, CommitOutcome::NothingToCommit);
        assert_eq!(runner.commands(), ["git add .", "git commit -m msg"]);
    }

    #[test]
    fn test_remote_url_trims() {
        let runner = ScriptedRunner::new()
            .respond("git config", CommandOutput::ok("https://h/dev/app.git\n"));
        let url = Git::new(&runner)
            .remote_url(Path::new("/repo"), "origin")
            .unwrap();
        assert_eq!(url, "https://h/dev/app.git");
    }

    #[test]
    fn test_has_local_branch() {
        let runner = ScriptedRunner::new().respond("git rev-parse", CommandOutput::failed(""));
        assert!(!Git::new(&runner)
            .has_local_branch(Path::new("/repo"), "master")
            .unwrap());
    }
}
