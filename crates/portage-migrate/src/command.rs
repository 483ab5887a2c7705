//! External command execution.
//!
//! Everything that shells out (docker, git) goes through [`CommandRunner`]
//! so the sequencing logic can be tested without the real tools.

use crate::error::{MigrationError, Result};

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::debug;

/// A command to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub dir: Option<PathBuf>,
    /// Written to stdin, never logged.
    pub stdin: Option<String>,
}

impl Invocation {
    pub fn new<I, S>(program: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.to_string(),
            args: args.into_iter().map(Into::into).collect(),
            dir: None,
            stdin: None,
        }
    }

    /// Run inside `dir`.
    pub fn in_dir(mut self, dir: &Path) -> Self {
        self.dir = Some(dir.to_path_buf());
        self
    }

    /// Feed `input` on stdin.
    pub fn with_stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    /// `program arg arg ...`, for logs and errors.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Captured result of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// A successful result with the given stdout.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// A failed result with the given stderr.
    pub fn failed(stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// stdout followed by stderr, trimmed.
    pub fn combined(&self) -> String {
        let mut out = self.stdout.trim().to_string();
        let err = self.stderr.trim();
        if !err.is_empty() {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(err);
        }
        out
    }
}

/// Runs external commands to completion.
pub trait CommandRunner {
    /// Run the command and capture its output. A non-zero exit is not an
    /// `Err`; only failing to start the process is.
    fn run(&self, invocation: &Invocation) -> Result<CommandOutput>;

    /// Run and turn a non-zero exit into [`MigrationError::CommandFailed`].
    fn run_checked(&self, invocation: &Invocation) -> Result<CommandOutput> {
        let output = self.run(invocation)?;
        if output.success {
            Ok(output)
        } else {
            Err(MigrationError::CommandFailed {
                command: invocation.display(),
                output: output.combined(),
            })
        }
    }
}

/// Runs commands with [`std::process::Command`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, invocation: &Invocation) -> Result<CommandOutput> {
        debug!(
            command = %invocation.display(),
            dir = ?invocation.dir,
            "Running command"
        );

        let mut command = Command::new(&invocation.program);
        command.args(&invocation.args);
        if let Some(dir) = &invocation.dir {
            command.current_dir(dir);
        }

        let output = match &invocation.stdin {
            Some(input) => {
                let mut child = command
                    .stdin(Stdio::piped())
                    .stdout(Stdio::piped())
                    .stderr(Stdio::piped())
                    .spawn()?;
                if let Some(mut stdin) = child.stdin.take() {
                    stdin.write_all(input.as_bytes())?;
                }
                child.wait_with_output()?
            }
            None => command.output()?,
        };

        let result = CommandOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        };
        debug!(
            command = %invocation.display(),
            success = result.success,
            output = %result.combined(),
            "Command finished"
        );
        Ok(result)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted runner for tests.

    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;

    /// Replays canned outputs and records every invocation.
    ///
    /// Responses are matched by prefix of `program args...`; unmatched
    /// commands succeed with empty output.
    #[derive(Default)]
    pub struct ScriptedRunner {
        responses: RefCell<Vec<(String, VecDeque<CommandOutput>)>>,
        pub calls: RefCell<Vec<Invocation>>,
    }

    impl ScriptedRunner {
        pub fn new() -> Self {
            Self::default()
        }

        /// Queue `output` for the next command starting with `prefix`.
        pub fn respond(self, prefix: &str, output: CommandOutput) -> Self {
            {
                let mut responses = self.responses.borrow_mut();
                match responses.iter_mut().find(|(p, _)| p == prefix) {
                    Some((_, queue)) => queue.push_back(output),
                    None => responses.push((prefix.to_string(), VecDeque::from([output]))),
                }
            }
            self
        }

        /// Every command line run so far.
        pub fn commands(&self) -> Vec<String> {
            self.calls.borrow().iter().map(Invocation::display).collect()
        }
    }

    impl CommandRunner for ScriptedRunner {
        fn run(&self, invocation: &Invocation) -> Result<CommandOutput> {
            self.calls.borrow_mut().push(invocation.clone());
            let line = invocation.display();
            let mut responses = self.responses.borrow_mut();
            let output = responses
                .iter_mut()
                .find(|(prefix, queue)| line.starts_with(prefix.as_str()) && !queue.is_empty())
                .and_then(|(_, queue)| queue.pop_front())
                .unwrap_or_else(|| CommandOutput::ok(""));
            Ok(output)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let inv = Invocation::new("git", ["checkout", "main"]);
        assert_eq!(inv.display(), "git checkout main");
    }

    #[test]
    fn test_combined_output() {
        let out = CommandOutput {
            success: false,
            stdout: "out\n".into(),
            stderr: "err\n".into(),
        };
        assert_eq!(out.combined(), "out\nerr");
        assert_eq!(CommandOutput::failed("e").combined(), "e");
    }

    #[cfg(unix)]
    #[test]
    fn test_system_runner_captures_output() {
        let out = SystemRunner
            .run(&Invocation::new("sh", ["-c", "echo hi; echo oops >&2; exit 3"]))
            .unwrap();
        assert!(!out.success);
        assert_eq!(out.combined(), "hi\noops");
    }

    #[cfg(unix)]
    #[test]
    fn test_system_runner_stdin() {
        let out = SystemRunner
            .run(&Invocation::new("cat", Vec::<String>::new()).with_stdin("secret"))
            .unwrap();
        assert!(out.success);
        assert_eq!(out.stdout, "secret");
    }

    #[cfg(unix)]
    #[test]
    fn test_run_checked_maps_failure() {
        let err = SystemRunner
            .run_checked(&Invocation::new("sh", ["-c", "echo nope >&2; exit 1"]))
            .unwrap_err();
        match err {
            MigrationError::CommandFailed { command, output } => {
                assert!(command.starts_with("sh -c"));
                assert_eq!(output, "nope");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
