//! Structured command execution without a shell.
//!
//! Commands are built as `program + args` and spawned directly through
//! `tokio::process`, so arguments are never re-parsed by a shell. Secret
//! arguments render as `********` whenever a command is displayed or logged.

use std::fmt;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command as ProcessCommand;
use tokio::time::timeout;
use tracing::debug;

use crate::core::secrets::SecretValue;

/// One argument to a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arg {
    Plain(String),
    Secret(SecretValue),
}

/// A program invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub program: String,
    pub args: Vec<Arg>,
}

impl Command {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(Arg::Plain(arg.into()));
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args
            .extend(args.into_iter().map(|a| Arg::Plain(a.into())));
        self
    }

    pub fn secret_arg(mut self, value: &SecretValue) -> Self {
        self.args.push(Arg::Secret(value.clone()));
        self
    }

    /// Arguments with secrets exposed, for spawning only
    pub fn exposed_args(&self) -> Vec<&str> {
        self.args
            .iter()
            .map(|a| match a {
                Arg::Plain(s) => s.as_str(),
                Arg::Secret(s) => s.expose(),
            })
            .collect()
    }

    /// Plain arguments only, with secrets dropped. Handy for matching in tests.
    pub fn plain_args(&self) -> Vec<&str> {
        self.args
            .iter()
            .filter_map(|a| match a {
                Arg::Plain(s) => Some(s.as_str()),
                Arg::Secret(_) => None,
            })
            .collect()
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            match arg {
                Arg::Plain(s) if s.is_empty() || s.contains(char::is_whitespace) => {
                    write!(f, " '{}'", s)?
                }
                Arg::Plain(s) => write!(f, " {}", s)?,
                Arg::Secret(s) => write!(f, " {}", s)?,
            }
        }
        Ok(())
    }
}

/// Captured result of a finished command
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    /// Exit code (None if killed by a signal)
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Convenience constructor for a zero exit with stdout
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Convenience constructor for a failed exit
    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }
}

/// Errors running a command. Rendered messages never contain secrets.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("failed to spawn '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{command}' timed out after {after:?}")]
    Timeout { command: String, after: Duration },

    #[error("'{command}' failed with exit code {code}: {stderr}")]
    Failed {
        command: String,
        code: i32,
        stderr: String,
    },
}

/// Executes structured commands
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run to completion and capture output. A non-zero exit is not an error
    /// at this level; callers decide what an exit code means.
    async fn run(&self, command: &Command, limit: Duration)
        -> Result<CommandOutput, CommandError>;

    /// Run and treat any non-zero exit as an error
    async fn run_checked(
        &self,
        command: &Command,
        limit: Duration,
    ) -> Result<CommandOutput, CommandError> {
        let output = self.run(command, limit).await?;
        if !output.success() {
            return Err(CommandError::Failed {
                command: command.to_string(),
                code: output.code.unwrap_or(-1),
                stderr: output.stderr.trim().to_string(),
            });
        }
        Ok(output)
    }
}

/// Runs commands as child processes of this host
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCommandRunner;

impl SystemCommandRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for SystemCommandRunner {
    async fn run(
        &self,
        command: &Command,
        limit: Duration,
    ) -> Result<CommandOutput, CommandError> {
        debug!(command = %command, "Running command");

        let child = ProcessCommand::new(&command.program)
            .args(command.exposed_args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| CommandError::Spawn {
                command: command.to_string(),
                source,
            })?;

        let output = timeout(limit, child.wait_with_output())
            .await
            .map_err(|_| CommandError::Timeout {
                command: command.to_string(),
                after: limit,
            })?
            .map_err(|source| CommandError::Spawn {
                command: command.to_string(),
                source,
            })?;

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_redacts_secrets() {
        let password = SecretValue::new("hunter2hunter2");
        let command = Command::new("server-ctl")
            .args(["user-create", "admin", "Ops Admin"])
            .secret_arg(&password);

        let shown = command.to_string();
        assert_eq!(shown, "server-ctl user-create admin 'Ops Admin' ********");
        assert!(!format!("{:?}", command).contains("hunter2"));
        assert_eq!(
            command.exposed_args(),
            vec!["user-create", "admin", "Ops Admin", "hunter2hunter2"]
        );
        assert_eq!(command.plain_args(), vec!["user-create", "admin", "Ops Admin"]);
    }

    #[tokio::test]
    async fn test_system_runner_captures_output() {
        let runner = SystemCommandRunner::new();
        let output = runner
            .run(&Command::new("echo").arg("hello"), Duration::from_secs(5))
            .await
            .unwrap();
        assert!(output.success());
        assert_eq!(output.stdout.trim(), "hello");
    }

    #[tokio::test]
    async fn test_arguments_are_not_shell_interpreted() {
        let runner = SystemCommandRunner::new();
        let output = runner
            .run(
                &Command::new("echo").arg("$(id -u); rm -rf /"),
                Duration::from_secs(5),
            )
            .await
            .unwrap();
        assert_eq!(output.stdout.trim(), "$(id -u); rm -rf /");
    }

    #[tokio::test]
    async fn test_run_checked_reports_exit_code() {
        let runner = SystemCommandRunner::new();
        let result = runner
            .run_checked(&Command::new("false"), Duration::from_secs(5))
            .await;
        assert!(matches!(result, Err(CommandError::Failed { code: 1, .. })));
    }

    #[tokio::test]
    async fn test_timeout_is_an_error() {
        let runner = SystemCommandRunner::new();
        let result = runner
            .run(&Command::new("sleep").arg("5"), Duration::from_millis(50))
            .await;
        assert!(matches!(result, Err(CommandError::Timeout { .. })));
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let runner = SystemCommandRunner::new();
        let result = runner
            .run(
                &Command::new("/nonexistent/hostboot-test-binary"),
                Duration::from_secs(5),
            )
            .await;
        assert!(matches!(result, Err(CommandError::Spawn { .. })));
    }
}
