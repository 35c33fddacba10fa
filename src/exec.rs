//! Process execution boundary shared by every collaborator CLI adapter.
//!
//! All external invocations (`docker-machine`, `docker-compose`, `docker`,
//! `aws`) flow through the [`CommandRunner`] trait so orchestration code can
//! be exercised against scripted runners in tests. Cluster-targeted
//! invocations replace the child environment wholesale rather than layering
//! variables onto the parent process.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::future::Future;
use std::pin::Pin;

use thiserror::Error;
use tokio::process::Command;

/// Environment passed verbatim to a child process.
pub type EnvMap = BTreeMap<String, String>;

/// Result of running an external command.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandOutput {
    /// Exit code reported by the process, if available.
    pub code: Option<i32>,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl CommandOutput {
    /// Returns `true` when the exit code equals zero.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.code, Some(0))
    }
}

/// Errors raised when a command cannot be executed at all.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ExecError {
    /// Raised when the child process cannot be started.
    #[error("failed to spawn {program}: {message}")]
    Spawn {
        /// Program that failed to start.
        program: String,
        /// Operating system error message.
        message: String,
    },
}

/// Future returned by command runner operations.
pub type RunnerFuture<'a> =
    Pin<Box<dyn Future<Output = Result<CommandOutput, ExecError>> + Send + 'a>>;

/// Abstraction over asynchronous command execution to support fakes in tests.
pub trait CommandRunner {
    /// Runs `program` with the given arguments, capturing stdout and stderr.
    ///
    /// When `env` is provided it becomes the child's entire environment;
    /// when absent the child inherits from the parent process.
    ///
    /// # Errors
    ///
    /// Returns [`ExecError::Spawn`] if the command cannot be started.
    fn run<'a>(
        &'a self,
        program: &'a str,
        args: &'a [OsString],
        env: Option<&'a EnvMap>,
    ) -> RunnerFuture<'a>;
}

/// Real command runner that shells out to the host operating system.
#[derive(Clone, Debug, Default)]
pub struct ProcessCommandRunner;

impl CommandRunner for ProcessCommandRunner {
    fn run<'a>(
        &'a self,
        program: &'a str,
        args: &'a [OsString],
        env: Option<&'a EnvMap>,
    ) -> RunnerFuture<'a> {
        Box::pin(async move {
            let mut command = Command::new(program);
            command.args(args);
            if let Some(vars) = env {
                command.env_clear().envs(vars);
            }
            let output = command.output().await.map_err(|err| ExecError::Spawn {
                program: program.to_owned(),
                message: err.to_string(),
            })?;

            Ok(CommandOutput {
                code: output.status.code(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            })
        })
    }
}
