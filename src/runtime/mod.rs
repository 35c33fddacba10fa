//! Container runtime adapter over `docker-compose` and `docker`.
//!
//! All cluster-targeted invocations run under a [`SwarmEnvironment`] passed
//! as the child's entire environment, which is how targeting works with
//! machine-provisioned daemons. One external invocation per call.

use std::ffi::OsString;

use camino::Utf8Path;
use thiserror::Error;

use crate::exec::{CommandOutput, CommandRunner, ExecError};
use crate::swarm::SwarmEnvironment;


/// Parameters for a single `docker run` invocation.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ContainerSpec {
    image: String,
    ports: Vec<String>,
    env: Vec<(String, String)>,
    network: Option<String>,
    entrypoint: Option<String>,
    args: Vec<String>,
}

impl ContainerSpec {
    /// Creates a spec for the given image with no extra options.
    #[must_use]
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            ..Self::default()
        }
    }

    /// Publishes a port mapping (for example `8500:8500/tcp`).
    #[must_use]
    pub fn publish(mut self, mapping: impl Into<String>) -> Self {
        self.ports.push(mapping.into());
        self
    }

    /// Sets a container environment variable.
    #[must_use]
    pub fn env_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Attaches the container to a network (for example `container:master`).
    #[must_use]
    pub fn network(mut self, network: impl Into<String>) -> Self {
        self.network = Some(network.into());
        self
    }

    /// Overrides the image entrypoint.
    #[must_use]
    pub fn entrypoint(mut self, entrypoint: impl Into<String>) -> Self {
        self.entrypoint = Some(entrypoint.into());
        self
    }

    /// Appends a command argument placed after the image name.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    fn to_run_args(&self) -> Vec<OsString> {
        let mut args = Vec::new();
        for mapping in &self.ports {
            args.push(OsString::from("-p"));
            args.push(OsString::from(mapping));
        }
        for (key, value) in &self.env {
            args.push(OsString::from("-e"));
            args.push(OsString::from(format!("{key}={value}")));
        }
        if let Some(ref network) = self.network {
            args.push(OsString::from(format!("--net={network}")));
        }
        if let Some(ref entrypoint) = self.entrypoint {
            args.push(OsString::from("--entrypoint"));
            args.push(OsString::from(entrypoint));
        }
        args.push(OsString::from(&self.image));
        for arg in &self.args {
            args.push(OsString::from(arg));
        }
        args
    }
}

/// Errors raised by container runtime invocations.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum RuntimeError {
    /// Raised when a runtime command exits with a non-zero status.
    #[error("{program} exited with status {status_text}: {stderr}")]
    CommandFailure {
        /// Program that failed.
        program: String,
        /// Exit status reported by the OS.
        status: Option<i32>,
        /// Human readable representation of the exit status.
        status_text: String,
        /// Stderr captured from the command.
        stderr: String,
    },
    /// Raised when the command cannot be started.
    #[error(transparent)]
    Exec(#[from] ExecError),
}

fn command_failure(program: &str, output: CommandOutput) -> RuntimeError {
    let status_text = output
        .code
        .map_or_else(|| String::from("unknown"), |code| code.to_string());
    RuntimeError::CommandFailure {
        program: program.to_owned(),
        status: output.code,
        status_text,
        stderr: output.stderr,
    }
}

/// Adapter for the compose and docker CLIs.
#[derive(Clone, Debug)]
pub struct ContainerRuntime<R: CommandRunner> {
    docker_bin: String,
    compose_bin: String,
    runner: R,
}

impl<R: CommandRunner> ContainerRuntime<R> {
    /// Creates an adapter using the given executable paths and runner.
    #[must_use]
    pub const fn new(docker_bin: String, compose_bin: String, runner: R) -> Self {
        Self {
            docker_bin,
            compose_bin,
            runner,
        }
    }

    /// Starts a compose service in detached mode.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError`] when compose fails or cannot be started.
    pub async fn compose_up(
        &self,
        file: &Utf8Path,
        env: &SwarmEnvironment,
        service: &str,
    ) -> Result<(), RuntimeError> {
        let args = vec![
            OsString::from("-f"),
            OsString::from(file.as_str()),
            OsString::from("up"),
            OsString::from("-d"),
            OsString::from(service),
        ];
        self.run_compose(env, args).await
    }

    /// Scales the master and worker services to the given counts.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError`] when compose fails or cannot be started.
    pub async fn compose_scale(
        &self,
        file: &Utf8Path,
        env: &SwarmEnvironment,
        masters: usize,
        workers: usize,
    ) -> Result<(), RuntimeError> {
        let args = vec![
            OsString::from("-f"),
            OsString::from(file.as_str()),
            OsString::from("scale"),
            OsString::from(format!("master={masters}")),
            OsString::from(format!("worker={workers}")),
        ];
        self.run_compose(env, args).await
    }

    /// Runs a container detached, leaving it up after the call returns.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError`] when docker fails or cannot be started.
    pub async fn run_detached(
        &self,
        env: &SwarmEnvironment,
        spec: &ContainerSpec,
    ) -> Result<(), RuntimeError> {
        let mut args = vec![OsString::from("run"), OsString::from("-d")];
        args.extend(spec.to_run_args());

        let output = self
            .runner
            .run(&self.docker_bin, &args, Some(&env.variables))
            .await?;
        if output.is_success() {
            return Ok(());
        }
        Err(command_failure(&self.docker_bin, output))
    }

    /// Runs a container to completion and returns its raw output.
    ///
    /// The exit status is not checked here; callers interpret the captured
    /// streams.
    ///
    /// # Errors
    ///
    /// Returns [`ExecError`] when docker cannot be started.
    pub async fn run_captured(
        &self,
        env: &SwarmEnvironment,
        spec: &ContainerSpec,
    ) -> Result<CommandOutput, ExecError> {
        let mut args = vec![OsString::from("run"), OsString::from("--rm")];
        args.extend(spec.to_run_args());

        self.runner
            .run(&self.docker_bin, &args, Some(&env.variables))
            .await
    }

    async fn run_compose(
        &self,
        env: &SwarmEnvironment,
        args: Vec<OsString>,
    ) -> Result<(), RuntimeError> {
        let output = self
            .runner
            .run(&self.compose_bin, &args, Some(&env.variables))
            .await?;
        if output.is_success() {
            return Ok(());
        }
        Err(command_failure(&self.compose_bin, output))
    }
}
