//! Machine provider gateway over the `docker-machine` CLI.
//!
//! The [`MachineProvider`] trait is the only path orchestration code uses to
//! create machines, destroy them, and fetch connection environments, so the
//! whole provisioning flow can be exercised against scripted providers in
//! tests. [`DockerMachine`] is the real adapter; it issues exactly one
//! external invocation per call and never retries.

use std::ffi::OsString;
use std::fmt;
use std::future::Future;
use std::pin::Pin;

use thiserror::Error;

use crate::exec::{CommandOutput, CommandRunner, ExecError};

mod options;

pub use options::{MachineOptions, SwarmMembership};


/// Role a machine plays within the cluster.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NodeRole {
    /// Standalone consul service-discovery box.
    Discovery,
    /// Swarm master running the Spark master workload.
    Master,
    /// Swarm worker running Spark executors.
    Worker,
}

/// Lifecycle state of a machine as observed by this tool.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NodeState {
    /// The provider accepted the create request; the instance may still be
    /// booting.
    Provisioning,
    /// Provisioning failed or the instance never became ready.
    Failed,
    /// The machine was torn down.
    Destroyed,
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Provisioning => "provisioning",
            Self::Failed => "failed",
            Self::Destroyed => "destroyed",
        };
        // `pad` keeps width specifiers working for tabular output.
        f.pad(text)
    }
}

/// Handle for a machine owned by an orchestrator run.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NodeHandle {
    /// Machine name as known to the provider and the cloud inventory.
    pub name: String,
    /// Role the machine plays in the cluster.
    pub role: NodeRole,
    /// Last observed lifecycle state.
    pub state: NodeState,
}

/// Which daemon a connection environment targets.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ConnectionScope {
    /// The machine's own Docker daemon.
    Machine,
    /// The swarm endpoint exposed by the master.
    Swarm,
}

/// Raw connection environment script for a machine.
///
/// The script is the `export VAR=value` output of `docker-machine env` and
/// carries the endpoint and TLS material needed to target the daemon.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ConnectionConfig {
    /// Shell export script exactly as emitted by the provider.
    pub script: String,
}

/// Errors raised by machine providers.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ProviderError {
    /// Raised when `docker-machine` exits with a non-zero status.
    #[error("docker-machine {action} for {name} exited with status {status_text}: {stderr}")]
    CommandFailure {
        /// Operation that was attempted.
        action: &'static str,
        /// Machine the operation targeted.
        name: String,
        /// Exit status as reported by the OS.
        status: Option<i32>,
        /// Human readable representation of the exit status.
        status_text: String,
        /// Stderr captured from the process.
        stderr: String,
    },
    /// Raised when the `docker-machine` process cannot be started.
    #[error("docker-machine {action} for {name} could not start")]
    Exec {
        /// Operation that was attempted.
        action: &'static str,
        /// Machine the operation targeted.
        name: String,
        /// Underlying spawn failure.
        #[source]
        source: ExecError,
    },
}

/// Future returned by provider operations.
pub type ProviderFuture<'a, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'a>>;

/// Minimal interface implemented by machine provisioning backends.
pub trait MachineProvider {
    /// Provider specific error type returned by the backend.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Creates a machine and returns its handle in the provisioning state.
    ///
    /// Exactly one create request is issued; failures surface unmodified and
    /// are never retried here.
    fn create_machine<'a>(
        &'a self,
        name: &'a str,
        options: &'a MachineOptions,
    ) -> ProviderFuture<'a, NodeHandle, Self::Error>;

    /// Destroys a machine. Destroying a machine that does not exist succeeds.
    fn destroy_machine<'a>(&'a self, name: &'a str) -> ProviderFuture<'a, (), Self::Error>;

    /// Fetches the connection environment script for a machine.
    fn connection_config<'a>(
        &'a self,
        name: &'a str,
        scope: ConnectionScope,
    ) -> ProviderFuture<'a, ConnectionConfig, Self::Error>;
}

/// Real provider adapter shelling out to the `docker-machine` CLI.
#[derive(Clone, Debug)]
pub struct DockerMachine<R: CommandRunner> {
    bin: String,
    runner: R,
}

impl<R: CommandRunner> DockerMachine<R> {
    /// Creates an adapter using the given executable path and runner.
    #[must_use]
    pub const fn new(bin: String, runner: R) -> Self {
        Self { bin, runner }
    }

    async fn run_machine(
        &self,
        action: &'static str,
        name: &str,
        args: Vec<OsString>,
    ) -> Result<CommandOutput, ProviderError> {
        self.runner
            .run(&self.bin, &args, None)
            .await
            .map_err(|source| ProviderError::Exec {
                action,
                name: name.to_owned(),
                source,
            })
    }
}

fn command_failure(action: &'static str, name: &str, output: CommandOutput) -> ProviderError {
    let status_text = output
        .code
        .map_or_else(|| String::from("unknown"), |code| code.to_string());
    ProviderError::CommandFailure {
        action,
        name: name.to_owned(),
        status: output.code,
        status_text,
        stderr: output.stderr,
    }
}

impl<R: CommandRunner + Send + Sync> MachineProvider for DockerMachine<R> {
    type Error = ProviderError;

    fn create_machine<'a>(
        &'a self,
        name: &'a str,
        options: &'a MachineOptions,
    ) -> ProviderFuture<'a, NodeHandle, Self::Error> {
        Box::pin(async move {
            let mut args = vec![OsString::from("create")];
            args.extend(options.to_args());
            args.push(OsString::from(name));

            let output = self.run_machine("create", name, args).await?;
            if !output.is_success() {
                return Err(command_failure("create", name, output));
            }

            Ok(NodeHandle {
                name: name.to_owned(),
                role: options.role(),
                state: NodeState::Provisioning,
            })
        })
    }

    fn destroy_machine<'a>(&'a self, name: &'a str) -> ProviderFuture<'a, (), Self::Error> {
        Box::pin(async move {
            let args = vec![
                OsString::from("rm"),
                OsString::from("-y"),
                OsString::from(name),
            ];

            let output = self.run_machine("remove", name, args).await?;
            // Removing an absent machine is a success for teardown purposes.
            if !output.is_success() && !output.stderr.contains("does not exist") {
                return Err(command_failure("remove", name, output));
            }

            Ok(())
        })
    }

    fn connection_config<'a>(
        &'a self,
        name: &'a str,
        scope: ConnectionScope,
    ) -> ProviderFuture<'a, ConnectionConfig, Self::Error> {
        Box::pin(async move {
            let mut args = vec![
                OsString::from("env"),
                OsString::from("--shell"),
                OsString::from("sh"),
            ];
            if matches!(scope, ConnectionScope::Swarm) {
                args.push(OsString::from("--swarm"));
            }
            args.push(OsString::from(name));

            let output = self.run_machine("env", name, args).await?;
            if !output.is_success() {
                return Err(command_failure("env", name, output));
            }

            Ok(ConnectionConfig {
                script: output.stdout,
            })
        })
    }
}
