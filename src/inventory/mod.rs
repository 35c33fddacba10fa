//! Cloud inventory adapter over `aws ec2 describe-instances`.
//!
//! `docker-machine` tags EC2 instances with their machine name, so instance
//! existence, lifecycle state, and addressing are queried here by that tag.
//! Existence and state are separate observations: an empty result means the
//! name is unknown, while a known instance may still be booting.

use std::ffi::OsString;
use std::future::Future;
use std::pin::Pin;

use serde::Deserialize;
use thiserror::Error;

use crate::exec::{CommandOutput, CommandRunner, ExecError};


/// Instance state reported by the inventory for a running machine.
pub const RUNNING_STATE: &str = "running";

/// Snapshot of a single instance as reported by the cloud inventory.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InstanceRecord {
    /// Machine name the record was queried by.
    pub name: String,
    /// Lifecycle state name (for example `pending` or `running`).
    pub state: String,
    /// Private IPv4 address, when one is assigned.
    pub private_ip: Option<String>,
    /// Public DNS name, when one is assigned.
    pub public_dns: Option<String>,
}

impl InstanceRecord {
    /// Returns `true` when the instance is in the running state.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state == RUNNING_STATE
    }
}

/// Errors raised by inventory queries.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum InventoryError {
    /// Raised when the `aws` CLI exits with a non-zero status.
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
    /// Raised when the describe-instances JSON cannot be parsed.
    #[error("failed to parse describe-instances output: {message}")]
    Parse {
        /// Parser error message.
        message: String,
    },
    /// Raised when command execution fails.
    #[error(transparent)]
    Runner(#[from] ExecError),
}

/// Future returned by inventory operations.
pub type InventoryFuture<'a, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'a>>;

/// Minimal interface implemented by cloud inventory services.
pub trait InstanceInventory {
    /// Inventory specific error type.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Returns the instance record for `name`, or `None` when the name is
    /// unknown to the inventory.
    fn describe_instance<'a>(
        &'a self,
        name: &'a str,
    ) -> InventoryFuture<'a, Option<InstanceRecord>, Self::Error>;
}

/// Real inventory adapter shelling out to the `aws` CLI.
#[derive(Clone, Debug)]
pub struct AwsCliInventory<R: CommandRunner> {
    bin: String,
    runner: R,
}

impl<R: CommandRunner> AwsCliInventory<R> {
    /// Creates an adapter using the given executable path and runner.
    #[must_use]
    pub const fn new(bin: String, runner: R) -> Self {
        Self { bin, runner }
    }

    fn check_aws_output(&self, output: CommandOutput) -> Result<CommandOutput, InventoryError> {
        if output.is_success() {
            return Ok(output);
        }

        let status_text = output
            .code
            .map_or_else(|| String::from("unknown"), |code| code.to_string());
        Err(InventoryError::CommandFailure {
            program: self.bin.clone(),
            status: output.code,
            status_text,
            stderr: output.stderr,
        })
    }
}

impl<R: CommandRunner + Send + Sync> InstanceInventory for AwsCliInventory<R> {
    type Error = InventoryError;

    fn describe_instance<'a>(
        &'a self,
        name: &'a str,
    ) -> InventoryFuture<'a, Option<InstanceRecord>, Self::Error> {
        Box::pin(async move {
            let args = vec![
                OsString::from("ec2"),
                OsString::from("describe-instances"),
                OsString::from("--filters"),
                OsString::from(format!("Name=tag:Name,Values={name}")),
                OsString::from("--output"),
                OsString::from("json"),
            ];

            let output = self.runner.run(&self.bin, &args, None).await?;
            let stdout = self.check_aws_output(output)?.stdout;

            let response: DescribeInstancesResponse =
                serde_json::from_str(&stdout).map_err(|err| InventoryError::Parse {
                    message: err.to_string(),
                })?;

            let mut instances = response
                .reservations
                .into_iter()
                .flat_map(|reservation| reservation.instances)
                .collect::<Vec<_>>();
            if instances.is_empty() {
                return Ok(None);
            }

            // A recreated machine can leave terminated records under the same
            // name tag; prefer the live one.
            let position = instances
                .iter()
                .position(|instance| instance.state.name == RUNNING_STATE)
                .unwrap_or(0);
            let instance = instances.swap_remove(position);

            Ok(Some(InstanceRecord {
                name: name.to_owned(),
                state: instance.state.name,
                private_ip: instance.private_ip_address.filter(|ip| !ip.is_empty()),
                public_dns: instance.public_dns_name.filter(|dns| !dns.is_empty()),
            }))
        })
    }
}

#[derive(Debug, Deserialize)]
struct DescribeInstancesResponse {
    #[serde(rename = "Reservations", default)]
    reservations: Vec<Reservation>,
}

#[derive(Debug, Deserialize)]
struct Reservation {
    #[serde(rename = "Instances", default)]
    instances: Vec<DescribedInstance>,
}

#[derive(Debug, Deserialize)]
struct DescribedInstance {
    #[serde(rename = "State")]
    state: DescribedState,
    #[serde(rename = "PrivateIpAddress", default)]
    private_ip_address: Option<String>,
    #[serde(rename = "PublicDnsName", default)]
    public_dns_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DescribedState {
    #[serde(rename = "Name")]
    name: String,
}
