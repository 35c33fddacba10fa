//! Cluster provisioning state machine.
//!
//! A `create_cluster` run resolves the discovery endpoint, brings up the
//! master and its workload, fans out worker creation, and scales the compose
//! services to the number of workers that actually came up. Master-path
//! failures abort the run. Worker failures are captured per worker and never
//! cancel their siblings. Failed runs leave created machines in place for
//! operator cleanup.

use camino::Utf8PathBuf;
use futures::future::join_all;
use thiserror::Error;

use crate::config::MASTER_WEB_UI_PORT;
use crate::consul::{ConsulBoxRequest, DiscoveryEndpoint, agent_container_spec};
use crate::exec::{CommandRunner, EnvMap};
use crate::inventory::InstanceInventory;
use crate::machine::{
    ConnectionScope, MachineOptions, MachineProvider, NodeHandle, NodeRole, NodeState,
    SwarmMembership,
};
use crate::report::Reporter;
use crate::resolver::{AddressKind, AddressResolver, ResolutionError};
use crate::runtime::{ContainerRuntime, RuntimeError};
use crate::smoke::{SmokeTestRunner, SubmitError};
use crate::swarm::{EnvironmentError, build_environment};


/// Compose service that runs the Spark master.
const MASTER_SERVICE: &str = "master";

/// Immutable description of the cluster a run should create.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ClusterSpec {
    /// Name prefix for the master and worker machines.
    pub prefix: String,
    /// Number of worker machines to request.
    pub worker_count: usize,
    /// EC2 security group for the master and workers.
    pub security_group: String,
    /// EC2 instance type for the master node.
    pub master_instance_type: String,
    /// EC2 instance type for worker nodes.
    pub worker_instance_type: String,
    /// Bid price (USD per hour) for worker spot requests.
    pub worker_spot_price: String,
    /// Network interface each engine advertises to the cluster store.
    pub network_interface: String,
    /// Discovery node machine name or `IPv4[:port]` literal.
    pub discovery_address: String,
    /// Compose file describing the master and worker services.
    pub compose_file: Utf8PathBuf,
}

impl ClusterSpec {
    /// Starts a builder for a [`ClusterSpec`].
    #[must_use]
    pub fn builder() -> ClusterSpecBuilder {
        ClusterSpecBuilder::new()
    }

    /// Validates the spec, returning a descriptive error when a field is
    /// missing or malformed.
    ///
    /// # Errors
    ///
    /// Returns [`SpecError::MissingField`] when a required field is empty and
    /// [`SpecError::InvalidSpotPrice`] when the bid price is not a plain
    /// decimal amount.
    pub fn validate(&self) -> Result<(), SpecError> {
        Self::require(&self.prefix, "prefix")?;
        Self::require(&self.security_group, "security_group")?;
        Self::require(&self.master_instance_type, "master_instance_type")?;
        Self::require(&self.worker_instance_type, "worker_instance_type")?;
        Self::require(&self.network_interface, "network_interface")?;
        Self::require(&self.discovery_address, "discovery_address")?;
        Self::require(self.compose_file.as_str(), "compose_file")?;
        if !is_decimal_amount(&self.worker_spot_price) {
            return Err(SpecError::InvalidSpotPrice(self.worker_spot_price.clone()));
        }
        Ok(())
    }

    const fn require(value: &str, field: &'static str) -> Result<(), SpecError> {
        if value.is_empty() {
            return Err(SpecError::MissingField(field));
        }
        Ok(())
    }
}

/// Builder for [`ClusterSpec`] that defers trimming and validation to
/// construction.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ClusterSpecBuilder {
    prefix: String,
    worker_count: usize,
    security_group: String,
    master_instance_type: String,
    worker_instance_type: String,
    worker_spot_price: String,
    network_interface: String,
    discovery_address: String,
    compose_file: Utf8PathBuf,
}

impl ClusterSpecBuilder {
    /// Creates an empty builder; fields must be populated before build.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the machine name prefix.
    #[must_use]
    pub fn prefix(mut self, value: impl Into<String>) -> Self {
        self.prefix = value.into();
        self
    }

    /// Sets the number of workers to request.
    #[must_use]
    pub const fn worker_count(mut self, value: usize) -> Self {
        self.worker_count = value;
        self
    }

    /// Sets the security group.
    #[must_use]
    pub fn security_group(mut self, value: impl Into<String>) -> Self {
        self.security_group = value.into();
        self
    }

    /// Sets the master instance type.
    #[must_use]
    pub fn master_instance_type(mut self, value: impl Into<String>) -> Self {
        self.master_instance_type = value.into();
        self
    }

    /// Sets the worker instance type.
    #[must_use]
    pub fn worker_instance_type(mut self, value: impl Into<String>) -> Self {
        self.worker_instance_type = value.into();
        self
    }

    /// Sets the worker spot bid price.
    #[must_use]
    pub fn worker_spot_price(mut self, value: impl Into<String>) -> Self {
        self.worker_spot_price = value.into();
        self
    }

    /// Sets the advertised network interface.
    #[must_use]
    pub fn network_interface(mut self, value: impl Into<String>) -> Self {
        self.network_interface = value.into();
        self
    }

    /// Sets the discovery node name or address literal.
    #[must_use]
    pub fn discovery_address(mut self, value: impl Into<String>) -> Self {
        self.discovery_address = value.into();
        self
    }

    /// Sets the compose file path.
    #[must_use]
    pub fn compose_file(mut self, value: impl Into<Utf8PathBuf>) -> Self {
        self.compose_file = value.into();
        self
    }

    /// Builds and validates the [`ClusterSpec`], trimming string inputs.
    ///
    /// # Errors
    ///
    /// Returns [`SpecError`] when a required field is empty or the spot price
    /// is not a plain decimal amount.
    pub fn build(self) -> Result<ClusterSpec, SpecError> {
        let spec = ClusterSpec {
            prefix: self.prefix.trim().to_owned(),
            worker_count: self.worker_count,
            security_group: self.security_group.trim().to_owned(),
            master_instance_type: self.master_instance_type.trim().to_owned(),
            worker_instance_type: self.worker_instance_type.trim().to_owned(),
            worker_spot_price: self.worker_spot_price.trim().to_owned(),
            network_interface: self.network_interface.trim().to_owned(),
            discovery_address: self.discovery_address.trim().to_owned(),
            compose_file: self.compose_file,
        };
        spec.validate()?;
        Ok(spec)
    }
}

/// Errors raised while validating a [`ClusterSpec`].
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum SpecError {
    /// Raised when a required field is missing or empty.
    #[error("missing or empty field: {0}")]
    MissingField(&'static str),
    /// Raised when the spot price is not a plain decimal amount.
    #[error("worker spot price must be a decimal amount, got {0:?}")]
    InvalidSpotPrice(String),
}

/// Outcome of one worker provisioning request.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct WorkerOutcome<E> {
    /// Handle for the worker machine, failed or not.
    pub handle: NodeHandle,
    /// Provisioning result for this worker alone.
    pub outcome: Result<(), E>,
}

/// Terminal result of a successful `create_cluster` run.
///
/// `workers` always holds one entry per requested worker, in request order,
/// regardless of completion order or individual failures.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ClusterResult<E> {
    /// Public DNS address of the master node.
    pub master_address: String,
    /// Per-worker outcomes in worker index order.
    pub workers: Vec<WorkerOutcome<E>>,
}

impl<E> ClusterResult<E> {
    /// Number of workers that were provisioned successfully.
    #[must_use]
    pub fn running_workers(&self) -> usize {
        observed_workers(&self.workers)
    }

    /// Returns `true` when at least one worker failed to provision.
    #[must_use]
    pub fn has_worker_failures(&self) -> bool {
        self.workers.iter().any(|worker| worker.outcome.is_err())
    }
}

/// Errors surfaced by orchestrator operations.
#[derive(Debug, Error)]
pub enum ClusterError<PE, IE>
where
    PE: std::error::Error + 'static,
    IE: std::error::Error + 'static,
{
    /// Raised when the discovery node name cannot be resolved to an address.
    #[error("failed to resolve discovery node {address}")]
    Discovery {
        /// Discovery machine name that was being resolved.
        address: String,
        /// Underlying resolution failure.
        #[source]
        source: ResolutionError<IE>,
    },
    /// Raised when creating the master machine fails.
    #[error("failed to create master {name}")]
    Master {
        /// Master machine name.
        name: String,
        /// Provider-specific error.
        #[source]
        source: PE,
    },
    /// Raised when the swarm connection environment cannot be built.
    #[error("failed to build connection environment")]
    Environment(#[source] EnvironmentError<PE>),
    /// Raised when starting the master workload fails.
    #[error("failed to start the master workload")]
    MasterWorkload(#[source] RuntimeError),
    /// Raised when the master address cannot be resolved after the workload
    /// came up.
    #[error("failed to resolve the address of master {name}")]
    MasterAddress {
        /// Master machine name.
        name: String,
        /// Underlying resolution failure.
        #[source]
        source: ResolutionError<IE>,
    },
    /// Raised when scaling the compose services fails.
    #[error("failed to scale cluster services")]
    Scale(#[source] RuntimeError),
    /// Raised when the smoke test workload cannot be submitted or fails.
    #[error("smoke test submission failed")]
    Submit(#[source] SubmitError),
    /// Raised when destroying a machine fails.
    #[error("failed to destroy machine {name}")]
    Destroy {
        /// Machine name that was being destroyed.
        name: String,
        /// Provider-specific error.
        #[source]
        source: PE,
    },
    /// Raised when creating the discovery box machine fails.
    #[error("failed to create discovery box {name}")]
    DiscoveryNode {
        /// Discovery box machine name.
        name: String,
        /// Provider-specific error.
        #[source]
        source: PE,
    },
    /// Raised when the consul agent container cannot be started.
    #[error("failed to start the consul agent container")]
    AgentContainer(#[source] RuntimeError),
    /// Raised when the discovery box address cannot be resolved.
    #[error("failed to resolve the address of discovery box {name}")]
    DiscoveryAddress {
        /// Discovery box machine name.
        name: String,
        /// Underlying resolution failure.
        #[source]
        source: ResolutionError<IE>,
    },
}

/// Drives cluster provisioning through the injected collaborators.
#[derive(Debug)]
pub struct ClusterOrchestrator<P, I, R, T>
where
    R: CommandRunner,
{
    provider: P,
    resolver: AddressResolver<I>,
    runtime: ContainerRuntime<R>,
    smoke: SmokeTestRunner<R>,
    reporter: T,
    ambient: EnvMap,
}

impl<P, I, R, T> ClusterOrchestrator<P, I, R, T>
where
    P: MachineProvider,
    I: InstanceInventory,
    R: CommandRunner,
    T: Reporter,
{
    /// Creates an orchestrator, snapshotting the ambient environment.
    #[must_use]
    pub fn new(
        provider: P,
        resolver: AddressResolver<I>,
        runtime: ContainerRuntime<R>,
        smoke: SmokeTestRunner<R>,
        reporter: T,
    ) -> Self {
        Self {
            provider,
            resolver,
            runtime,
            smoke,
            reporter,
            ambient: std::env::vars().collect(),
        }
    }

    /// Overrides the ambient environment snapshot.
    ///
    /// This is primarily used by tests to keep runs hermetic.
    #[must_use]
    pub fn with_ambient(mut self, ambient: EnvMap) -> Self {
        self.ambient = ambient;
        self
    }

    /// Provisions a cluster per the given spec.
    ///
    /// The master path is all-or-nothing; a failure on any master phase
    /// aborts the run before workers are attempted. Worker creation requests
    /// run concurrently and their failures are captured per worker in the
    /// result. The final scale step targets the observed number of healthy
    /// workers, not the requested count.
    ///
    /// # Errors
    ///
    /// Returns [`ClusterError`] for the first fatal phase failure. Machines
    /// created before the failure are left in place.
    pub async fn create_cluster(
        &self,
        spec: &ClusterSpec,
    ) -> Result<ClusterResult<P::Error>, ClusterError<P::Error, I::Error>> {
        self.reporter.emit(&format!(
            "Creating a spark cluster with {} workers...",
            spec.worker_count
        ));

        let endpoint = self.discovery_endpoint(&spec.discovery_address).await?;
        let swarm = SwarmMembership {
            discovery_url: endpoint.url(),
            advertise_interface: spec.network_interface.clone(),
        };

        let master = master_name(&spec.prefix);
        let master_options = MachineOptions::master(
            spec.security_group.as_str(),
            spec.master_instance_type.as_str(),
            swarm.clone(),
        );
        let handle = self
            .provider
            .create_machine(&master, &master_options)
            .await
            .map_err(|source| ClusterError::Master {
                name: master.clone(),
                source,
            })?;
        self.reporter.emit(&format!("Created master {}", handle.name));

        let environment = build_environment(
            &self.provider,
            &self.ambient,
            &master,
            ConnectionScope::Swarm,
        )
        .await
        .map_err(ClusterError::Environment)?;

        self.runtime
            .compose_up(&spec.compose_file, &environment, MASTER_SERVICE)
            .await
            .map_err(ClusterError::MasterWorkload)?;

        let master_address = self
            .resolver
            .resolve(&master, AddressKind::Public)
            .await
            .map_err(|source| ClusterError::MasterAddress {
                name: master.clone(),
                source,
            })?;
        self.reporter.emit(&format!(
            "Master node up. You can test by going to http://{master_address}:{MASTER_WEB_UI_PORT}"
        ));

        self.reporter
            .emit(&format!("Bringing up {} workers...", spec.worker_count));
        let workers = self.create_workers(spec, &swarm).await;
        let observed = observed_workers(&workers);

        self.reporter.emit("Adding workers to swarm...");
        self.runtime
            .compose_scale(&spec.compose_file, &environment, 1, observed)
            .await
            .map_err(ClusterError::Scale)?;

        Ok(ClusterResult {
            master_address,
            workers,
        })
    }

    /// Destroys a single machine and returns its terminal handle.
    ///
    /// Destroying a machine that does not exist succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`ClusterError::Destroy`] when the provider reports a failure
    /// other than the machine being absent.
    pub async fn destroy_machine(
        &self,
        name: &str,
        role: NodeRole,
    ) -> Result<NodeHandle, ClusterError<P::Error, I::Error>> {
        self.provider
            .destroy_machine(name)
            .await
            .map_err(|source| ClusterError::Destroy {
                name: name.to_owned(),
                source,
            })?;
        Ok(NodeHandle {
            name: name.to_owned(),
            role,
            state: NodeState::Destroyed,
        })
    }

    /// Submits the smoke test workload against an existing cluster.
    ///
    /// # Errors
    ///
    /// Returns [`ClusterError::Environment`] when the master environment
    /// cannot be derived and [`ClusterError::Submit`] when the submission
    /// fails.
    pub async fn smoke_test(
        &self,
        prefix: &str,
    ) -> Result<String, ClusterError<P::Error, I::Error>> {
        let master = master_name(prefix);
        self.reporter.emit(&format!("Submitting job to {master}"));
        let environment = build_environment(
            &self.provider,
            &self.ambient,
            &master,
            ConnectionScope::Swarm,
        )
        .await
        .map_err(ClusterError::Environment)?;
        self.smoke
            .submit(&environment)
            .await
            .map_err(ClusterError::Submit)
    }

    /// Brings up a consul discovery box and returns its endpoint.
    ///
    /// Creates the machine, starts the consul agent container against the
    /// box's own daemon, and resolves the private address operators pass to
    /// cluster creation.
    ///
    /// # Errors
    ///
    /// Returns [`ClusterError::DiscoveryNode`], [`ClusterError::Environment`],
    /// [`ClusterError::AgentContainer`], or [`ClusterError::DiscoveryAddress`]
    /// for the phase that failed.
    pub async fn create_discovery_node(
        &self,
        request: &ConsulBoxRequest,
    ) -> Result<DiscoveryEndpoint, ClusterError<P::Error, I::Error>> {
        let options = MachineOptions::discovery(
            request.security_group.as_str(),
            request.instance_type.as_str(),
        );
        let handle = self
            .provider
            .create_machine(&request.instance_name, &options)
            .await
            .map_err(|source| ClusterError::DiscoveryNode {
                name: request.instance_name.clone(),
                source,
            })?;
        self.reporter
            .emit(&format!("Created discovery box {}", handle.name));

        let environment = build_environment(
            &self.provider,
            &self.ambient,
            &request.instance_name,
            ConnectionScope::Machine,
        )
        .await
        .map_err(ClusterError::Environment)?;
        self.runtime
            .run_detached(&environment, &agent_container_spec())
            .await
            .map_err(ClusterError::AgentContainer)?;

        let host = self
            .resolver
            .resolve(&request.instance_name, AddressKind::Private)
            .await
            .map_err(|source| ClusterError::DiscoveryAddress {
                name: request.instance_name.clone(),
                source,
            })?;
        let endpoint = DiscoveryEndpoint::with_default_port(host);
        self.reporter
            .emit(&format!("Consul box successfully created at {endpoint}"));
        Ok(endpoint)
    }

    async fn discovery_endpoint(
        &self,
        address: &str,
    ) -> Result<DiscoveryEndpoint, ClusterError<P::Error, I::Error>> {
        // Address literals short-circuit resolution entirely.
        if let Some(endpoint) = DiscoveryEndpoint::parse_literal(address) {
            self.reporter
                .emit(&format!("Using discovery address {endpoint}"));
            return Ok(endpoint);
        }

        let host = self
            .resolver
            .resolve(address, AddressKind::Private)
            .await
            .map_err(|source| ClusterError::Discovery {
                address: address.to_owned(),
                source,
            })?;
        let endpoint = DiscoveryEndpoint::with_default_port(host);
        self.reporter
            .emit(&format!("Resolved discovery node {address} to {endpoint}"));
        Ok(endpoint)
    }

    async fn create_workers(
        &self,
        spec: &ClusterSpec,
        swarm: &SwarmMembership,
    ) -> Vec<WorkerOutcome<P::Error>> {
        let shared_options = MachineOptions::worker(
            spec.security_group.as_str(),
            spec.worker_instance_type.as_str(),
            spec.worker_spot_price.as_str(),
            swarm.clone(),
        );
        let creations = (0..spec.worker_count).map(|index| {
            let name = worker_name(&spec.prefix, index);
            let options = &shared_options;
            async move {
                match self.provider.create_machine(&name, options).await {
                    Ok(handle) => WorkerOutcome {
                        handle,
                        outcome: Ok(()),
                    },
                    Err(source) => WorkerOutcome {
                        handle: NodeHandle {
                            name,
                            role: NodeRole::Worker,
                            state: NodeState::Failed,
                        },
                        outcome: Err(source),
                    },
                }
            }
        });
        join_all(creations).await
    }
}

fn master_name(prefix: &str) -> String {
    format!("{prefix}-master")
}

fn worker_name(prefix: &str, index: usize) -> String {
    format!("{prefix}-worker-{index}")
}

fn observed_workers<E>(workers: &[WorkerOutcome<E>]) -> usize {
    workers
        .iter()
        .filter(|worker| worker.outcome.is_ok())
        .count()
}

fn is_decimal_amount(value: &str) -> bool {
    let mut seen_digit = false;
    let mut seen_dot = false;
    for ch in value.chars() {
        if ch.is_ascii_digit() {
            seen_digit = true;
        } else if ch == '.' && !seen_dot {
            seen_dot = true;
        } else {
            return false;
        }
    }
    seen_digit
}
