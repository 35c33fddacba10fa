//! Core library for the sparkup cluster provisioning tool.
//!
//! The crate wraps the docker-machine, docker, docker-compose, and aws
//! command line tools behind typed adapters and drives them through an
//! orchestrator that brings up an ephemeral Spark cluster on EC2
//! (discovery box → swarm master → spot workers → scaled compose services).

pub mod cluster;
pub mod config;
pub mod consul;
pub mod exec;
pub mod inventory;
pub mod machine;
pub mod report;
pub mod resolver;
pub mod runtime;
pub mod smoke;
pub mod swarm;
pub mod test_support;

pub use cluster::{
    ClusterError, ClusterOrchestrator, ClusterResult, ClusterSpec, ClusterSpecBuilder, SpecError,
    WorkerOutcome,
};
pub use config::{ConfigError, ToolchainConfig};
pub use consul::{ConsulBoxRequest, DiscoveryEndpoint, DiscoveryError};
pub use exec::{CommandOutput, CommandRunner, EnvMap, ExecError, ProcessCommandRunner};
pub use inventory::{AwsCliInventory, InstanceInventory, InstanceRecord, InventoryError};
pub use machine::{
    DockerMachine, MachineOptions, MachineProvider, NodeHandle, NodeRole, NodeState, ProviderError,
    SwarmMembership,
};
pub use report::{ConsoleReporter, NullReporter, Reporter};
pub use resolver::{AddressKind, AddressResolver, ResolutionError};
pub use runtime::{ContainerRuntime, ContainerSpec, RuntimeError};
pub use smoke::{SmokeTestRunner, SubmitError};
pub use swarm::SwarmEnvironment;
