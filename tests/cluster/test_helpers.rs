//! Shared fixtures for cluster provisioning scenarios.

use std::time::Duration;

use rstest::fixture;

use sparkup::test_support::{RecordingReporter, ScriptedRunner, machine_env_script};
use sparkup::{
    AddressResolver, AwsCliInventory, ClusterOrchestrator, ClusterResult, ClusterSpec,
    ContainerRuntime, DiscoveryEndpoint, DockerMachine, ProviderError, SmokeTestRunner, SpecError,
};

/// Public DNS name the scripted inventory reports for the master.
pub const MASTER_PUBLIC_DNS: &str = "ec2-203-0-113-7.compute-1.amazonaws.com";

pub type TestOrchestrator = ClusterOrchestrator<
    DockerMachine<ScriptedRunner>,
    AwsCliInventory<ScriptedRunner>,
    ScriptedRunner,
    RecordingReporter,
>;

/// State threaded through the cluster provisioning steps.
#[derive(Clone, Debug)]
pub struct ClusterContext {
    pub runner: ScriptedRunner,
    pub reporter: RecordingReporter,
    pub discovery: String,
    pub outcome: Option<RunOutcome>,
}

/// Result of the orchestrator operation a scenario exercised.
#[derive(Clone, Debug)]
pub enum RunOutcome {
    Cluster(ClusterResult<ProviderError>),
    Smoke(String),
    Discovery(DiscoveryEndpoint),
    Failure(String),
}

#[fixture]
pub fn cluster_context() -> ClusterContext {
    ClusterContext {
        runner: ScriptedRunner::new(),
        reporter: RecordingReporter::new(),
        discovery: String::from("10.0.0.5:8500"),
        outcome: None,
    }
}

/// Builds an orchestrator over the scripted runner with fast retries and a
/// fixed ambient environment so runs stay hermetic.
pub fn build_orchestrator(
    runner: &ScriptedRunner,
    reporter: &RecordingReporter,
) -> TestOrchestrator {
    let provider = DockerMachine::new(String::from("docker-machine"), runner.clone());
    let resolver = AddressResolver::new(AwsCliInventory::new(String::from("aws"), runner.clone()))
        .with_max_attempts(3)
        .with_backoff(Duration::from_millis(1));
    let runtime = ContainerRuntime::new(
        String::from("docker"),
        String::from("docker-compose"),
        runner.clone(),
    );
    let smoke = SmokeTestRunner::new(ContainerRuntime::new(
        String::from("docker"),
        String::from("docker-compose"),
        runner.clone(),
    ));

    ClusterOrchestrator::new(provider, resolver, runtime, smoke, reporter.clone())
        .with_ambient([(String::from("PATH"), String::from("/usr/bin"))].into())
}

/// Spec mirroring the CLI defaults for a cluster under the `spark` prefix.
pub fn cluster_spec(worker_count: usize, discovery: &str) -> Result<ClusterSpec, SpecError> {
    ClusterSpec::builder()
        .prefix("spark")
        .worker_count(worker_count)
        .security_group("spark-cluster")
        .discovery_address(discovery)
        .network_interface("eth0")
        .master_instance_type("m4.large")
        .worker_spot_price("0.074")
        .worker_instance_type("m4.2xlarge")
        .compose_file("docker-compose.yml")
        .build()
}

/// Export script as `docker-machine env --shell sh --swarm` would print it
/// for the master.
pub fn master_env_script() -> String {
    machine_env_script(&[
        ("DOCKER_TLS_VERIFY", "1"),
        ("DOCKER_HOST", "tcp://35.1.2.3:3376"),
        ("DOCKER_CERT_PATH", "/certs/spark-master"),
        ("DOCKER_MACHINE_NAME", "spark-master"),
    ])
}

/// Export script for the consul box's own daemon.
pub fn consul_env_script(ip: &str) -> String {
    machine_env_script(&[
        ("DOCKER_TLS_VERIFY", "1"),
        ("DOCKER_HOST", &format!("tcp://{ip}:2376")),
        ("DOCKER_CERT_PATH", "/certs/consul-box"),
        ("DOCKER_MACHINE_NAME", "consul-box"),
    ])
}
