//! Binary entry point for the sparkup CLI.

#[cfg(any(test, feature = "test-backdoors"))]
use std::env;
use std::fmt::Display;
use std::io::{self, Write};
use std::process;

use clap::Parser;
use thiserror::Error;

use sparkup::{
    AddressResolver, AwsCliInventory, ClusterError, ClusterOrchestrator, ClusterResult,
    ClusterSpec, ConsoleReporter, ConsulBoxRequest, ContainerRuntime, DiscoveryError,
    DockerMachine, InventoryError, NodeRole, ProcessCommandRunner, ProviderError, SmokeTestRunner,
    SpecError, ToolchainConfig,
};
#[cfg(any(test, feature = "test-backdoors"))]
use sparkup::{NodeHandle, NodeState, RuntimeError, WorkerOutcome};

use crate::cli::{
    Cli, ConsulCommand, ConsulCreateCommand, ConsulDestroyCommand, CreateCommand, TestCommand,
};

mod cli;

type ToolOrchestrator = ClusterOrchestrator<
    DockerMachine<ProcessCommandRunner>,
    AwsCliInventory<ProcessCommandRunner>,
    ProcessCommandRunner,
    ConsoleReporter,
>;

type OrchestratorError = ClusterError<ProviderError, InventoryError>;

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("invalid discovery request: {0}")]
    Discovery(#[from] DiscoveryError),
    #[error("invalid cluster request: {0}")]
    Spec(#[from] SpecError),
    #[error("provisioning failed: {0}")]
    Provision(Box<OrchestratorError>),
}

impl From<OrchestratorError> for CliError {
    fn from(err: OrchestratorError) -> Self {
        Self::Provision(Box::new(err))
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let exit_code = match dispatch(cli).await {
        Ok(code) => code,
        Err(err) => {
            report_error(&err);
            1
        }
    };

    process::exit(exit_code);
}

async fn dispatch(cli: Cli) -> Result<i32, CliError> {
    match cli {
        Cli::Consul(ConsulCommand::Create(args)) => consul_create_command(args).await,
        Cli::Consul(ConsulCommand::Destroy(args)) => consul_destroy_command(args).await,
        Cli::Create(args) => create_command(args).await,
        Cli::Test(args) => test_command(args).await,
    }
}

async fn consul_create_command(args: ConsulCreateCommand) -> Result<i32, CliError> {
    let request =
        ConsulBoxRequest::new(args.instance_name, args.instance_type, args.security_group)?;
    let orchestrator = build_orchestrator()?;
    orchestrator.create_discovery_node(&request).await?;
    Ok(0)
}

async fn consul_destroy_command(args: ConsulDestroyCommand) -> Result<i32, CliError> {
    let orchestrator = build_orchestrator()?;
    orchestrator
        .destroy_machine(&args.instance_name, NodeRole::Discovery)
        .await?;
    Ok(0)
}

async fn create_command(args: CreateCommand) -> Result<i32, CliError> {
    let fail_on_worker_errors = args.fail_on_worker_errors;
    if let Some(result) = fake_create_from_env() {
        return Ok(report_creation(&result, fail_on_worker_errors));
    }

    if let Some(err) = prefail_from_env() {
        return Err(err);
    }

    let spec = ClusterSpec::builder()
        .prefix(args.cluster_prefix)
        .worker_count(args.num_workers)
        .security_group(args.security_group)
        .discovery_address(args.consul)
        .network_interface(args.network_interface)
        .master_instance_type(args.master_instance_type)
        .worker_spot_price(args.worker_spot_price)
        .worker_instance_type(args.worker_instance_type)
        .compose_file(args.compose_file)
        .build()?;

    let orchestrator = build_orchestrator()?;
    let result = orchestrator.create_cluster(&spec).await?;
    Ok(report_creation(&result, fail_on_worker_errors))
}

async fn test_command(args: TestCommand) -> Result<i32, CliError> {
    let orchestrator = build_orchestrator()?;
    let output = orchestrator.smoke_test(&args.cluster_prefix).await?;
    writeln!(io::stdout(), "{output}").ok();
    Ok(0)
}

fn build_orchestrator() -> Result<ToolOrchestrator, CliError> {
    let config =
        ToolchainConfig::load_without_cli_args().map_err(|err| CliError::Config(err.to_string()))?;
    config
        .validate()
        .map_err(|err| CliError::Config(err.to_string()))?;

    let runner = ProcessCommandRunner;
    let provider = DockerMachine::new(config.docker_machine_bin.clone(), runner.clone());
    let resolver =
        AddressResolver::new(AwsCliInventory::new(config.aws_bin.clone(), runner.clone()));
    let runtime = ContainerRuntime::new(
        config.docker_bin.clone(),
        config.docker_compose_bin.clone(),
        runner.clone(),
    );
    let smoke = SmokeTestRunner::new(ContainerRuntime::new(
        config.docker_bin,
        config.docker_compose_bin,
        runner,
    ));

    Ok(ClusterOrchestrator::new(
        provider,
        resolver,
        runtime,
        smoke,
        ConsoleReporter,
    ))
}

fn report_creation(result: &ClusterResult<ProviderError>, fail_on_worker_errors: bool) -> i32 {
    render_worker_table(io::stdout(), result);
    if fail_on_worker_errors && result.has_worker_failures() {
        1
    } else {
        0
    }
}

fn render_worker_table<E: Display>(mut target: impl Write, result: &ClusterResult<E>) {
    let width = result
        .workers
        .iter()
        .map(|worker| worker.handle.name.len())
        .max()
        .unwrap_or(0);

    for worker in &result.workers {
        let outcome = match &worker.outcome {
            Ok(()) => String::from("ok"),
            Err(err) => err.to_string(),
        };
        writeln!(
            target,
            "{name:<width$}  {state:<12}  {outcome}",
            name = worker.handle.name,
            state = worker.handle.state,
        )
        .ok();
    }
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}

#[cfg(any(test, feature = "test-backdoors"))]
fn fake_create_from_env() -> Option<ClusterResult<ProviderError>> {
    let mode = env::var("SPARKUP_FAKE_CREATE").ok()?;
    match mode.as_str() {
        "full" => Some(fake_creation(&[true, true])),
        "partial" => Some(fake_creation(&[true, false, true])),
        _ => None,
    }
}

#[cfg(not(any(test, feature = "test-backdoors")))]
const fn fake_create_from_env() -> Option<ClusterResult<ProviderError>> {
    None
}

#[cfg(any(test, feature = "test-backdoors"))]
fn prefail_from_env() -> Option<CliError> {
    let mode = env::var("SPARKUP_FAKE_PREFAIL").ok()?;
    match mode.as_str() {
        "config" => Some(CliError::Config(String::from("fake"))),
        "discovery" => Some(CliError::Discovery(DiscoveryError::InvalidRequest {
            field: String::from("instance name"),
        })),
        "spec" => Some(CliError::Spec(SpecError::MissingField("prefix"))),
        "provision" => Some(CliError::Provision(Box::new(ClusterError::Scale(
            RuntimeError::CommandFailure {
                program: String::from("docker-compose"),
                status: Some(1),
                status_text: String::from("1"),
                stderr: String::from("fake"),
            },
        )))),
        _ => None,
    }
}

#[cfg(not(any(test, feature = "test-backdoors")))]
const fn prefail_from_env() -> Option<CliError> {
    None
}

#[cfg(any(test, feature = "test-backdoors"))]
fn fake_creation(outcomes: &[bool]) -> ClusterResult<ProviderError> {
    let workers = outcomes
        .iter()
        .enumerate()
        .map(|(index, up)| {
            let name = format!("spark-worker-{index}");
            if *up {
                WorkerOutcome {
                    handle: NodeHandle {
                        name,
                        role: NodeRole::Worker,
                        state: NodeState::Provisioning,
                    },
                    outcome: Ok(()),
                }
            } else {
                WorkerOutcome {
                    handle: NodeHandle {
                        name: name.clone(),
                        role: NodeRole::Worker,
                        state: NodeState::Failed,
                    },
                    outcome: Err(ProviderError::CommandFailure {
                        action: "create",
                        name,
                        status: Some(1),
                        status_text: String::from("1"),
                        stderr: String::from("spot request could not be fulfilled"),
                    }),
                }
            }
        })
        .collect();

    ClusterResult {
        master_address: String::from("ec2-198-51-100-10.compute-1.amazonaws.com"),
        workers,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sparkup::config::{
        DEFAULT_CLUSTER_PREFIX, DEFAULT_COMPOSE_FILE, DEFAULT_CONSUL_BOX_NAME,
        DEFAULT_CONSUL_INSTANCE_TYPE, DEFAULT_CONSUL_SECURITY_GROUP, DEFAULT_MASTER_INSTANCE_TYPE,
        DEFAULT_NETWORK_INTERFACE, DEFAULT_SECURITY_GROUP, DEFAULT_WORKER_INSTANCE_TYPE,
        DEFAULT_WORKER_SPOT_PRICE,
    };
    use sparkup::test_support::EnvGuard;

    #[test]
    fn create_defaults_match_config_constants() {
        let Cli::Create(args) = Cli::parse_from(["sparkup", "create", "3"]) else {
            panic!("expected the create subcommand");
        };

        assert_eq!(args.num_workers, 3);
        assert_eq!(args.cluster_prefix, DEFAULT_CLUSTER_PREFIX);
        assert_eq!(args.security_group, DEFAULT_SECURITY_GROUP);
        assert_eq!(args.consul, DEFAULT_CONSUL_BOX_NAME);
        assert_eq!(args.network_interface, DEFAULT_NETWORK_INTERFACE);
        assert_eq!(args.master_instance_type, DEFAULT_MASTER_INSTANCE_TYPE);
        assert_eq!(args.worker_spot_price, DEFAULT_WORKER_SPOT_PRICE);
        assert_eq!(args.worker_instance_type, DEFAULT_WORKER_INSTANCE_TYPE);
        assert_eq!(args.compose_file, DEFAULT_COMPOSE_FILE);
        assert!(!args.fail_on_worker_errors);
    }

    #[test]
    fn consul_create_defaults_match_config_constants() {
        let Cli::Consul(ConsulCommand::Create(args)) =
            Cli::parse_from(["sparkup", "consul", "create"])
        else {
            panic!("expected the consul create subcommand");
        };

        assert_eq!(args.instance_name, DEFAULT_CONSUL_BOX_NAME);
        assert_eq!(args.instance_type, DEFAULT_CONSUL_INSTANCE_TYPE);
        assert_eq!(args.security_group, DEFAULT_CONSUL_SECURITY_GROUP);
    }

    #[test]
    fn consul_destroy_defaults_match_config_constants() {
        let Cli::Consul(ConsulCommand::Destroy(args)) =
            Cli::parse_from(["sparkup", "consul", "destroy"])
        else {
            panic!("expected the consul destroy subcommand");
        };

        assert_eq!(args.instance_name, DEFAULT_CONSUL_BOX_NAME);
    }

    #[test]
    fn test_defaults_match_config_constants() {
        let Cli::Test(args) = Cli::parse_from(["sparkup", "test"]) else {
            panic!("expected the test subcommand");
        };

        assert_eq!(args.cluster_prefix, DEFAULT_CLUSTER_PREFIX);
    }

    #[tokio::test]
    async fn dispatch_create_renders_fake_result_and_exits_zero() {
        let _guard = EnvGuard::set_vars(&[("SPARKUP_FAKE_CREATE", "partial")]).await;
        let cli = Cli::parse_from(["sparkup", "create", "2"]);

        let code = dispatch(cli).await.expect("fake create should succeed");

        assert_eq!(code, 0);
    }

    #[tokio::test]
    async fn dispatch_create_fails_on_worker_errors_when_asked() {
        let _guard = EnvGuard::set_vars(&[("SPARKUP_FAKE_CREATE", "partial")]).await;
        let cli = Cli::parse_from(["sparkup", "create", "2", "--fail-on-worker-errors"]);

        let code = dispatch(cli).await.expect("fake create should succeed");

        assert_eq!(code, 1);
    }

    #[tokio::test]
    async fn create_command_prefail_variants() {
        type ErrorPredicate = fn(&CliError) -> bool;
        let cases: [(&str, ErrorPredicate); 4] = [
            ("config", |err: &CliError| {
                matches!(err, CliError::Config(_))
            }),
            ("discovery", |err: &CliError| {
                matches!(err, CliError::Discovery(_))
            }),
            ("spec", |err: &CliError| matches!(err, CliError::Spec(_))),
            ("provision", |err: &CliError| {
                matches!(err, CliError::Provision(_))
            }),
        ];

        for (mode, predicate) in cases {
            let _guard = EnvGuard::set_vars(&[("SPARKUP_FAKE_PREFAIL", mode)]).await;
            let Cli::Create(args) = Cli::parse_from(["sparkup", "create", "1"]) else {
                panic!("expected the create subcommand");
            };
            let err = create_command(args)
                .await
                .expect_err("prefail should error");
            assert!(
                predicate(&err),
                "mode {mode} produced unexpected error: {err}"
            );
        }
    }

    #[test]
    fn render_worker_table_aligns_names_and_reports_outcomes() {
        let result = ClusterResult::<ProviderError> {
            master_address: String::from("ec2-198-51-100-10.compute-1.amazonaws.com"),
            workers: vec![
                WorkerOutcome {
                    handle: NodeHandle {
                        name: String::from("spark-worker-0"),
                        role: NodeRole::Worker,
                        state: NodeState::Provisioning,
                    },
                    outcome: Ok(()),
                },
                WorkerOutcome {
                    handle: NodeHandle {
                        name: String::from("spark-worker-10"),
                        role: NodeRole::Worker,
                        state: NodeState::Failed,
                    },
                    outcome: Err(ProviderError::CommandFailure {
                        action: "create",
                        name: String::from("spark-worker-10"),
                        status: Some(1),
                        status_text: String::from("1"),
                        stderr: String::from("capacity-not-available"),
                    }),
                },
            ],
        };

        let mut buf = Vec::new();
        render_worker_table(&mut buf, &result);
        let rendered = String::from_utf8(buf).expect("utf8");

        assert!(
            rendered.contains("spark-worker-0   provisioning  ok"),
            "rendered: {rendered}"
        );
        assert!(
            rendered.contains(concat!(
                "spark-worker-10  failed        docker-machine create for ",
                "spark-worker-10 exited with status 1: capacity-not-available"
            )),
            "rendered: {rendered}"
        );
    }

    #[test]
    fn report_creation_is_zero_for_partial_success_by_default() {
        let result = fake_creation(&[true, false]);

        assert_eq!(report_creation(&result, false), 0);
        assert_eq!(report_creation(&result, true), 1);
    }

    #[test]
    fn write_error_writes_cli_error() {
        let mut buf = Vec::new();
        let err = CliError::Config(String::from("missing docker binary"));
        write_error(&mut buf, &err);
        let rendered = String::from_utf8(buf).expect("utf8");

        assert!(
            rendered.contains("configuration error: missing docker binary"),
            "rendered: {rendered}"
        );
    }
}
