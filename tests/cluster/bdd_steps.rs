//! BDD step definitions for cluster provisioning.

use rstest_bdd_macros::{given, then, when};
use tokio::runtime::Runtime;

use sparkup::test_support::json_described_instance;
use sparkup::{ConsulBoxRequest, DiscoveryError, SpecError};

use super::test_helpers::{
    ClusterContext, MASTER_PUBLIC_DNS, RunOutcome, build_orchestrator, cluster_spec,
    consul_env_script, master_env_script,
};

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error(transparent)]
    Spec(#[from] SpecError),
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
    #[error("assertion failed: {0}")]
    Assertion(String),
}

#[given("a discovery endpoint at \"{address}\"")]
fn discovery_endpoint(mut cluster_context: ClusterContext, address: String) -> ClusterContext {
    cluster_context.discovery = address;
    cluster_context
}

#[given("a consul machine named \"{name}\" with private address \"{ip}\"")]
fn named_consul_box(
    mut cluster_context: ClusterContext,
    name: String,
    ip: String,
) -> ClusterContext {
    cluster_context.runner.push_output(
        Some(0),
        json_described_instance(&name, "running", Some(&ip), None),
        "",
    );
    cluster_context.discovery = name;
    cluster_context
}

#[given("the master machine and its workload come up cleanly")]
fn master_comes_up(cluster_context: ClusterContext) -> ClusterContext {
    cluster_context.runner.push_success();
    cluster_context
        .runner
        .push_output(Some(0), master_env_script(), "");
    cluster_context.runner.push_success();
    cluster_context.runner.push_output(
        Some(0),
        json_described_instance("spark-master", "running", None, Some(MASTER_PUBLIC_DNS)),
        "",
    );
    cluster_context
}

#[given("the master machine fails to come up")]
fn master_fails(cluster_context: ClusterContext) -> ClusterContext {
    cluster_context.runner.push_failure(1);
    cluster_context
}

#[given("\"{count}\" workers come up cleanly")]
fn workers_come_up(cluster_context: ClusterContext, count: usize) -> ClusterContext {
    for _ in 0..count {
        cluster_context.runner.push_success();
    }
    cluster_context
}

#[given("worker \"{index}\" comes up cleanly")]
fn worker_comes_up(cluster_context: ClusterContext, index: usize) -> ClusterContext {
    let _ = index;
    cluster_context.runner.push_success();
    cluster_context
}

#[given("worker \"{index}\" fails to provision")]
fn worker_fails(cluster_context: ClusterContext, index: usize) -> ClusterContext {
    let _ = index;
    cluster_context.runner.push_failure(1);
    cluster_context
}

#[given("the swarm scales cleanly")]
fn swarm_scales(cluster_context: ClusterContext) -> ClusterContext {
    cluster_context.runner.push_success();
    cluster_context
}

#[given("the master accepts a submitted job with output \"{line}\"")]
fn master_accepts_job(cluster_context: ClusterContext, line: String) -> ClusterContext {
    cluster_context
        .runner
        .push_output(Some(0), master_env_script(), "");
    cluster_context.runner.push_output(Some(0), line, "");
    cluster_context
}

#[given("the consul box machine comes up with private address \"{ip}\"")]
fn consul_box_comes_up(cluster_context: ClusterContext, ip: String) -> ClusterContext {
    cluster_context.runner.push_success();
    cluster_context
        .runner
        .push_output(Some(0), consul_env_script(&ip), "");
    cluster_context.runner.push_success();
    cluster_context.runner.push_output(
        Some(0),
        json_described_instance("consul-box", "running", Some(&ip), None),
        "",
    );
    cluster_context
}

#[when("I create a cluster with \"{count}\" workers")]
fn create_cluster(
    mut cluster_context: ClusterContext,
    count: usize,
) -> Result<ClusterContext, StepError> {
    let runtime = Runtime::new().map_err(|err| StepError::Assertion(err.to_string()))?;
    let spec = cluster_spec(count, &cluster_context.discovery)?;
    let orchestrator = build_orchestrator(&cluster_context.runner, &cluster_context.reporter);

    let result = runtime.block_on(async { orchestrator.create_cluster(&spec).await });
    cluster_context.outcome = Some(match result {
        Ok(created) => RunOutcome::Cluster(created),
        Err(err) => RunOutcome::Failure(err.to_string()),
    });

    Ok(cluster_context)
}

#[when("I submit the smoke test for prefix \"{prefix}\"")]
fn submit_smoke_test(
    mut cluster_context: ClusterContext,
    prefix: String,
) -> Result<ClusterContext, StepError> {
    let runtime = Runtime::new().map_err(|err| StepError::Assertion(err.to_string()))?;
    let orchestrator = build_orchestrator(&cluster_context.runner, &cluster_context.reporter);

    let result = runtime.block_on(async { orchestrator.smoke_test(&prefix).await });
    cluster_context.outcome = Some(match result {
        Ok(output) => RunOutcome::Smoke(output),
        Err(err) => RunOutcome::Failure(err.to_string()),
    });

    Ok(cluster_context)
}

#[when("I create the discovery box \"{name}\"")]
fn create_discovery_box(
    mut cluster_context: ClusterContext,
    name: String,
) -> Result<ClusterContext, StepError> {
    let runtime = Runtime::new().map_err(|err| StepError::Assertion(err.to_string()))?;
    let request = ConsulBoxRequest::new(name, "t2.nano", "consul")?;
    let orchestrator = build_orchestrator(&cluster_context.runner, &cluster_context.reporter);

    let result = runtime.block_on(async { orchestrator.create_discovery_node(&request).await });
    cluster_context.outcome = Some(match result {
        Ok(endpoint) => RunOutcome::Discovery(endpoint),
        Err(err) => RunOutcome::Failure(err.to_string()),
    });

    Ok(cluster_context)
}

#[then("the run succeeds")]
fn run_succeeds(cluster_context: &ClusterContext) -> Result<(), StepError> {
    match &cluster_context.outcome {
        Some(RunOutcome::Failure(message)) => {
            Err(StepError::Assertion(format!("run failed: {message}")))
        }
        Some(_) => Ok(()),
        None => Err(StepError::Assertion(String::from("missing outcome"))),
    }
}

#[then("the run fails with \"{fragment}\"")]
fn run_fails_with(cluster_context: &ClusterContext, fragment: String) -> Result<(), StepError> {
    let Some(RunOutcome::Failure(message)) = &cluster_context.outcome else {
        return Err(StepError::Assertion(String::from("expected a failed run")));
    };

    if message.contains(&fragment) {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected failure mentioning {fragment:?}, got: {message}"
        )))
    }
}

#[then("the cluster master address is \"{address}\"")]
fn master_address_is(cluster_context: &ClusterContext, address: String) -> Result<(), StepError> {
    let Some(RunOutcome::Cluster(result)) = &cluster_context.outcome else {
        return Err(StepError::Assertion(String::from(
            "expected a cluster result",
        )));
    };

    if result.master_address == address {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected master address {address}, got {}",
            result.master_address
        )))
    }
}

#[then("\"{count}\" workers are running")]
fn workers_running(cluster_context: &ClusterContext, count: usize) -> Result<(), StepError> {
    let Some(RunOutcome::Cluster(result)) = &cluster_context.outcome else {
        return Err(StepError::Assertion(String::from(
            "expected a cluster result",
        )));
    };

    if result.running_workers() == count {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected {count} running workers, got {}",
            result.running_workers()
        )))
    }
}

#[then("worker \"{name}\" is reported as failed")]
fn worker_reported_failed(cluster_context: &ClusterContext, name: String) -> Result<(), StepError> {
    let Some(RunOutcome::Cluster(result)) = &cluster_context.outcome else {
        return Err(StepError::Assertion(String::from(
            "expected a cluster result",
        )));
    };

    let Some(worker) = result
        .workers
        .iter()
        .find(|worker| worker.handle.name == name)
    else {
        return Err(StepError::Assertion(format!("no worker named {name}")));
    };

    if worker.outcome.is_err() {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "worker {name} was expected to fail"
        )))
    }
}

#[then("the smoke test output is \"{line}\"")]
fn smoke_output_is(cluster_context: &ClusterContext, line: String) -> Result<(), StepError> {
    let Some(RunOutcome::Smoke(output)) = &cluster_context.outcome else {
        return Err(StepError::Assertion(String::from(
            "expected a smoke test result",
        )));
    };

    if output == &line {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected output {line:?}, got {output:?}"
        )))
    }
}

#[then("the discovery endpoint is \"{endpoint}\"")]
fn discovery_endpoint_is(
    cluster_context: &ClusterContext,
    endpoint: String,
) -> Result<(), StepError> {
    let Some(RunOutcome::Discovery(resolved)) = &cluster_context.outcome else {
        return Err(StepError::Assertion(String::from(
            "expected a discovery endpoint",
        )));
    };

    if resolved.to_string() == endpoint {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected endpoint {endpoint}, got {resolved}"
        )))
    }
}

#[then("the command log contains \"{fragment}\"")]
fn command_log_contains(
    cluster_context: &ClusterContext,
    fragment: String,
) -> Result<(), StepError> {
    let invocations = cluster_context.runner.invocations();
    if invocations
        .iter()
        .any(|invocation| invocation.command_string().contains(&fragment))
    {
        Ok(())
    } else {
        let log = invocations
            .iter()
            .map(sparkup::test_support::CommandInvocation::command_string)
            .collect::<Vec<_>>()
            .join("\n");
        Err(StepError::Assertion(format!(
            "no command contains {fragment:?}; log:\n{log}"
        )))
    }
}

#[then("the command log ends with a scale to \"{workers}\" workers")]
fn command_log_ends_with_scale(
    cluster_context: &ClusterContext,
    workers: usize,
) -> Result<(), StepError> {
    let invocations = cluster_context.runner.invocations();
    let Some(last) = invocations.last() else {
        return Err(StepError::Assertion(String::from("empty command log")));
    };

    let expected = format!("scale master=1 worker={workers}");
    let command = last.command_string();
    if command.ends_with(&expected) {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected final command to end with {expected:?}, got: {command}"
        )))
    }
}

#[then("the command log has \"{count}\" entries")]
fn command_log_length(cluster_context: &ClusterContext, count: usize) -> Result<(), StepError> {
    let actual = cluster_context.runner.invocations().len();
    if actual == count {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected {count} commands, got {actual}"
        )))
    }
}

#[then("the status line \"{line}\" was emitted")]
fn status_line_emitted(cluster_context: &ClusterContext, line: String) -> Result<(), StepError> {
    let lines = cluster_context.reporter.lines();
    if lines.iter().any(|emitted| emitted == &line) {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "status line {line:?} not emitted; got: {lines:?}"
        )))
    }
}
