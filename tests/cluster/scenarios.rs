//! BDD scenarios for cluster provisioning.

use rstest_bdd_macros::scenario;

use super::test_helpers::{ClusterContext, cluster_context};

#[scenario(
    path = "tests/features/cluster.feature",
    name = "Create a cluster against a literal discovery address"
)]
fn scenario_literal_discovery(cluster_context: ClusterContext) {
    drop(cluster_context);
}

#[scenario(
    path = "tests/features/cluster.feature",
    name = "Resolve a named consul box before creating the cluster"
)]
fn scenario_resolved_discovery(cluster_context: ClusterContext) {
    drop(cluster_context);
}

#[scenario(
    path = "tests/features/cluster.feature",
    name = "Scale only the workers that provisioned"
)]
fn scenario_partial_workers(cluster_context: ClusterContext) {
    drop(cluster_context);
}

#[scenario(
    path = "tests/features/cluster.feature",
    name = "Abort when the master cannot be created"
)]
fn scenario_master_failure(cluster_context: ClusterContext) {
    drop(cluster_context);
}

#[scenario(
    path = "tests/features/cluster.feature",
    name = "Submit the SparkPi job to a running master"
)]
fn scenario_smoke_test(cluster_context: ClusterContext) {
    drop(cluster_context);
}

#[scenario(
    path = "tests/features/cluster.feature",
    name = "Create the consul discovery box"
)]
fn scenario_discovery_box(cluster_context: ClusterContext) {
    drop(cluster_context);
}
