//! Command-line interface definitions for the `sparkup` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page. It
//! must stay self-contained: the build script compiles it outside the crate,
//! so defaults are spelled as literals rather than configuration constants.

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};

/// Top-level CLI for the `sparkup` binary.
#[derive(Debug, Parser)]
#[command(
    name = "sparkup",
    about = "Provision ephemeral Spark clusters on EC2 spot instances",
    arg_required_else_help = true
)]
pub(crate) enum Cli {
    /// Manage the consul box that provides cluster discovery.
    #[command(
        subcommand,
        name = "consul",
        about = "Manage the consul box that provides cluster discovery"
    )]
    Consul(ConsulCommand),
    /// Create a Spark cluster with a master and spot-priced workers.
    #[command(
        name = "create",
        about = "Create a Spark cluster with a master and spot-priced workers"
    )]
    Create(CreateCommand),
    /// Submit a SparkPi job to a running cluster.
    #[command(name = "test", about = "Submit a SparkPi job to a running cluster")]
    Test(TestCommand),
}

/// Subcommands for the `sparkup consul` group.
#[derive(Debug, Subcommand)]
pub(crate) enum ConsulCommand {
    /// Create the consul box and start its discovery agent.
    #[command(
        name = "create",
        about = "Create the consul box and start its discovery agent"
    )]
    Create(ConsulCreateCommand),
    /// Destroy the consul box.
    #[command(name = "destroy", about = "Destroy the consul box")]
    Destroy(ConsulDestroyCommand),
}

/// Arguments for the `sparkup consul create` subcommand.
#[derive(Debug, Parser)]
pub(crate) struct ConsulCreateCommand {
    /// Machine name for the consul box.
    #[arg(short = 'n', long, value_name = "NAME", default_value = "consul-box")]
    pub(crate) instance_name: String,
    /// EC2 instance type for the consul box.
    #[arg(short = 't', long, value_name = "TYPE", default_value = "t2.nano")]
    pub(crate) instance_type: String,
    /// Security group the consul box will inhabit.
    #[arg(short = 'g', long, value_name = "GROUP", default_value = "consul")]
    pub(crate) security_group: String,
}

/// Arguments for the `sparkup consul destroy` subcommand.
#[derive(Debug, Parser)]
pub(crate) struct ConsulDestroyCommand {
    /// Machine name of the consul box to destroy.
    #[arg(short = 'n', long, value_name = "NAME", default_value = "consul-box")]
    pub(crate) instance_name: String,
}

/// Arguments for the `sparkup create` subcommand.
#[derive(Debug, Parser)]
pub(crate) struct CreateCommand {
    /// Number of spot-priced worker machines to create.
    #[arg(value_name = "NUM_WORKERS")]
    pub(crate) num_workers: usize,
    /// The prefix with which to name the cluster machines.
    #[arg(short = 'p', long, value_name = "PREFIX", default_value = "spark")]
    pub(crate) cluster_prefix: String,
    /// The security group the cluster will inhabit.
    #[arg(short = 'g', long, value_name = "GROUP", default_value = "spark-cluster")]
    pub(crate) security_group: String,
    /// The machine name or IP of the consul box.
    ///
    /// A literal IPv4 address (optionally with a port, such as
    /// `10.0.0.5:8500`) is used as the discovery endpoint directly. Anything
    /// else is treated as a machine name and resolved to its private IP.
    #[arg(short = 'c', long, value_name = "NAME_OR_ADDR", default_value = "consul-box")]
    pub(crate) consul: String,
    /// The network interface on which service discovery occurs.
    #[arg(short = 'i', long, value_name = "IFACE", default_value = "eth0")]
    pub(crate) network_interface: String,
    /// The instance type of the master node.
    #[arg(short = 'm', long, value_name = "TYPE", default_value = "m4.large")]
    pub(crate) master_instance_type: String,
    /// The spot price we bid for the worker machines, in USD per hour.
    #[arg(short = 's', long, value_name = "PRICE", default_value = "0.074")]
    pub(crate) worker_spot_price: String,
    /// The instance type used for Spark workers.
    #[arg(short = 'w', long, value_name = "TYPE", default_value = "m4.2xlarge")]
    pub(crate) worker_instance_type: String,
    /// The location of the compose file describing the cluster services.
    #[arg(short = 'f', long, value_name = "PATH", default_value = "docker-compose.yml")]
    pub(crate) compose_file: Utf8PathBuf,
    /// Exit with a failure status if any worker fails to provision.
    ///
    /// By default a cluster that comes up with a working master but fewer
    /// workers than requested is reported as a success, since the compose
    /// services are scaled to the workers that exist.
    #[arg(long)]
    pub(crate) fail_on_worker_errors: bool,
}

/// Arguments for the `sparkup test` subcommand.
#[derive(Debug, Parser)]
pub(crate) struct TestCommand {
    /// The prefix with which the cluster machines were named.
    #[arg(short = 'p', long, value_name = "PREFIX", default_value = "spark")]
    pub(crate) cluster_prefix: String,
}
