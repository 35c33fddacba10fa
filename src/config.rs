//! Configuration loading via `ortho-config`.
//!
//! Cluster shape (worker count, instance types, discovery address) is always
//! explicit CLI input; the only layered configuration is [`ToolchainConfig`],
//! which locates the collaborator executables on the operator's machine.

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

/// Default name prefix for cluster machines.
pub const DEFAULT_CLUSTER_PREFIX: &str = "spark";

/// Default EC2 security group for cluster machines.
pub const DEFAULT_SECURITY_GROUP: &str = "spark-cluster";

/// Default machine name for the consul discovery node.
pub const DEFAULT_CONSUL_BOX_NAME: &str = "consul-box";

/// Default EC2 security group for the consul discovery node.
pub const DEFAULT_CONSUL_SECURITY_GROUP: &str = "consul";

/// Default EC2 instance type for the consul discovery node.
pub const DEFAULT_CONSUL_INSTANCE_TYPE: &str = "t2.nano";

/// Default EC2 instance type for the master node.
pub const DEFAULT_MASTER_INSTANCE_TYPE: &str = "m4.large";

/// Default EC2 instance type for worker nodes.
pub const DEFAULT_WORKER_INSTANCE_TYPE: &str = "m4.2xlarge";

/// Default bid price (USD per hour) for worker spot requests.
pub const DEFAULT_WORKER_SPOT_PRICE: &str = "0.074";

/// Default network interface advertised to the swarm cluster store.
pub const DEFAULT_NETWORK_INTERFACE: &str = "eth0";

/// Default compose file describing the master and worker services.
pub const DEFAULT_COMPOSE_FILE: &str = "docker-compose.yml";

/// TCP port consul serves its HTTP API on.
pub const DEFAULT_DISCOVERY_PORT: u16 = 8500;

/// TCP port the Spark master serves its web UI on.
pub const MASTER_WEB_UI_PORT: u16 = 8080;

/// TCP port each engine advertises to the swarm cluster store.
pub const CLUSTER_ADVERTISE_PORT: u16 = 2376;

/// Locations of the collaborator executables, loaded via `ortho-config`.
///
/// Values merge defaults, configuration files, and environment variables so
/// operators with the tools outside `PATH` can point at them once.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "SPARKUP",
    discovery(
        app_name = "sparkup",
        env_var = "SPARKUP_CONFIG_PATH",
        config_file_name = "sparkup.toml",
        dotfile_name = ".sparkup.toml",
        project_file_name = "sparkup.toml"
    )
)]
pub struct ToolchainConfig {
    /// Path to the `docker-machine` executable.
    #[ortho_config(default = "docker-machine".to_owned())]
    pub docker_machine_bin: String,
    /// Path to the `docker` executable.
    #[ortho_config(default = "docker".to_owned())]
    pub docker_bin: String,
    /// Path to the `docker-compose` executable.
    #[ortho_config(default = "docker-compose".to_owned())]
    pub docker_compose_bin: String,
    /// Path to the `aws` executable.
    #[ortho_config(default = "aws".to_owned())]
    pub aws_bin: String,
}

impl ToolchainConfig {
    /// Ensures configured paths are present after trimming whitespace.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when any path is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        Self::require_value(&self.docker_machine_bin, "docker_machine_bin")?;
        Self::require_value(&self.docker_bin, "docker_bin")?;
        Self::require_value(&self.docker_compose_bin, "docker_compose_bin")?;
        Self::require_value(&self.aws_bin, "aws_bin")?;
        Ok(())
    }

    /// Loads configuration using defaults, configuration files, and
    /// environment variables, ignoring CLI arguments.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when merging sources fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("sparkup")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    fn require_value(value: &str, field: &str) -> Result<(), ConfigError> {
        if value.trim().is_empty() {
            return Err(ConfigError::MissingField {
                field: field.to_owned(),
            });
        }
        Ok(())
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing {field}: set SPARKUP_{env_suffix} or add {field} to sparkup.toml", env_suffix = field.to_uppercase())]
    MissingField {
        /// Configuration field that failed validation.
        field: String,
    },
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}
