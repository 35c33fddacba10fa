//! Consul discovery endpoint addressing and the discovery box container.
//!
//! Operators hand the cluster either a machine name or an address literal.
//! Literals are parsed strictly as IPv4 with an optional port; anything that
//! fails the parse is treated as a machine name and resolved through the
//! cloud inventory.

use std::fmt;
use std::net::Ipv4Addr;

use serde_json::json;
use thiserror::Error;

use crate::config::DEFAULT_DISCOVERY_PORT;
use crate::runtime::ContainerSpec;


/// Image tag for the discovery box agent container.
pub const CONSUL_IMAGE: &str = "consul:0.7.2";

/// Address of a reachable consul HTTP endpoint.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DiscoveryEndpoint {
    /// Host the consul agent is reachable on.
    pub host: String,
    /// TCP port of the consul HTTP API.
    pub port: u16,
}

impl DiscoveryEndpoint {
    /// Parses an `IPv4[:port]` literal, defaulting the port.
    ///
    /// Returns `None` when the input is not a strict dotted-quad literal, in
    /// which case the caller resolves it as a machine name instead.
    #[must_use]
    pub fn parse_literal(input: &str) -> Option<Self> {
        let (host, port) = match input.split_once(':') {
            Some((host, port)) => (host, port.parse::<u16>().ok()?),
            None => (input, DEFAULT_DISCOVERY_PORT),
        };
        host.parse::<Ipv4Addr>().ok()?;
        Some(Self {
            host: host.to_owned(),
            port,
        })
    }

    /// Builds an endpoint on the default discovery port.
    #[must_use]
    pub fn with_default_port(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_DISCOVERY_PORT,
        }
    }

    /// Renders the discovery URL used by swarm options.
    #[must_use]
    pub fn url(&self) -> String {
        format!("consul://{}:{}", self.host, self.port)
    }
}

impl fmt::Display for DiscoveryEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Errors raised while validating discovery box requests.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum DiscoveryError {
    /// Raised when a request field is blank.
    #[error("missing {field}")]
    InvalidRequest {
        /// Name of the missing or invalid field.
        field: String,
    },
}

/// Parameters for bringing up a consul discovery box.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ConsulBoxRequest {
    /// Machine name for the discovery box.
    pub instance_name: String,
    /// EC2 instance type for the discovery box.
    pub instance_type: String,
    /// EC2 security group the discovery box joins.
    pub security_group: String,
}

impl ConsulBoxRequest {
    /// Constructs a request, trimming whitespace.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryError::InvalidRequest`] when any field is blank.
    pub fn new(
        instance_name: impl Into<String>,
        instance_type: impl Into<String>,
        security_group: impl Into<String>,
    ) -> Result<Self, DiscoveryError> {
        let trimmed_name = instance_name.into().trim().to_owned();
        let trimmed_type = instance_type.into().trim().to_owned();
        let trimmed_group = security_group.into().trim().to_owned();
        if trimmed_name.is_empty() {
            return Err(DiscoveryError::InvalidRequest {
                field: String::from("instance_name"),
            });
        }
        if trimmed_type.is_empty() {
            return Err(DiscoveryError::InvalidRequest {
                field: String::from("instance_type"),
            });
        }
        if trimmed_group.is_empty() {
            return Err(DiscoveryError::InvalidRequest {
                field: String::from("security_group"),
            });
        }
        Ok(Self {
            instance_name: trimmed_name,
            instance_type: trimmed_type,
            security_group: trimmed_group,
        })
    }
}

/// Builds the container spec for the consul agent on the discovery box.
///
/// Ports, agent arguments, and the local configuration follow what the
/// single-server consul 0.7 deployment expects: RPC on 8400, HTTP on 8500,
/// DNS on 8600 mapped from the container's port 53.
#[must_use]
pub fn agent_container_spec() -> ContainerSpec {
    ContainerSpec::new(CONSUL_IMAGE)
        .publish("8400:8400")
        .publish("8500:8500/tcp")
        .publish("8600:53/udp")
        .env_var("CONSUL_LOCAL_CONFIG", local_config())
        .arg("agent")
        .arg("-server")
        .arg("-bind=127.0.0.1")
        .arg("-client=0.0.0.0")
}

fn local_config() -> String {
    json!({
        "acl_datacenter": "dc1",
        "acl_default_policy": "deny",
        "acl_down_policy": "extend-cache",
        "acl_master_token": "the_one_ring",
        "bootstrap_expect": 1,
        "datacenter": "dc1",
        "data_dir": "/usr/local/bin/consul.d/data",
        "server": true
    })
    .to_string()
}
