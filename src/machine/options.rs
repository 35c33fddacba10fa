//! EC2 driver and swarm engine options rendered into `docker-machine create`
//! argument vectors.

use std::ffi::OsString;

use crate::config::CLUSTER_ADVERTISE_PORT;
use crate::machine::NodeRole;

/// Swarm membership options shared by every machine joining the cluster.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SwarmMembership {
    /// Discovery URL for the consul backend (`consul://host:port`).
    pub discovery_url: String,
    /// Network interface each engine advertises to the cluster store.
    pub advertise_interface: String,
}

/// Parameters for a single `docker-machine create` invocation.
///
/// Constructed per role: the discovery box carries no swarm options, the
/// master adds the swarm-master flag and a role label, and workers request
/// spot capacity at the configured bid price.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MachineOptions {
    role: NodeRole,
    security_group: String,
    instance_type: String,
    spot_price: Option<String>,
    swarm: Option<SwarmMembership>,
}

impl MachineOptions {
    /// Options for a standalone discovery box outside the swarm.
    #[must_use]
    pub fn discovery(security_group: impl Into<String>, instance_type: impl Into<String>) -> Self {
        Self {
            role: NodeRole::Discovery,
            security_group: security_group.into(),
            instance_type: instance_type.into(),
            spot_price: None,
            swarm: None,
        }
    }

    /// Options for the swarm master node.
    #[must_use]
    pub fn master(
        security_group: impl Into<String>,
        instance_type: impl Into<String>,
        swarm: SwarmMembership,
    ) -> Self {
        Self {
            role: NodeRole::Master,
            security_group: security_group.into(),
            instance_type: instance_type.into(),
            spot_price: None,
            swarm: Some(swarm),
        }
    }

    /// Options for a spot-priced worker node.
    #[must_use]
    pub fn worker(
        security_group: impl Into<String>,
        instance_type: impl Into<String>,
        spot_price: impl Into<String>,
        swarm: SwarmMembership,
    ) -> Self {
        Self {
            role: NodeRole::Worker,
            security_group: security_group.into(),
            instance_type: instance_type.into(),
            spot_price: Some(spot_price.into()),
            swarm: Some(swarm),
        }
    }

    /// Role the created machine will play in the cluster.
    #[must_use]
    pub const fn role(&self) -> NodeRole {
        self.role
    }

    /// Renders the options as `docker-machine create` arguments, excluding
    /// the trailing machine name.
    #[must_use]
    pub fn to_args(&self) -> Vec<OsString> {
        let mut args = vec![
            OsString::from("--driver"),
            OsString::from("amazonec2"),
            OsString::from(format!("--amazonec2-security-group={}", self.security_group)),
            OsString::from(format!("--amazonec2-instance-type={}", self.instance_type)),
        ];

        if let Some(ref price) = self.spot_price {
            args.push(OsString::from("--amazonec2-request-spot-instance"));
            args.push(OsString::from(format!("--amazonec2-spot-price={price}")));
        }

        if let Some(ref swarm) = self.swarm {
            args.push(OsString::from("--swarm"));
            if matches!(self.role, NodeRole::Master) {
                args.push(OsString::from("--swarm-master"));
            }
            args.push(OsString::from(format!(
                "--swarm-discovery={}",
                swarm.discovery_url
            )));
            args.push(OsString::from(format!(
                "--engine-opt=cluster-store={}",
                swarm.discovery_url
            )));
            args.push(OsString::from(format!(
                "--engine-opt=cluster-advertise={}:{}",
                swarm.advertise_interface, CLUSTER_ADVERTISE_PORT
            )));
            if matches!(self.role, NodeRole::Master) {
                args.push(OsString::from("--engine-label"));
                args.push(OsString::from("role=master"));
            }
        }

        args
    }
}
