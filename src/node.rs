//! Cluster membership records, member roles, and endpoint types

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Error, CLUSTER_LABEL_KEY, LOAD_BALANCER_ROLE};

/// Role of a provisionable cluster member
///
/// Only these two roles can be created or deleted through the lifecycle
/// manager. The load balancer placeholder carries its own role label
/// ([`LOAD_BALANCER_ROLE`]) but is infrastructure, not a member role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[non_exhaustive]
pub enum NodeRole {
    /// A control plane member
    ControlPlane,
    /// A workload member
    Worker,
}

impl NodeRole {
    /// The role label value written onto this member's container
    pub fn as_label(&self) -> &'static str {
        match self {
            NodeRole::ControlPlane => "control-plane",
            NodeRole::Worker => "worker",
        }
    }
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}

impl FromStr for NodeRole {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "control-plane" => Ok(NodeRole::ControlPlane),
            "worker" => Ok(NodeRole::Worker),
            other => Err(Error::unknown_role(other)),
        }
    }
}

/// A resolved API server endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiEndpoint {
    /// Host address clients connect to
    pub host: String,
    /// TCP port the API server or its load balancer publishes
    pub port: u16,
}

impl ApiEndpoint {
    /// Create an endpoint from a host and port
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for ApiEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// A single cluster member as observed by the registry
///
/// Fields mirror the labels on the backing container, so a `Node` can be
/// rebuilt from a listing at any time; nothing here is runtime state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// Name of the backing container
    pub name: String,
    /// Cluster the member belongs to
    pub cluster: String,
    /// Role label value (`control-plane`, `worker`, or [`LOAD_BALANCER_ROLE`])
    pub role: String,
    /// Machine identifier the container was provisioned for, when labeled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub machine: Option<String>,
    /// Container address on the cluster network, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

impl Node {
    /// Whether the member carries the given role label
    pub fn has_role(&self, role: &str) -> bool {
        self.role == role
    }

    /// Whether the member is the external load balancer placeholder
    pub fn is_load_balancer(&self) -> bool {
        self.role == LOAD_BALANCER_ROLE
    }
}

/// Build the label selector identifying a cluster's members
///
/// The registry understands selectors of the form `label=<key>=<value>`.
pub fn cluster_selector(cluster: &str) -> String {
    format!("label={}={}", CLUSTER_LABEL_KEY, cluster)
}
