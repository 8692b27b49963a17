//! Provisioning collaborator seam consumed by the lifecycle core
//!
//! This module defines the two traits the [`NodeLifecycle`] manager is built
//! against, along with the provider-side error domain:
//!
//! - [`NodeRegistry`] - lists current cluster members by label selector
//! - [`NodeProvisioner`] - creates, joins, and removes member nodes
//!
//! The shipped implementations ([`DockerNodeRegistry`], [`DockerNodeProvisioner`])
//! drive the local `docker` binary; tests implement the same traits with
//! mocks to pin decision behavior without a container runtime.
//!
//! [`NodeLifecycle`]: crate::lifecycle::NodeLifecycle

mod docker;
mod kubeconfig;

pub use docker::{
    ContainerRuntime, DockerCli, DockerNodeProvisioner, DockerNodeRegistry, DockerProviderConfig,
};
pub use kubeconfig::{default_kubeconfig_path, rewrite_server_endpoint, STATE_DIR_ENV};

use std::path::{Path, PathBuf};

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use thiserror::Error;

use crate::node::{ApiEndpoint, Node};

/// Errors produced by provider and registry implementations
///
/// The lifecycle core wraps these into its own taxonomy; providers only
/// describe what went wrong at the infrastructure level.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProviderError {
    /// An external command exited unsuccessfully
    #[error("command failed: {command}: {message}")]
    CommandFailed {
        /// The command that failed (binary plus identifying arguments)
        command: String,
        /// Captured stderr or a description of the failure
        message: String,
    },

    /// A required resource does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Output from an external command could not be interpreted
    #[error("unexpected output: {0}")]
    UnexpectedOutput(String),

    /// An I/O operation failed
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProviderError {
    /// Create a command failure with the given command and message
    pub fn command(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CommandFailed {
            command: command.into(),
            message: message.into(),
        }
    }

    /// Create a not-found error with the given message
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create an unexpected-output error with the given message
    pub fn unexpected(msg: impl Into<String>) -> Self {
        Self::UnexpectedOutput(msg.into())
    }
}

/// Captured output of an external command
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Whether the command exited successfully
    pub success: bool,
    /// Captured stdout
    pub stdout: String,
    /// Captured stderr
    pub stderr: String,
}

impl From<std::process::Output> for CommandOutput {
    fn from(output: std::process::Output) -> Self {
        Self {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        }
    }
}

/// Lists current cluster members
///
/// The lifecycle manager fetches its membership snapshot through this trait
/// exactly once, at construction.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait NodeRegistry: Send + Sync {
    /// List members matching a label selector of the form `label=<key>=<value>`
    ///
    /// # Arguments
    ///
    /// * `selector` - Label selector identifying a cluster's members
    ///
    /// # Returns
    ///
    /// All matching members, including infrastructure containers such as the
    /// load balancer placeholder. Order is not significant.
    async fn list(&self, selector: &str) -> Result<Vec<Node>, ProviderError>;
}

/// Provisioning primitives for container-backed cluster nodes
///
/// Implementations own all infrastructure knowledge: how nodes are realized,
/// how the load balancer publishes the API server, and where credentials
/// live. The lifecycle core only sequences these calls.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait NodeProvisioner: Send + Sync {
    /// Create the first control plane node for a cluster
    ///
    /// # Arguments
    ///
    /// * `cluster` - Cluster the node joins
    /// * `machine` - Machine identifier of the member
    /// * `version` - Kubernetes version the node image is tagged with
    /// * `endpoint` - Explicit API endpoint to publish; `None` leaves
    ///   publication to the cluster's load balancer
    /// * `cloud_config` - Opaque boot payload, passed through unmodified
    async fn create_control_plane(
        &self,
        cluster: &str,
        machine: &str,
        version: &str,
        endpoint: Option<ApiEndpoint>,
        cloud_config: &[u8],
    ) -> Result<Node, ProviderError>;

    /// Join an additional control plane node to an existing cluster
    async fn add_control_plane(
        &self,
        cluster: &str,
        machine: &str,
        version: &str,
        cloud_config: &[u8],
    ) -> Result<Node, ProviderError>;

    /// Join a worker node to an existing cluster
    async fn add_worker(
        &self,
        cluster: &str,
        machine: &str,
        version: &str,
        cloud_config: &[u8],
    ) -> Result<Node, ProviderError>;

    /// Remove a machine's control plane node
    ///
    /// Removing a node that no longer exists is success; repeated deletes
    /// must be safe.
    async fn delete_control_plane(&self, cluster: &str, machine: &str)
        -> Result<(), ProviderError>;

    /// Remove a machine's worker node
    ///
    /// Same idempotence contract as [`delete_control_plane`].
    ///
    /// [`delete_control_plane`]: NodeProvisioner::delete_control_plane
    async fn delete_worker(&self, cluster: &str, machine: &str) -> Result<(), ProviderError>;

    /// Resolve the endpoint published by the cluster's API server load balancer
    ///
    /// # Arguments
    ///
    /// * `members` - The membership snapshot to search for the load balancer
    ///   placeholder
    async fn load_balancer_endpoint(&self, members: &[Node]) -> Result<ApiEndpoint, ProviderError>;

    /// Retrieve the cluster kubeconfig from a node and persist it to `dest`
    ///
    /// The kubeconfig's server endpoints are rewritten to `https://host:port`
    /// before it is written out.
    async fn write_kubeconfig(
        &self,
        node: &Node,
        dest: &Path,
        host: &str,
        port: u16,
    ) -> Result<(), ProviderError>;

    /// Destination path for a cluster's kubeconfig
    ///
    /// Pure path computation; performs no I/O.
    fn kubeconfig_path(&self, cluster: &str) -> PathBuf;
}
