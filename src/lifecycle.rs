//! Per-member lifecycle decisions for container-backed cluster nodes
//!
//! A [`NodeLifecycle`] is constructed for exactly one member and holds no
//! state beyond the membership snapshot fetched at construction. Cluster
//! state is recomputed from that snapshot on every decision:
//!
//! - A control plane member whose snapshot contains exactly one member (the
//!   load balancer placeholder) bootstraps the cluster: create the first
//!   control plane node, resolve the published endpoint, persist the
//!   credentials, then continue into the ordinary join step.
//! - Any other control plane member, and every worker, goes straight to the
//!   role's join primitive.
//!
//! Two managers constructed concurrently can both observe a single-member
//! snapshot and both take the bootstrap path; callers that create members
//! concurrently must serialize creation themselves.

use tracing::{debug, info, instrument, warn};

use crate::node::{cluster_selector, Node, NodeRole};
use crate::provider::{DockerNodeProvisioner, DockerNodeRegistry, NodeProvisioner, NodeRegistry};
use crate::{Error, ProvisionStage, Result, LOCAL_HOST_ADDRESS};

/// Manages create and delete for one cluster member
///
/// The member's role arrives from an external control loop as a plain
/// string; it is validated when an operation runs, not at construction, so
/// a manager for an unknown role can be built and will fail cleanly.
pub struct NodeLifecycle<P = DockerNodeProvisioner> {
    cluster: String,
    machine: String,
    role: String,
    version: String,
    members: Vec<Node>,
    provisioner: P,
}

impl<P> std::fmt::Debug for NodeLifecycle<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeLifecycle")
            .field("cluster", &self.cluster)
            .field("machine", &self.machine)
            .field("role", &self.role)
            .field("version", &self.version)
            .field("members", &self.members)
            .finish_non_exhaustive()
    }
}

impl NodeLifecycle {
    /// Manager over the Docker-backed registry and provisioner
    ///
    /// Equivalent to [`NodeLifecycle::new`] with [`DockerNodeRegistry`] and
    /// [`DockerNodeProvisioner`] in their default configuration.
    pub async fn docker(
        cluster: impl Into<String>,
        machine: impl Into<String>,
        role: impl Into<String>,
        version: impl Into<String>,
    ) -> Result<Self> {
        let registry = DockerNodeRegistry::new();
        Self::new(
            &registry,
            DockerNodeProvisioner::new(),
            cluster,
            machine,
            role,
            version,
        )
        .await
    }
}

impl<P: NodeProvisioner> NodeLifecycle<P> {
    /// Construct a manager for one member, fetching the membership snapshot
    ///
    /// The snapshot is fetched exactly once, here; it is what the bootstrap
    /// decision is later evaluated against.
    ///
    /// # Errors
    ///
    /// [`Error::NodeList`] when the registry cannot list the cluster's
    /// members.
    pub async fn new<R: NodeRegistry>(
        registry: &R,
        provisioner: P,
        cluster: impl Into<String>,
        machine: impl Into<String>,
        role: impl Into<String>,
        version: impl Into<String>,
    ) -> Result<Self> {
        let cluster = cluster.into();
        let selector = cluster_selector(&cluster);
        let members = registry.list(&selector).await.map_err(Error::NodeList)?;
        debug!(cluster = %cluster, members = members.len(), "fetched membership snapshot");

        Ok(Self {
            cluster,
            machine: machine.into(),
            role: role.into(),
            version: version.into(),
            members,
            provisioner,
        })
    }

    /// The membership snapshot fetched at construction
    pub fn members(&self) -> &[Node] {
        &self.members
    }

    /// Provision this member's node
    ///
    /// `cloud_config` is the member's opaque boot payload, handed to the
    /// provider unmodified.
    ///
    /// # Errors
    ///
    /// [`Error::UnknownRole`] for roles outside control-plane/worker, with
    /// no provider call made. Bootstrap failures surface as
    /// [`Error::Provision`], [`Error::EndpointResolution`], or
    /// [`Error::CredentialRetrieval`] depending on the step that failed;
    /// join failures are always [`Error::Provision`].
    #[instrument(skip(self, cloud_config), fields(cluster = %self.cluster, machine = %self.machine, role = %self.role))]
    pub async fn create(&self, cloud_config: &[u8]) -> Result<Node> {
        match self.known_role()? {
            NodeRole::ControlPlane => {
                if self.members.len() == 1 {
                    self.bootstrap_control_plane(cloud_config).await?;
                }
                // The bootstrap member goes through the join primitive too;
                // the provider converges repeated creates on one node.
                let node = self
                    .provisioner
                    .add_control_plane(&self.cluster, &self.machine, &self.version, cloud_config)
                    .await
                    .map_err(|e| Error::provision(ProvisionStage::JoinControlPlane, e))?;
                info!(node = %node.name, "control plane node ready");
                Ok(node)
            }
            NodeRole::Worker => {
                let node = self
                    .provisioner
                    .add_worker(&self.cluster, &self.machine, &self.version, cloud_config)
                    .await
                    .map_err(|e| Error::provision(ProvisionStage::JoinWorker, e))?;
                info!(node = %node.name, "worker node ready");
                Ok(node)
            }
        }
    }

    /// Retire this member's node
    ///
    /// # Errors
    ///
    /// [`Error::UnknownRole`] for roles outside control-plane/worker, with
    /// no provider call made; [`Error::Provision`] when the removal
    /// primitive fails.
    #[instrument(skip(self), fields(cluster = %self.cluster, machine = %self.machine, role = %self.role))]
    pub async fn delete(&self) -> Result<()> {
        match self.known_role()? {
            NodeRole::ControlPlane => {
                self.provisioner
                    .delete_control_plane(&self.cluster, &self.machine)
                    .await
                    .map_err(|e| Error::provision(ProvisionStage::RemoveControlPlane, e))?;
                info!("control plane node deleted");
                Ok(())
            }
            NodeRole::Worker => {
                self.provisioner
                    .delete_worker(&self.cluster, &self.machine)
                    .await
                    .map_err(|e| Error::provision(ProvisionStage::RemoveWorker, e))?;
                info!("worker node deleted");
                Ok(())
            }
        }
    }

    /// First-member path: create the control plane and persist credentials
    async fn bootstrap_control_plane(&self, cloud_config: &[u8]) -> Result<()> {
        info!("bootstrapping cluster with its first control plane node");
        let node = self
            .provisioner
            .create_control_plane(&self.cluster, &self.machine, &self.version, None, cloud_config)
            .await
            .map_err(|e| Error::provision(ProvisionStage::BootstrapControlPlane, e))?;

        let dest = self.provisioner.kubeconfig_path(&self.cluster);
        // The port is resolved against the pre-bootstrap snapshot: its only
        // member is the load balancer placeholder.
        let endpoint = self
            .provisioner
            .load_balancer_endpoint(&self.members)
            .await
            .map_err(Error::EndpointResolution)?;
        self.provisioner
            .write_kubeconfig(&node, &dest, LOCAL_HOST_ADDRESS, endpoint.port)
            .await
            .map_err(Error::CredentialRetrieval)?;
        info!(dest = %dest.display(), port = endpoint.port, "cluster credentials written");
        Ok(())
    }

    fn known_role(&self) -> Result<NodeRole> {
        self.role.parse().map_err(|err| {
            warn!("refusing to act on unknown role");
            err
        })
    }
}
