//! Drydock - node lifecycle management for container-backed Kubernetes clusters
//!
//! Drydock provisions and retires cluster members whose nodes are realized as
//! privileged Docker containers. Each lifecycle operation is driven by a
//! [`NodeLifecycle`] manager constructed for exactly one member: the manager
//! fetches a membership snapshot once, decides between the cluster bootstrap
//! path and the ordinary join path, and routes the work to role-appropriate
//! provisioning primitives.
//!
//! # Architecture
//!
//! Drydock separates deciding from doing:
//! - [`NodeLifecycle`] holds the decision logic (bootstrap vs. join, role
//!   routing) and owns no infrastructure knowledge
//! - The [`provider`] traits are the seam: a registry lists current members,
//!   a provisioner creates, joins, and removes nodes
//! - The shipped implementation drives the local `docker` binary; tests swap
//!   in mocks at the same seam
//!
//! # Modules
//!
//! - [`lifecycle`] - Per-member decision core (create/delete routing)
//! - [`node`] - Membership records, roles, and endpoint types
//! - [`provider`] - Registry and provisioner traits plus the Docker backend
//! - [`error`] - Error types for lifecycle operations
//!
//! # Example
//!
//! ```no_run
//! # async fn demo() -> drydock::Result<()> {
//! let manager =
//!     drydock::NodeLifecycle::docker("demo", "demo-cp-0", "control-plane", "v1.31.0").await?;
//! let node = manager.create(b"#!/bin/sh\nset -e\n").await?;
//! println!("provisioned {}", node.name);
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]

pub mod error;
pub mod lifecycle;
pub mod node;
pub mod provider;

pub use error::{Error, ProvisionStage};
pub use lifecycle::NodeLifecycle;
pub use node::{ApiEndpoint, Node, NodeRole};

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

// =============================================================================
// Label and Endpoint Constants
// =============================================================================
// Containers provisioned by drydock carry these labels; the registry and the
// delete primitives resolve members through them.

/// Label key associating a container with its cluster
pub const CLUSTER_LABEL_KEY: &str = "io.drydock.cluster";

/// Label key carrying a member's role (`control-plane`, `worker`, or
/// [`LOAD_BALANCER_ROLE`])
pub const ROLE_LABEL_KEY: &str = "io.drydock.role";

/// Label key carrying the machine identifier a container was provisioned for
pub const MACHINE_LABEL_KEY: &str = "io.drydock.machine";

/// Role label value of the API server load balancer placeholder
///
/// The placeholder is infrastructure rather than a provisionable member: it
/// is created before the first control plane node and counted in the
/// membership snapshot, which is what makes the bootstrap decision work.
pub const LOAD_BALANCER_ROLE: &str = "external-load-balancer";

/// Host address written into bootstrap kubeconfigs
///
/// The load balancer publishes the API server port on the local host, so the
/// credentials retrieved at bootstrap always point clients at loopback.
pub const LOCAL_HOST_ADDRESS: &str = "127.0.0.1";

/// Container port the API server and its load balancer listen on
pub const API_SERVER_PORT: u16 = 6443;
