//! Error types for node lifecycle operations

use thiserror::Error;

use crate::provider::ProviderError;

/// The provisioning step a failure occurred in
///
/// Lifecycle errors carry the stage so callers can tell an aborted bootstrap
/// apart from an ordinary join or removal failure without parsing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ProvisionStage {
    /// Creating the first control plane node during cluster bootstrap
    BootstrapControlPlane,
    /// Joining an additional control plane node
    JoinControlPlane,
    /// Joining a worker node
    JoinWorker,
    /// Removing a control plane node
    RemoveControlPlane,
    /// Removing a worker node
    RemoveWorker,
}

impl std::fmt::Display for ProvisionStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stage = match self {
            ProvisionStage::BootstrapControlPlane => "create first control plane",
            ProvisionStage::JoinControlPlane => "add control plane",
            ProvisionStage::JoinWorker => "add worker",
            ProvisionStage::RemoveControlPlane => "delete control plane",
            ProvisionStage::RemoveWorker => "delete worker",
        };
        f.write_str(stage)
    }
}

/// Main error type for node lifecycle operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Listing cluster members at construction failed
    #[error("failed to list cluster nodes: {0}")]
    NodeList(#[source] ProviderError),

    /// A create, join, or removal primitive failed
    #[error("failed to {stage}: {source}")]
    Provision {
        /// The step that failed
        stage: ProvisionStage,
        /// The underlying provider failure
        #[source]
        source: ProviderError,
    },

    /// The load balancer endpoint could not be resolved during bootstrap
    #[error("failed to resolve load balancer endpoint: {0}")]
    EndpointResolution(#[source] ProviderError),

    /// The cluster credentials could not be retrieved or persisted
    #[error("failed to retrieve cluster credentials: {0}")]
    CredentialRetrieval(#[source] ProviderError),

    /// The member's role is not one this manager can provision
    #[error("unknown role: {0:?}")]
    UnknownRole(String),
}

impl Error {
    /// Wrap a provider failure with the provisioning stage it occurred in
    pub fn provision(stage: ProvisionStage, source: ProviderError) -> Self {
        Self::Provision { stage, source }
    }

    /// Create an unknown-role error for the given role string
    pub fn unknown_role(role: impl Into<String>) -> Self {
        Self::UnknownRole(role.into())
    }
}
