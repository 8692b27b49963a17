//! Kubeconfig handling for bootstrap credential retrieval
//!
//! The admin kubeconfig inside a node points at the API server address the
//! node sees, which is unreachable from the host. Before the credentials are
//! persisted, every cluster server URL is rewritten to the endpoint the load
//! balancer actually publishes.

use std::path::{Path, PathBuf};

use super::ProviderError;

/// Environment variable overriding the state directory kubeconfigs land in
pub const STATE_DIR_ENV: &str = "DRYDOCK_STATE_DIR";

/// Default destination path for a cluster's kubeconfig
///
/// Resolves to `$DRYDOCK_STATE_DIR/drydock-kubeconfig-<cluster>` when the
/// override is set, otherwise to the same filename under the system temp
/// directory.
pub fn default_kubeconfig_path(cluster: &str) -> PathBuf {
    kubeconfig_path_in(None, cluster)
}

/// Destination path for a cluster's kubeconfig under an explicit state dir
///
/// `None` falls back to [`STATE_DIR_ENV`] and then the system temp directory.
pub(crate) fn kubeconfig_path_in(state_dir: Option<&Path>, cluster: &str) -> PathBuf {
    let dir = state_dir
        .map(Path::to_path_buf)
        .or_else(|| std::env::var(STATE_DIR_ENV).ok().map(PathBuf::from))
        .unwrap_or_else(std::env::temp_dir);
    dir.join(format!("drydock-kubeconfig-{cluster}"))
}

/// Rewrite every cluster server URL in a kubeconfig to `https://host:port`
///
/// # Arguments
///
/// * `kubeconfig` - Raw kubeconfig YAML as read from the node
/// * `host` - Host address clients should connect to
/// * `port` - Published API server port
///
/// # Returns
///
/// The rewritten YAML. A document without a `clusters` section is rejected,
/// since persisting it would hand out credentials that point nowhere
/// reachable.
pub fn rewrite_server_endpoint(
    kubeconfig: &str,
    host: &str,
    port: u16,
) -> Result<String, ProviderError> {
    let mut doc: serde_yaml::Value = serde_yaml::from_str(kubeconfig)
        .map_err(|e| ProviderError::unexpected(format!("invalid kubeconfig: {e}")))?;

    let clusters = doc
        .get_mut("clusters")
        .and_then(|c| c.as_sequence_mut())
        .filter(|c| !c.is_empty())
        .ok_or_else(|| ProviderError::unexpected("kubeconfig has no clusters section"))?;

    let endpoint = format!("https://{host}:{port}");
    for cluster in clusters {
        if let Some(cluster_config) = cluster.get_mut("cluster") {
            if let Some(server) = cluster_config.get_mut("server") {
                *server = serde_yaml::Value::String(endpoint.clone());
            }
        }
    }

    serde_yaml::to_string(&doc)
        .map_err(|e| ProviderError::unexpected(format!("failed to serialize kubeconfig: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    const NODE_KUBECONFIG: &str = r#"apiVersion: v1
kind: Config
clusters:
- name: demo
  cluster:
    certificate-authority-data: Zm9v
    server: https://demo-control-plane:6443
contexts:
- name: admin@demo
  context:
    cluster: demo
    user: admin
current-context: admin@demo
users:
- name: admin
  user:
    client-certificate-data: YmFy
"#;

    /// Story: bootstrap credentials are repointed at the load balancer
    ///
    /// The in-node kubeconfig names the container-internal endpoint; after
    /// the rewrite it names the published loopback endpoint while everything
    /// else (CA data, users, contexts) survives untouched.
    #[test]
    fn story_server_is_rewritten_to_the_published_endpoint() {
        let rewritten = rewrite_server_endpoint(NODE_KUBECONFIG, "127.0.0.1", 32768).unwrap();

        assert!(rewritten.contains("server: https://127.0.0.1:32768"));
        assert!(!rewritten.contains("demo-control-plane:6443"));
        assert!(rewritten.contains("certificate-authority-data: Zm9v"));
        assert!(rewritten.contains("current-context: admin@demo"));
    }

    #[test]
    fn every_cluster_entry_is_rewritten() {
        let multi = r#"clusters:
- name: a
  cluster:
    server: https://a:6443
- name: b
  cluster:
    server: https://b:6443
"#;
        let rewritten = rewrite_server_endpoint(multi, "127.0.0.1", 40000).unwrap();
        assert_eq!(rewritten.matches("https://127.0.0.1:40000").count(), 2);
    }

    #[test]
    fn kubeconfig_without_clusters_is_rejected() {
        let err = rewrite_server_endpoint("apiVersion: v1\nkind: Config\n", "127.0.0.1", 1)
            .unwrap_err();
        assert!(err.to_string().contains("no clusters section"));
    }

    #[test]
    fn invalid_yaml_is_rejected() {
        let err = rewrite_server_endpoint(": not yaml : [", "127.0.0.1", 1).unwrap_err();
        assert!(err.to_string().contains("invalid kubeconfig"));
    }

    #[test]
    fn default_path_is_keyed_by_cluster() {
        let path = default_kubeconfig_path("c1");
        assert!(path.ends_with("drydock-kubeconfig-c1"));

        let explicit = kubeconfig_path_in(Some(Path::new("/var/lib/drydock")), "c1");
        assert_eq!(
            explicit,
            PathBuf::from("/var/lib/drydock/drydock-kubeconfig-c1")
        );
    }
}
