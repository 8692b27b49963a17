//! Docker CLI-backed registry and provisioner
//!
//! Nodes are privileged containers created from a node image and identified
//! by the drydock labels. All Docker interaction goes through the
//! [`ContainerRuntime`] trait so argument construction and output handling
//! stay testable without a daemon.
//!
//! Node creation is idempotent per (cluster, machine, role): when a matching
//! container already exists the primitive returns it instead of creating a
//! second one. Removal of an absent node is success for the same reason.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, instrument};

use crate::node::{ApiEndpoint, Node, NodeRole};
use crate::{
    API_SERVER_PORT, CLUSTER_LABEL_KEY, LOAD_BALANCER_ROLE, MACHINE_LABEL_KEY, ROLE_LABEL_KEY,
};

use super::kubeconfig;
use super::{CommandOutput, NodeProvisioner, NodeRegistry, ProviderError};

/// Default repository for node images; the requested version becomes the tag
const DEFAULT_NODE_IMAGE_REPOSITORY: &str = "kindest/node";

/// Default image for the API server load balancer placeholder
const DEFAULT_LOAD_BALANCER_IMAGE: &str = "kindest/haproxy:v20230606-42a2262b";

/// Default Docker network containers attach to
const DEFAULT_NETWORK: &str = "bridge";

/// Path the boot payload is written to inside a node
const BOOT_CONFIG_PATH: &str = "/run/drydock/boot-config";

/// Path of the admin kubeconfig inside a control plane node
const ADMIN_KUBECONFIG_PATH: &str = "/etc/kubernetes/admin.conf";

/// Executes container runtime commands
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Run `docker` with the given arguments and capture its output
    async fn run(&self, args: &[String]) -> Result<CommandOutput, ProviderError>;

    /// Run `docker` with the given arguments, feeding `input` to stdin
    async fn run_with_input(
        &self,
        args: &[String],
        input: &[u8],
    ) -> Result<CommandOutput, ProviderError>;
}

/// Runs the real `docker` binary
#[derive(Debug, Clone, Copy, Default)]
pub struct DockerCli;

#[async_trait]
impl ContainerRuntime for DockerCli {
    async fn run(&self, args: &[String]) -> Result<CommandOutput, ProviderError> {
        debug!(command = %args.join(" "), "running docker");
        let output = Command::new("docker")
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;
        Ok(CommandOutput::from(output))
    }

    async fn run_with_input(
        &self,
        args: &[String],
        input: &[u8],
    ) -> Result<CommandOutput, ProviderError> {
        debug!(command = %args.join(" "), "running docker with piped input");
        let mut child = Command::new("docker")
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(input).await?;
            stdin.shutdown().await?;
        }
        let output = child.wait_with_output().await?;
        Ok(CommandOutput::from(output))
    }
}

/// Configuration for the Docker-backed provider
#[derive(Debug, Clone)]
pub struct DockerProviderConfig {
    /// Repository for node images; the requested version becomes the tag
    pub node_image_repository: String,
    /// Image for the API server load balancer placeholder
    pub load_balancer_image: String,
    /// Docker network containers attach to
    pub network: String,
    /// Directory kubeconfigs are written to; `None` falls back to the
    /// `DRYDOCK_STATE_DIR` environment variable and then the system temp dir
    pub state_dir: Option<PathBuf>,
}

impl Default for DockerProviderConfig {
    fn default() -> Self {
        Self {
            node_image_repository: DEFAULT_NODE_IMAGE_REPOSITORY.to_string(),
            load_balancer_image: DEFAULT_LOAD_BALANCER_IMAGE.to_string(),
            network: DEFAULT_NETWORK.to_string(),
            state_dir: None,
        }
    }
}

impl DockerProviderConfig {
    /// Override the node image repository
    pub fn with_node_image_repository(mut self, repository: impl Into<String>) -> Self {
        self.node_image_repository = repository.into();
        self
    }

    /// Override the load balancer image
    pub fn with_load_balancer_image(mut self, image: impl Into<String>) -> Self {
        self.load_balancer_image = image.into();
        self
    }

    /// Override the Docker network
    pub fn with_network(mut self, network: impl Into<String>) -> Self {
        self.network = network.into();
        self
    }

    /// Override the kubeconfig state directory
    pub fn with_state_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.state_dir = Some(dir.into());
        self
    }
}

/// Docker-backed node provisioner
///
/// Members are realized as privileged containers running the node image. The
/// boot payload is streamed into the container and executed as the node's
/// bootstrap program; its contents are never inspected or modified.
#[derive(Debug, Clone)]
pub struct DockerNodeProvisioner<R = DockerCli> {
    runtime: R,
    config: DockerProviderConfig,
}

impl DockerNodeProvisioner {
    /// Provisioner backed by the local `docker` binary with default config
    pub fn new() -> Self {
        Self::with_config(DockerProviderConfig::default())
    }

    /// Provisioner backed by the local `docker` binary
    pub fn with_config(config: DockerProviderConfig) -> Self {
        Self {
            runtime: DockerCli,
            config,
        }
    }
}

impl Default for DockerNodeProvisioner {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: ContainerRuntime> DockerNodeProvisioner<R> {
    /// Provisioner over a custom runtime
    pub fn with_runtime(runtime: R, config: DockerProviderConfig) -> Self {
        Self { runtime, config }
    }

    /// Create the cluster's load balancer placeholder when absent
    ///
    /// The placeholder publishes the API server port on an ephemeral
    /// loopback port. It must exist before the first member is created: the
    /// bootstrap decision counts it in the membership snapshot, and endpoint
    /// resolution reads its published port.
    #[instrument(skip(self))]
    pub async fn ensure_load_balancer(&self, cluster: &str) -> Result<Node, ProviderError> {
        let existing = self
            .containers_matching(&[
                format!("label={CLUSTER_LABEL_KEY}={cluster}"),
                format!("label={ROLE_LABEL_KEY}={LOAD_BALANCER_ROLE}"),
            ])
            .await?;
        if let Some(name) = existing.into_iter().next() {
            debug!(name = %name, "load balancer placeholder already exists");
            return Ok(load_balancer_node(cluster, name));
        }

        let name = format!("{cluster}-lb");
        let publish = format!("127.0.0.1:0:{API_SERVER_PORT}/tcp");
        let mut args = string_args([
            "run",
            "--detach",
            "--name",
            name.as_str(),
            "--network",
            self.config.network.as_str(),
        ]);
        args.extend(label_args(cluster, LOAD_BALANCER_ROLE, None));
        args.extend(string_args(["--publish", publish.as_str()]));
        args.push(self.config.load_balancer_image.clone());

        let output = self.runtime.run(&args).await?;
        if !output.success {
            return Err(run_failure(&format!("docker run {name}"), &output));
        }
        info!(name = %name, "created load balancer placeholder");
        Ok(load_balancer_node(cluster, name))
    }

    /// Create and boot a node container unless one already exists
    async fn ensure_node(
        &self,
        cluster: &str,
        machine: &str,
        role: &str,
        version: &str,
        publish: Option<&ApiEndpoint>,
        cloud_config: &[u8],
    ) -> Result<Node, ProviderError> {
        let existing = self
            .containers_matching(&[
                format!("label={CLUSTER_LABEL_KEY}={cluster}"),
                format!("label={MACHINE_LABEL_KEY}={machine}"),
                format!("label={ROLE_LABEL_KEY}={role}"),
            ])
            .await?;
        if let Some(name) = existing.into_iter().next() {
            debug!(name = %name, "node container already exists, reusing");
            let address = self.container_address(&name).await;
            return Ok(Node {
                name,
                cluster: cluster.to_string(),
                role: role.to_string(),
                machine: Some(machine.to_string()),
                address,
            });
        }

        let image = self.node_image(version);
        let mut args = string_args([
            "run",
            "--detach",
            "--privileged",
            "--security-opt",
            "seccomp=unconfined",
            "--tmpfs",
            "/tmp",
            "--tmpfs",
            "/run",
            "--volume",
            "/var",
            "--volume",
            "/lib/modules:/lib/modules:ro",
            "--network",
            self.config.network.as_str(),
            "--hostname",
            machine,
            "--name",
            machine,
        ]);
        args.extend(label_args(cluster, role, Some(machine)));
        if let Some(endpoint) = publish {
            args.push("--publish".to_string());
            args.push(format!(
                "{}:{}:{}/tcp",
                endpoint.host, endpoint.port, API_SERVER_PORT
            ));
        }
        args.push(image);

        let output = self.runtime.run(&args).await?;
        if !output.success {
            return Err(run_failure(&format!("docker run {machine}"), &output));
        }
        self.boot_node(machine, cloud_config).await?;

        let address = self.container_address(machine).await;
        Ok(Node {
            name: machine.to_string(),
            cluster: cluster.to_string(),
            role: role.to_string(),
            machine: Some(machine.to_string()),
            address,
        })
    }

    /// Stream the boot payload into the node and execute it
    async fn boot_node(&self, machine: &str, cloud_config: &[u8]) -> Result<(), ProviderError> {
        let write_cmd = format!("mkdir -p /run/drydock && cat > {BOOT_CONFIG_PATH}");
        let write = string_args([
            "exec",
            "--interactive",
            machine,
            "sh",
            "-c",
            write_cmd.as_str(),
        ]);
        let output = self.runtime.run_with_input(&write, cloud_config).await?;
        if !output.success {
            return Err(run_failure(
                &format!("docker exec {machine} (write boot config)"),
                &output,
            ));
        }

        let boot = string_args(["exec", machine, "sh", BOOT_CONFIG_PATH]);
        let output = self.runtime.run(&boot).await?;
        if !output.success {
            return Err(run_failure(&format!("docker exec {machine} (boot)"), &output));
        }
        debug!(machine = %machine, "node boot payload executed");
        Ok(())
    }

    /// Remove a machine's containers for one role; absence is success
    async fn remove_nodes(
        &self,
        cluster: &str,
        machine: &str,
        role: &str,
    ) -> Result<(), ProviderError> {
        let matches = self
            .containers_matching(&[
                format!("label={CLUSTER_LABEL_KEY}={cluster}"),
                format!("label={MACHINE_LABEL_KEY}={machine}"),
                format!("label={ROLE_LABEL_KEY}={role}"),
            ])
            .await?;
        if matches.is_empty() {
            debug!(cluster = %cluster, machine = %machine, "no containers to remove");
            return Ok(());
        }

        let mut args = string_args(["rm", "--force", "--volumes"]);
        args.extend(matches.iter().cloned());
        let output = self.runtime.run(&args).await?;
        if !output.success {
            return Err(run_failure(
                &format!("docker rm {}", matches.join(" ")),
                &output,
            ));
        }
        info!(cluster = %cluster, machine = %machine, removed = matches.len(), "removed node containers");
        Ok(())
    }

    /// Names of containers matching every given `--filter` expression
    async fn containers_matching(&self, filters: &[String]) -> Result<Vec<String>, ProviderError> {
        let mut args = string_args(["ps", "--all"]);
        for filter in filters {
            args.push("--filter".to_string());
            args.push(filter.clone());
        }
        args.extend(string_args(["--format", "{{.Names}}"]));

        let output = self.runtime.run(&args).await?;
        if !output.success {
            return Err(run_failure("docker ps", &output));
        }
        Ok(parse_names(&output.stdout))
    }

    /// Container address on its first attached network, when resolvable
    async fn container_address(&self, name: &str) -> Option<String> {
        let args = string_args([
            "inspect",
            "--format",
            "{{range .NetworkSettings.Networks}}{{.IPAddress}}{{end}}",
            name,
        ]);
        match self.runtime.run(&args).await {
            Ok(output) if output.success => {
                let address = output.stdout.trim();
                (!address.is_empty()).then(|| address.to_string())
            }
            _ => None,
        }
    }

    fn node_image(&self, version: &str) -> String {
        format!("{}:{}", self.config.node_image_repository, version)
    }
}

#[async_trait]
impl<R: ContainerRuntime> NodeProvisioner for DockerNodeProvisioner<R> {
    #[instrument(skip_all, fields(cluster = %cluster, machine = %machine, version = %version))]
    async fn create_control_plane(
        &self,
        cluster: &str,
        machine: &str,
        version: &str,
        endpoint: Option<ApiEndpoint>,
        cloud_config: &[u8],
    ) -> Result<Node, ProviderError> {
        let node = self
            .ensure_node(
                cluster,
                machine,
                NodeRole::ControlPlane.as_label(),
                version,
                endpoint.as_ref(),
                cloud_config,
            )
            .await?;
        info!(node = %node.name, "created control plane node");
        Ok(node)
    }

    #[instrument(skip_all, fields(cluster = %cluster, machine = %machine, version = %version))]
    async fn add_control_plane(
        &self,
        cluster: &str,
        machine: &str,
        version: &str,
        cloud_config: &[u8],
    ) -> Result<Node, ProviderError> {
        let node = self
            .ensure_node(
                cluster,
                machine,
                NodeRole::ControlPlane.as_label(),
                version,
                None,
                cloud_config,
            )
            .await?;
        info!(node = %node.name, "added control plane node");
        Ok(node)
    }

    #[instrument(skip_all, fields(cluster = %cluster, machine = %machine, version = %version))]
    async fn add_worker(
        &self,
        cluster: &str,
        machine: &str,
        version: &str,
        cloud_config: &[u8],
    ) -> Result<Node, ProviderError> {
        let node = self
            .ensure_node(
                cluster,
                machine,
                NodeRole::Worker.as_label(),
                version,
                None,
                cloud_config,
            )
            .await?;
        info!(node = %node.name, "added worker node");
        Ok(node)
    }

    #[instrument(skip_all, fields(cluster = %cluster, machine = %machine))]
    async fn delete_control_plane(
        &self,
        cluster: &str,
        machine: &str,
    ) -> Result<(), ProviderError> {
        self.remove_nodes(cluster, machine, NodeRole::ControlPlane.as_label())
            .await
    }

    #[instrument(skip_all, fields(cluster = %cluster, machine = %machine))]
    async fn delete_worker(&self, cluster: &str, machine: &str) -> Result<(), ProviderError> {
        self.remove_nodes(cluster, machine, NodeRole::Worker.as_label())
            .await
    }

    async fn load_balancer_endpoint(&self, members: &[Node]) -> Result<ApiEndpoint, ProviderError> {
        let lb = members.iter().find(|n| n.is_load_balancer()).ok_or_else(|| {
            ProviderError::not_found("no external load balancer among cluster members")
        })?;

        let port_spec = format!("{API_SERVER_PORT}/tcp");
        let args = string_args(["port", lb.name.as_str(), port_spec.as_str()]);
        let output = self.runtime.run(&args).await?;
        if !output.success {
            return Err(run_failure(&format!("docker port {}", lb.name), &output));
        }
        parse_port_mapping(&output.stdout)
    }

    #[instrument(skip_all, fields(node = %node.name, dest = %dest.display()))]
    async fn write_kubeconfig(
        &self,
        node: &Node,
        dest: &Path,
        host: &str,
        port: u16,
    ) -> Result<(), ProviderError> {
        let args = string_args(["exec", node.name.as_str(), "cat", ADMIN_KUBECONFIG_PATH]);
        let output = self.runtime.run(&args).await?;
        if !output.success {
            return Err(run_failure(
                &format!("docker exec {} cat {ADMIN_KUBECONFIG_PATH}", node.name),
                &output,
            ));
        }

        let rewritten = kubeconfig::rewrite_server_endpoint(&output.stdout, host, port)?;
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(dest, rewritten).await?;
        info!("wrote cluster kubeconfig");
        Ok(())
    }

    fn kubeconfig_path(&self, cluster: &str) -> PathBuf {
        kubeconfig::kubeconfig_path_in(self.config.state_dir.as_deref(), cluster)
    }
}

/// Docker-backed membership registry
///
/// Lists cluster member containers by label selector and materializes
/// [`Node`] records from `docker inspect` output.
#[derive(Debug, Clone)]
pub struct DockerNodeRegistry<R = DockerCli> {
    runtime: R,
}

impl DockerNodeRegistry {
    /// Registry backed by the local `docker` binary
    pub fn new() -> Self {
        Self {
            runtime: DockerCli,
        }
    }
}

impl Default for DockerNodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: ContainerRuntime> DockerNodeRegistry<R> {
    /// Registry over a custom runtime
    pub fn with_runtime(runtime: R) -> Self {
        Self { runtime }
    }
}

#[async_trait]
impl<R: ContainerRuntime> NodeRegistry for DockerNodeRegistry<R> {
    #[instrument(skip(self))]
    async fn list(&self, selector: &str) -> Result<Vec<Node>, ProviderError> {
        if !selector.starts_with("label=") {
            return Err(ProviderError::unexpected(format!(
                "unsupported selector: {selector:?}"
            )));
        }

        let args = string_args([
            "ps",
            "--all",
            "--filter",
            selector,
            "--format",
            "{{.Names}}",
        ]);
        let output = self.runtime.run(&args).await?;
        if !output.success {
            return Err(run_failure("docker ps", &output));
        }

        let names = parse_names(&output.stdout);
        if names.is_empty() {
            return Ok(Vec::new());
        }

        let mut args = string_args(["inspect"]);
        args.extend(names.iter().cloned());
        let output = self.runtime.run(&args).await?;
        if !output.success {
            return Err(run_failure("docker inspect", &output));
        }
        parse_container_details(&output.stdout)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ContainerDetails {
    name: String,
    config: ContainerConfig,
    #[serde(default)]
    network_settings: NetworkSettings,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ContainerConfig {
    #[serde(default)]
    labels: HashMap<String, String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct NetworkSettings {
    #[serde(default)]
    networks: HashMap<String, NetworkEndpoint>,
}

#[derive(Debug, Default, Deserialize)]
struct NetworkEndpoint {
    #[serde(rename = "IPAddress", default)]
    ip_address: String,
}

impl From<ContainerDetails> for Node {
    fn from(details: ContainerDetails) -> Self {
        let labels = details.config.labels;
        let address = details
            .network_settings
            .networks
            .values()
            .map(|n| n.ip_address.trim())
            .find(|ip| !ip.is_empty())
            .map(String::from);
        Node {
            name: details.name.trim_start_matches('/').to_string(),
            cluster: labels.get(CLUSTER_LABEL_KEY).cloned().unwrap_or_default(),
            role: labels.get(ROLE_LABEL_KEY).cloned().unwrap_or_default(),
            machine: labels.get(MACHINE_LABEL_KEY).cloned(),
            address,
        }
    }
}

fn parse_container_details(json: &str) -> Result<Vec<Node>, ProviderError> {
    let details: Vec<ContainerDetails> = serde_json::from_str(json)
        .map_err(|e| ProviderError::unexpected(format!("invalid inspect output: {e}")))?;
    Ok(details.into_iter().map(Node::from).collect())
}

/// Parse `docker port` output such as `0.0.0.0:32768` into an endpoint
fn parse_port_mapping(output: &str) -> Result<ApiEndpoint, ProviderError> {
    let line = output
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .ok_or_else(|| ProviderError::unexpected("no published port mapping"))?;

    let (host, port) = line
        .rsplit_once(':')
        .ok_or_else(|| ProviderError::unexpected(format!("malformed port mapping: {line:?}")))?;
    let port = port
        .parse::<u16>()
        .map_err(|_| ProviderError::unexpected(format!("malformed port mapping: {line:?}")))?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    Ok(ApiEndpoint::new(host, port))
}

fn parse_names(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect()
}

fn string_args<'a>(args: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    args.into_iter().map(String::from).collect()
}

fn label_args(cluster: &str, role: &str, machine: Option<&str>) -> Vec<String> {
    let mut args = vec![
        "--label".to_string(),
        format!("{CLUSTER_LABEL_KEY}={cluster}"),
        "--label".to_string(),
        format!("{ROLE_LABEL_KEY}={role}"),
    ];
    if let Some(machine) = machine {
        args.push("--label".to_string());
        args.push(format!("{MACHINE_LABEL_KEY}={machine}"));
    }
    args
}

fn run_failure(command: &str, output: &CommandOutput) -> ProviderError {
    let message = if output.stderr.trim().is_empty() {
        output.stdout.trim().to_string()
    } else {
        output.stderr.trim().to_string()
    };
    ProviderError::command(command, message)
}

fn load_balancer_node(cluster: &str, name: String) -> Node {
    Node {
        name,
        cluster: cluster.to_string(),
        role: LOAD_BALANCER_ROLE.to_string(),
        machine: None,
        address: None,
    }
}
