//! Shared helpers for the Docker integration tests

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Once;

use drydock::provider::{ContainerRuntime, DockerCli};

static INIT_TRACING: Once = Once::new();
static CLUSTER_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Initialize tracing once for the whole test binary
///
/// Honors `RUST_LOG`; silent by default so `--nocapture` stays readable.
pub fn init_tracing() {
    INIT_TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// A throwaway cluster name unique within this test run
///
/// Uniqueness across concurrent test binaries comes from the process id;
/// container names derive from the cluster name, so collisions would make
/// cleanup remove another test's containers.
pub fn test_cluster_name(story: &str) -> String {
    let n = CLUSTER_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("drydock-it-{story}-{}-{n}", std::process::id())
}

/// Whether a usable Docker daemon is reachable
pub async fn docker_available() -> bool {
    let args: Vec<String> = vec!["version".to_string(), "--format".to_string(), "{{.Server.Version}}".to_string()];
    matches!(DockerCli.run(&args).await, Ok(output) if output.success)
}

/// Force-remove every container labeled with the given cluster
///
/// Best effort: cleanup failures are printed, not propagated, so a failed
/// assertion still reports as the test failure.
pub async fn cleanup_cluster(cluster: &str) {
    let filter = format!("label={}={cluster}", drydock::CLUSTER_LABEL_KEY);
    let list: Vec<String> = ["ps", "--all", "--filter", filter.as_str(), "--format", "{{.Names}}"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let names = match DockerCli.run(&list).await {
        Ok(output) if output.success => output
            .stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect::<Vec<_>>(),
        other => {
            eprintln!("cleanup: listing containers for {cluster} failed: {other:?}");
            return;
        }
    };
    if names.is_empty() {
        return;
    }

    let mut rm: Vec<String> = ["rm", "--force", "--volumes"].iter().map(|s| s.to_string()).collect();
    rm.extend(names);
    if let Err(e) = DockerCli.run(&rm).await {
        eprintln!("cleanup: removing containers for {cluster} failed: {e}");
    }
}
