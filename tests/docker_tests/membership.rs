//! Integration tests for membership listing and removal
//!
//! These tests exercise the Docker-backed registry and the delete path of
//! the lifecycle manager against a real daemon. No node images are pulled;
//! the stories stay on the listing and removal primitives.

use drydock::provider::{DockerNodeRegistry, NodeRegistry};
use drydock::{Error, NodeLifecycle};

use super::helpers::{cleanup_cluster, docker_available, init_tracing, test_cluster_name};

/// Story: an unprovisioned cluster has no members
///
/// The registry resolves members purely through labels, so a cluster name
/// nothing was ever created for lists as empty rather than failing.
#[tokio::test]
#[ignore = "requires docker daemon - run with: cargo test --test docker -- --ignored"]
async fn story_listing_an_unprovisioned_cluster_is_empty() {
    init_tracing();
    assert!(docker_available().await, "docker daemon not reachable");

    let cluster = test_cluster_name("list-empty");
    let selector = format!("label={}={cluster}", drydock::CLUSTER_LABEL_KEY);

    let members = DockerNodeRegistry::new()
        .list(&selector)
        .await
        .expect("listing should succeed against an empty cluster");

    assert!(members.is_empty());
}

/// Story: retiring a member that was never provisioned is success
///
/// Control loops retry deletes; the provider treats zero label matches as
/// already-deleted, so the whole lifecycle call succeeds without side
/// effects.
#[tokio::test]
#[ignore = "requires docker daemon - run with: cargo test --test docker -- --ignored"]
async fn story_removing_an_absent_member_succeeds() {
    init_tracing();
    assert!(docker_available().await, "docker daemon not reachable");

    let cluster = test_cluster_name("delete-absent");
    let manager = NodeLifecycle::docker(&cluster, "m0", "worker", "v1.31.0")
        .await
        .expect("construction should succeed");

    manager
        .delete()
        .await
        .expect("deleting an absent member should be success");

    cleanup_cluster(&cluster).await;
}

/// Story: unknown roles are rejected after a successful snapshot
///
/// Construction lists members regardless of role; the role is only
/// validated when an operation runs, and the failure names the value.
#[tokio::test]
#[ignore = "requires docker daemon - run with: cargo test --test docker -- --ignored"]
async fn story_unknown_role_fails_after_construction() {
    init_tracing();
    assert!(docker_available().await, "docker daemon not reachable");

    let cluster = test_cluster_name("bad-role");
    let manager = NodeLifecycle::docker(&cluster, "m0", "gateway", "v1.31.0")
        .await
        .expect("construction should succeed for any role string");

    let err = manager.create(b"").await.unwrap_err();
    assert!(matches!(err, Error::UnknownRole(ref role) if role == "gateway"));

    cleanup_cluster(&cluster).await;
}
