//! Integration tests for the Docker-backed provider
//!
//! These tests require a local Docker daemon and tell the story of how the
//! lifecycle manager's collaborators behave against real infrastructure.
//!
//! # Test Organization
//!
//! Tests are organized by the story they tell:
//!
//! - `membership`: Stories about listing cluster members by label and the
//!   idempotence of member removal
//!
//! - `bootstrap_endpoint`: Stories about the load balancer placeholder that
//!   fronts an unbootstrapped cluster and the endpoint it publishes
//!
//! # Running These Tests
//!
//! These tests are ignored by default because they require a Docker daemon:
//!
//! ```bash
//! cargo test --test docker -- --ignored
//!
//! # With provider logs
//! RUST_LOG=drydock=debug cargo test --test docker -- --ignored --nocapture
//! ```

mod bootstrap_endpoint;
mod helpers;
mod membership;
