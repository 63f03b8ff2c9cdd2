//! Container runtime interface and mock implementation.
//!
//! The runtime interface abstracts the one lifecycle operation the facade
//! needs: start a long-running, detached connector container with a given
//! name, network, and environment.
//!
//! A mock implementation is provided for testing and development.

mod docker;

pub use docker::DockerRuntime;

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::info;

/// Errors from the container runtime.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The runtime could not be reached.
    #[error("container runtime unreachable: {0}")]
    Transport(#[source] hyper::Error),

    /// The runtime refused or failed the request.
    #[error("{explanation}")]
    Api { status: u16, explanation: String },

    /// The request could not be encoded.
    #[error("invalid container runtime request: {0}")]
    InvalidRequest(String),
}

impl RuntimeError {
    /// Human-readable reason the runtime gave for the failure.
    pub fn explanation(&self) -> String {
        match self {
            RuntimeError::Api { explanation, .. } => explanation.clone(),
            other => other.to_string(),
        }
    }
}

/// Restart policy applied by the runtime when the process exits.
///
/// Connectors are always restarted unless someone stopped them on purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartPolicy {
    UnlessStopped,
}

impl RestartPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RestartPolicy::UnlessStopped => "unless-stopped",
        }
    }
}

/// Everything needed to start one detached container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    pub image: String,
    pub name: String,
    pub network: String,
    pub env: BTreeMap<String, String>,
    pub restart_policy: RestartPolicy,
}

/// Handle to a started container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHandle {
    /// Runtime-assigned container ID.
    pub id: String,

    /// Name the container was started under.
    pub name: String,
}

/// Container runtime interface.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Create and start a detached container.
    async fn run(&self, spec: &ContainerSpec) -> Result<ContainerHandle, RuntimeError>;

    /// Check that the runtime is reachable.
    async fn ping(&self) -> Result<(), RuntimeError>;
}

/// Mock runtime for testing and development.
pub struct MockRuntime {
    /// Counter for generating container IDs.
    counter: AtomicU64,

    /// Explanation returned from every `run`, if set.
    failure: Option<String>,

    /// Specs of every container successfully started.
    started: Mutex<Vec<ContainerSpec>>,
}

impl MockRuntime {
    /// Create a new mock runtime.
    pub fn new() -> Self {
        Self {
            counter: AtomicU64::new(0),
            failure: None,
            started: Mutex::new(Vec::new()),
        }
    }

    /// Create a mock runtime that fails all runs with the given explanation.
    pub fn failing(explanation: impl Into<String>) -> Self {
        Self {
            failure: Some(explanation.into()),
            ..Self::new()
        }
    }

    /// Specs of the containers started so far, in order.
    pub async fn started(&self) -> Vec<ContainerSpec> {
        self.started.lock().await.clone()
    }
}

impl Default for MockRuntime {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContainerRuntime for MockRuntime {
    async fn run(&self, spec: &ContainerSpec) -> Result<ContainerHandle, RuntimeError> {
        if let Some(explanation) = &self.failure {
            return Err(RuntimeError::Api {
                status: 500,
                explanation: explanation.clone(),
            });
        }

        let mut started = self.started.lock().await;
        let names: HashSet<&str> = started.iter().map(|s| s.name.as_str()).collect();
        if names.contains(spec.name.as_str()) {
            return Err(RuntimeError::Api {
                status: 409,
                explanation: format!(
                    "Conflict. The container name \"/{}\" is already in use",
                    spec.name
                ),
            });
        }

        let counter = self.counter.fetch_add(1, Ordering::SeqCst);
        let id = format!("{:064x}", counter);

        info!(
            name = %spec.name,
            image = %spec.image,
            network = %spec.network,
            "[MOCK] Starting container"
        );

        started.push(spec.clone());
        Ok(ContainerHandle {
            id,
            name: spec.name.clone(),
        })
    }

    async fn ping(&self) -> Result<(), RuntimeError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_spec(name: &str) -> ContainerSpec {
        ContainerSpec {
            image: "conector-baileys:latest".to_string(),
            name: name.to_string(),
            network: "zapi".to_string(),
            env: BTreeMap::from([("INSTANCE_ID".to_string(), "abc".to_string())]),
            restart_policy: RestartPolicy::UnlessStopped,
        }
    }

    #[tokio::test]
    async fn test_mock_runtime_records_started_containers() {
        let runtime = MockRuntime::new();
        let handle = runtime.run(&test_spec("conector-a")).await.unwrap();
        assert_eq!(handle.name, "conector-a");
        assert_eq!(runtime.started().await, vec![test_spec("conector-a")]);
    }

    #[tokio::test]
    async fn test_mock_runtime_rejects_duplicate_names() {
        let runtime = MockRuntime::new();
        runtime.run(&test_spec("conector-a")).await.unwrap();
        let err = runtime.run(&test_spec("conector-a")).await.unwrap_err();
        assert!(matches!(err, RuntimeError::Api { status: 409, .. }));
    }

    #[tokio::test]
    async fn test_failing_mock_runtime() {
        let runtime = MockRuntime::failing("image not found");
        let err = runtime.run(&test_spec("conector-a")).await.unwrap_err();
        assert_eq!(err.explanation(), "image not found");
        assert!(runtime.started().await.is_empty());
    }
}
