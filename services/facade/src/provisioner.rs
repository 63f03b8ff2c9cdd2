//! Instance provisioning.
//!
//! Creating an instance touches two systems that cannot be updated
//! atomically: the metadata store and the container runtime. The sequence
//! is:
//!
//! 1. insert `{id, status: pending}`; on failure nothing else happens
//! 2. start `conector-{id}` on the shared network
//! 3. on start failure, mark the row `error` (best effort) and report the
//!    runtime's explanation
//! 4. on success, mark the row `starting` and record `container_name`
//!
//! If step 4 fails the container is already running while the row still
//! says `pending`. That window is reported to the caller, not repaired.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, instrument, warn};
use zapi_id::InstanceId;

use crate::config::ProvisioningConfig;
use crate::report::error_chain;
use crate::runtime::{ContainerRuntime, ContainerSpec, RestartPolicy, RuntimeError};
use crate::store::{
    InstancePatch, InstanceStatus, MetadataStore, NewInstance, StoreConfig, StoreError,
};

/// Prefix of every connector container name.
pub const CONTAINER_NAME_PREFIX: &str = "conector-";

/// Deterministic container name for an instance.
pub fn container_name(id: InstanceId) -> String {
    format!("{CONTAINER_NAME_PREFIX}{id}")
}

#[derive(Debug, Error)]
pub enum ProvisionError {
    /// The initial `pending` row could not be written. Nothing was started.
    #[error("failed to create instance record: {0}")]
    Insert(#[source] StoreError),

    /// The runtime did not start the container.
    #[error("failed to start connector container: {}", .0.explanation())]
    Container(#[source] RuntimeError),

    /// The container is running but its row was not moved to `starting`.
    #[error("connector {container_name} started but instance record was not updated: {source}")]
    MarkStarting {
        container_name: String,
        #[source]
        source: StoreError,
    },
}

/// Result of a successful provisioning run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreatedInstance {
    pub instance_id: InstanceId,
    pub status: InstanceStatus,
}

#[derive(Clone)]
pub struct Provisioner {
    store: Arc<dyn MetadataStore>,
    runtime: Arc<dyn ContainerRuntime>,
    config: ProvisioningConfig,
    store_credentials: StoreConfig,
}

impl Provisioner {
    /// `store_credentials` are handed to every connector so it can write its
    /// own status and QR codes.
    pub fn new(
        store: Arc<dyn MetadataStore>,
        runtime: Arc<dyn ContainerRuntime>,
        config: ProvisioningConfig,
        store_credentials: StoreConfig,
    ) -> Self {
        Self {
            store,
            runtime,
            config,
            store_credentials,
        }
    }

    /// Provision a new instance and start its connector.
    ///
    /// Returns as soon as the container is started; the connector's own
    /// progress towards `connected` is not awaited.
    #[instrument(skip(self))]
    pub async fn create_instance(&self) -> Result<CreatedInstance, ProvisionError> {
        let instance_id = InstanceId::new();

        self.store
            .insert_instance(&NewInstance {
                id: instance_id,
                status: InstanceStatus::Pending,
            })
            .await
            .map_err(|e| {
                error!(
                    instance_id = %instance_id,
                    error = %error_chain(&e),
                    "Failed to insert instance"
                );
                ProvisionError::Insert(e)
            })?;

        let spec = self.container_spec(instance_id);
        let handle = match self.runtime.run(&spec).await {
            Ok(handle) => handle,
            Err(e) => {
                error!(
                    instance_id = %instance_id,
                    container_name = %spec.name,
                    error = %error_chain(&e),
                    "Failed to start connector container"
                );
                self.mark_failed(instance_id).await;
                return Err(ProvisionError::Container(e));
            }
        };

        let patch = InstancePatch {
            status: Some(InstanceStatus::Starting),
            container_name: Some(handle.name.clone()),
        };
        if let Err(e) = self.store.update_instance(instance_id, &patch).await {
            // The container is up, but the row still says pending.
            error!(
                instance_id = %instance_id,
                container_name = %handle.name,
                container_id = %handle.id,
                error = %error_chain(&e),
                "Connector started but instance could not be marked starting"
            );
            return Err(ProvisionError::MarkStarting {
                container_name: handle.name,
                source: e,
            });
        }

        info!(
            instance_id = %instance_id,
            container_name = %handle.name,
            "Instance provisioned"
        );

        Ok(CreatedInstance {
            instance_id,
            status: InstanceStatus::Starting,
        })
    }

    fn container_spec(&self, instance_id: InstanceId) -> ContainerSpec {
        let env = BTreeMap::from([
            ("INSTANCE_ID".to_string(), instance_id.to_string()),
            ("SUPABASE_URL".to_string(), self.store_credentials.url.clone()),
            ("SUPABASE_KEY".to_string(), self.store_credentials.key.clone()),
        ]);

        ContainerSpec {
            image: self.config.connector_image.clone(),
            name: container_name(instance_id),
            network: self.config.network_name.clone(),
            env,
            restart_policy: RestartPolicy::UnlessStopped,
        }
    }

    /// Best-effort transition to `error`. Failure is logged, never returned:
    /// the caller needs to see the runtime failure, not this one.
    async fn mark_failed(&self, instance_id: InstanceId) {
        let patch = InstancePatch::status(InstanceStatus::Error);
        match self.store.update_instance(instance_id, &patch).await {
            Ok(()) => warn!(instance_id = %instance_id, "Instance marked as error"),
            Err(e) => error!(
                instance_id = %instance_id,
                error = %error_chain(&e),
                "Failed to mark instance as error; row is left pending"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::error_chain;
use crate::runtime::MockRuntime;
    use crate::store::MemoryStore;

    fn provisioner(store: Arc<MemoryStore>, runtime: Arc<MockRuntime>) -> Provisioner {
        Provisioner::new(
            store,
            runtime,
            ProvisioningConfig {
                network_name: "zapi_net".to_string(),
                connector_image: "conector-baileys:latest".to_string(),
            },
            StoreConfig {
                url: "https://db.example".to_string(),
                key: "service-key".to_string(),
            },
        )
    }

    #[tokio::test]
    async fn test_create_instance_marks_starting() {
        let store = Arc::new(MemoryStore::new());
        let runtime = Arc::new(MockRuntime::new());

        let created = provisioner(store.clone(), runtime.clone())
            .create_instance()
            .await
            .unwrap();
        assert_eq!(created.status, InstanceStatus::Starting);

        let record = store.instance(created.instance_id).await.unwrap();
        assert_eq!(record.status, InstanceStatus::Starting);
        assert_eq!(
            record.container_name,
            Some(format!("conector-{}", created.instance_id))
        );
    }

    #[tokio::test]
    async fn test_container_spec_binds_identity_and_credentials() {
        let store = Arc::new(MemoryStore::new());
        let runtime = Arc::new(MockRuntime::new());

        let created = provisioner(store, runtime.clone())
            .create_instance()
            .await
            .unwrap();

        let started = runtime.started().await;
        assert_eq!(started.len(), 1);
        let spec = &started[0];
        assert_eq!(spec.name, container_name(created.instance_id));
        assert_eq!(spec.image, "conector-baileys:latest");
        assert_eq!(spec.network, "zapi_net");
        assert_eq!(spec.restart_policy, RestartPolicy::UnlessStopped);
        assert_eq!(
            spec.env.get("INSTANCE_ID"),
            Some(&created.instance_id.to_string())
        );
        assert_eq!(spec.env.get("SUPABASE_URL").map(String::as_str), Some("https://db.example"));
        assert_eq!(spec.env.get("SUPABASE_KEY").map(String::as_str), Some("service-key"));
    }

    #[tokio::test]
    async fn test_insert_failure_starts_nothing() {
        let store = Arc::new(MemoryStore::new());
        store.fail_inserts(true);
        let runtime = Arc::new(MockRuntime::new());

        let err = provisioner(store.clone(), runtime.clone())
            .create_instance()
            .await
            .unwrap_err();

        assert!(matches!(err, ProvisionError::Insert(_)));
        assert!(runtime.started().await.is_empty());
        assert_eq!(store.instance_count().await, 0);
    }

    #[tokio::test]
    async fn test_runtime_failure_marks_error() {
        let store = Arc::new(MemoryStore::new());
        let runtime = Arc::new(MockRuntime::failing("pull access denied for conector-baileys"));

        let err = provisioner(store.clone(), runtime)
            .create_instance()
            .await
            .unwrap_err();

        assert!(matches!(err, ProvisionError::Container(_)));
        assert!(err.to_string().contains("pull access denied"));

        let records = store.instances().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, InstanceStatus::Error);
        assert_eq!(records[0].container_name, None);
    }

    #[tokio::test]
    async fn test_runtime_failure_reported_even_if_error_update_fails() {
        let store = Arc::new(MemoryStore::new());
        store.fail_updates(true);
        let runtime = Arc::new(MockRuntime::failing("network zapi_net not found"));

        let err = provisioner(store.clone(), runtime)
            .create_instance()
            .await
            .unwrap_err();

        // The runtime failure wins over the swallowed update failure.
        assert!(matches!(err, ProvisionError::Container(_)));
        assert!(err.to_string().contains("network zapi_net not found"));
    }

    #[tokio::test]
    async fn test_starting_update_failure_leaves_container_running() {
        let store = Arc::new(MemoryStore::new());
        store.fail_updates(true);
        let runtime = Arc::new(MockRuntime::new());

        let err = provisioner(store.clone(), runtime.clone())
            .create_instance()
            .await
            .unwrap_err();

        assert!(matches!(err, ProvisionError::MarkStarting { .. }));
        assert_eq!(runtime.started().await.len(), 1);

        let name = &runtime.started().await[0].name;
        let id = name.strip_prefix(CONTAINER_NAME_PREFIX).unwrap().parse().unwrap();
        let record = store.instance(id).await.unwrap();
        assert_eq!(record.status, InstanceStatus::Pending);
        assert_eq!(record.container_name, None);
    }

    #[tokio::test]
    async fn test_two_creates_never_share_identity() {
        let store = Arc::new(MemoryStore::new());
        let runtime = Arc::new(MockRuntime::new());
        let provisioner = provisioner(store.clone(), runtime.clone());

        let a = provisioner.create_instance().await.unwrap();
        let b = provisioner.create_instance().await.unwrap();

        assert_ne!(a.instance_id, b.instance_id);
        let names: Vec<_> = runtime.started().await.into_iter().map(|s| s.name).collect();
        assert_eq!(names.len(), 2);
        assert_ne!(names[0], names[1]);
    }
}
