//! In-memory metadata store.
//!
//! Used by tests and local development in place of the real store. Each kind
//! of operation can be switched to fail so the error paths of callers can be
//! exercised.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;
use zapi_id::InstanceId;

use super::{
    ConnectorAddress, InstancePatch, InstanceRecord, MetadataStore, NewInstance, NewQrCode,
    QrCodeRecord, StoreError,
};

#[derive(Default)]
pub struct MemoryStore {
    instances: RwLock<HashMap<InstanceId, InstanceRecord>>,
    qr_codes: RwLock<Vec<NewQrCode>>,
    fail_inserts: AtomicBool,
    fail_updates: AtomicBool,
    fail_reads: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every insert fail.
    pub fn fail_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::SeqCst);
    }

    /// Make every update fail.
    pub fn fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }

    /// Make every read (including health checks) fail.
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Write an instance row directly, as the connector would.
    pub async fn put_instance(&self, record: InstanceRecord) {
        self.instances.write().await.insert(record.id, record);
    }

    /// Publish a QR code, as the connector would.
    pub async fn push_qr_code(&self, qr: NewQrCode) {
        self.qr_codes.write().await.push(qr);
    }

    /// Read an instance row without going through failure injection.
    pub async fn instance(&self, id: InstanceId) -> Option<InstanceRecord> {
        self.instances.read().await.get(&id).cloned()
    }

    /// Every instance row, in no particular order.
    pub async fn instances(&self) -> Vec<InstanceRecord> {
        self.instances.read().await.values().cloned().collect()
    }

    pub async fn instance_count(&self) -> usize {
        self.instances.read().await.len()
    }

    fn check(flag: &AtomicBool, op: &str) -> Result<(), StoreError> {
        if flag.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(format!("{op} disabled")));
        }
        Ok(())
    }
}

#[async_trait]
impl MetadataStore for MemoryStore {
    async fn insert_instance(&self, record: &NewInstance) -> Result<(), StoreError> {
        Self::check(&self.fail_inserts, "insert")?;

        let mut instances = self.instances.write().await;
        if instances.contains_key(&record.id) {
            return Err(StoreError::Rejected {
                status: 409,
                message: format!("duplicate key value: id={}", record.id),
            });
        }
        instances.insert(
            record.id,
            InstanceRecord {
                id: record.id,
                status: record.status.clone(),
                container_name: None,
            },
        );
        Ok(())
    }

    async fn update_instance(
        &self,
        id: InstanceId,
        patch: &InstancePatch,
    ) -> Result<(), StoreError> {
        Self::check(&self.fail_updates, "update")?;

        if let Some(record) = self.instances.write().await.get_mut(&id) {
            if let Some(status) = &patch.status {
                record.status = status.clone();
            }
            if let Some(container_name) = &patch.container_name {
                record.container_name = Some(container_name.clone());
            }
        }
        Ok(())
    }

    async fn connector_address(
        &self,
        id: InstanceId,
    ) -> Result<Option<ConnectorAddress>, StoreError> {
        Self::check(&self.fail_reads, "read")?;
        Ok(self
            .instances
            .read()
            .await
            .get(&id)
            .map(|record| ConnectorAddress {
                container_name: record.container_name.clone(),
            }))
    }

    async fn latest_qr_code(
        &self,
        instance_id: InstanceId,
    ) -> Result<Option<QrCodeRecord>, StoreError> {
        Self::check(&self.fail_reads, "read")?;

        let qr_codes = self.qr_codes.read().await;
        let latest = qr_codes
            .iter()
            .filter(|qr| qr.instance_id == instance_id)
            .max_by_key(|qr| qr.created_at)
            .map(|qr| QrCodeRecord {
                qr_string: qr.qr_string.clone(),
            });
        Ok(latest)
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Self::check(&self.fail_reads, "read")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InstanceStatus;
    use chrono::{Duration, Utc};
    use zapi_id::QrCodeId;

    #[tokio::test]
    async fn test_latest_qr_code_picks_newest_for_instance() {
        let store = MemoryStore::new();
        let id = InstanceId::new();
        let other = InstanceId::new();
        let now = Utc::now();

        for (instance_id, qr, at) in [
            (id, "old", now - Duration::seconds(40)),
            (id, "new", now),
            (id, "middle", now - Duration::seconds(20)),
            (other, "newest-elsewhere", now + Duration::seconds(5)),
        ] {
            store
                .push_qr_code(NewQrCode {
                    id: QrCodeId::new(),
                    instance_id,
                    qr_string: qr.to_string(),
                    created_at: at,
                })
                .await;
        }

        let latest = store.latest_qr_code(id).await.unwrap().unwrap();
        assert_eq!(latest.qr_string, "new");
    }

    #[tokio::test]
    async fn test_update_only_touches_patched_fields() {
        let store = MemoryStore::new();
        let id = InstanceId::new();
        store
            .put_instance(InstanceRecord {
                id,
                status: InstanceStatus::Starting,
                container_name: Some("conector-x".to_string()),
            })
            .await;

        store
            .update_instance(id, &InstancePatch::status(InstanceStatus::Connected))
            .await
            .unwrap();

        let record = store.instance(id).await.unwrap();
        assert_eq!(record.status, InstanceStatus::Connected);
        assert_eq!(record.container_name.as_deref(), Some("conector-x"));
    }

    #[tokio::test]
    async fn test_duplicate_insert_is_rejected() {
        let store = MemoryStore::new();
        let record = NewInstance {
            id: InstanceId::new(),
            status: InstanceStatus::Pending,
        };

        store.insert_instance(&record).await.unwrap();
        let err = store.insert_instance(&record).await.unwrap_err();
        assert!(matches!(err, StoreError::Rejected { status: 409, .. }));
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let store = MemoryStore::new();
        store.fail_reads(true);
        assert!(store.connector_address(InstanceId::new()).await.is_err());
        assert!(store.health_check().await.is_err());

        store.fail_reads(false);
        assert!(store.health_check().await.is_ok());
    }
}
