//! Pairing code lookup.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, instrument};
use zapi_id::InstanceId;

use crate::store::{MetadataStore, StoreError};

#[derive(Debug, Error)]
pub enum QrLookupError {
    /// The connector has not published a pairing code yet. Expected early in
    /// an instance's life.
    #[error("QR code not available yet")]
    NotYetAvailable,

    #[error("store read failed: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LatestQr {
    pub instance_id: InstanceId,
    pub qr_string: String,
}

#[derive(Clone)]
pub struct QrLookup {
    store: Arc<dyn MetadataStore>,
}

impl QrLookup {
    pub fn new(store: Arc<dyn MetadataStore>) -> Self {
        Self { store }
    }

    /// Most recent pairing code for an instance.
    #[instrument(skip(self))]
    pub async fn latest(&self, instance_id: InstanceId) -> Result<LatestQr, QrLookupError> {
        let Some(record) = self.store.latest_qr_code(instance_id).await? else {
            debug!(instance_id = %instance_id, "No QR code published yet");
            return Err(QrLookupError::NotYetAvailable);
        };

        Ok(LatestQr {
            instance_id,
            qr_string: record.qr_string,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, NewQrCode};
    use chrono::{Duration, Utc};
    use zapi_id::QrCodeId;

    #[tokio::test]
    async fn test_no_qr_yet() {
        let lookup = QrLookup::new(Arc::new(MemoryStore::new()));
        let err = lookup.latest(InstanceId::new()).await.unwrap_err();
        assert!(matches!(err, QrLookupError::NotYetAvailable));
    }

    #[tokio::test]
    async fn test_returns_rotated_code() {
        let store = Arc::new(MemoryStore::new());
        let id = InstanceId::new();
        let now = Utc::now();
        for (qr, at) in [("first", now - Duration::seconds(20)), ("second", now)] {
            store
                .push_qr_code(NewQrCode {
                    id: QrCodeId::new(),
                    instance_id: id,
                    qr_string: qr.to_string(),
                    created_at: at,
                })
                .await;
        }

        let latest = QrLookup::new(store).latest(id).await.unwrap();
        assert_eq!(
            latest,
            LatestQr {
                instance_id: id,
                qr_string: "second".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_store_failure_is_not_not_found() {
        let store = Arc::new(MemoryStore::new());
        store.fail_reads(true);
        let err = QrLookup::new(store)
            .latest(InstanceId::new())
            .await
            .unwrap_err();
        assert!(matches!(err, QrLookupError::Store(_)));
    }
}
