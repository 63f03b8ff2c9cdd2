//! Metadata store access for the `instances` and `qr_codes` collections.
//!
//! This module provides:
//! - Record types for both collections
//! - The [`MetadataStore`] capability the rest of the service is written against
//! - A PostgREST-backed implementation and an in-memory one for tests
//!
//! Instance records are written by two parties: this service (initial
//! `pending`, then `starting`/`error` together with `container_name`) and the
//! connector process (every later status). Updates therefore only ever carry
//! the fields being changed; see [`InstancePatch`].

mod error;
mod memory;
mod postgrest;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use postgrest::{Filter, PostgrestClient, PostgrestStore, Select, StoreConfig};

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use zapi_id::{InstanceId, QrCodeId};

/// Collection holding one row per connector instance.
pub const INSTANCES: &str = "instances";

/// Collection holding the pairing codes published by connectors.
pub const QR_CODES: &str = "qr_codes";

/// Lifecycle status of an instance.
///
/// The first three values are written by the provisioner. Everything after
/// `starting` belongs to the connector, which may invent statuses this
/// service has never heard of; those are kept verbatim in [`Other`].
///
/// [`Other`]: InstanceStatus::Other
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum InstanceStatus {
    Pending,
    Starting,
    Error,
    Connected,
    Disconnected,
    Other(String),
}

impl InstanceStatus {
    pub fn as_str(&self) -> &str {
        match self {
            InstanceStatus::Pending => "pending",
            InstanceStatus::Starting => "starting",
            InstanceStatus::Error => "error",
            InstanceStatus::Connected => "connected",
            InstanceStatus::Disconnected => "disconnected",
            InstanceStatus::Other(s) => s,
        }
    }
}

impl From<String> for InstanceStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "pending" => InstanceStatus::Pending,
            "starting" => InstanceStatus::Starting,
            "error" => InstanceStatus::Error,
            "connected" => InstanceStatus::Connected,
            "disconnected" => InstanceStatus::Disconnected,
            _ => InstanceStatus::Other(s),
        }
    }
}

impl From<InstanceStatus> for String {
    fn from(status: InstanceStatus) -> Self {
        match status {
            InstanceStatus::Other(s) => s,
            other => other.as_str().to_string(),
        }
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Row inserted when an instance is first created.
#[derive(Debug, Clone, Serialize)]
pub struct NewInstance {
    pub id: InstanceId,
    pub status: InstanceStatus,
}

/// Partial update of an instance row.
///
/// Unset fields are omitted from the request entirely, so a patch never
/// clobbers a field owned by the other writer.
#[derive(Debug, Clone, Default, Serialize)]
pub struct InstancePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<InstanceStatus>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_name: Option<String>,
}

impl InstancePatch {
    pub fn status(status: InstanceStatus) -> Self {
        Self {
            status: Some(status),
            container_name: None,
        }
    }
}

/// Full instance row, as held by [`MemoryStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceRecord {
    pub id: InstanceId,
    pub status: InstanceStatus,
    pub container_name: Option<String>,
}

/// Where an instance's connector can be reached.
///
/// Only the container name is read for routing; the status column is written
/// by the connector too and is not needed to decide where to send a message.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ConnectorAddress {
    #[serde(default)]
    pub container_name: Option<String>,
}

/// QR code row as published by a connector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewQrCode {
    pub id: QrCodeId,
    pub instance_id: InstanceId,
    pub qr_string: String,
    pub created_at: DateTime<Utc>,
}

/// Latest QR code payload for an instance.
///
/// `created_at` is only used for ordering on the store side and is never
/// decoded; connectors do not always write it with an offset.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct QrCodeRecord {
    pub qr_string: String,
}

/// Typed access to the metadata store.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Insert a new instance row.
    async fn insert_instance(&self, record: &NewInstance) -> Result<(), StoreError>;

    /// Apply a partial update to the instance row with the given id.
    ///
    /// Updating a row that does not exist is not an error.
    async fn update_instance(&self, id: InstanceId, patch: &InstancePatch)
        -> Result<(), StoreError>;

    /// Look up the connector address of an instance. `None` when no row
    /// has this id.
    async fn connector_address(
        &self,
        id: InstanceId,
    ) -> Result<Option<ConnectorAddress>, StoreError>;

    /// Fetch the most recently created QR code for an instance.
    async fn latest_qr_code(
        &self,
        instance_id: InstanceId,
    ) -> Result<Option<QrCodeRecord>, StoreError>;

    /// Check that the store is reachable.
    async fn health_check(&self) -> Result<(), StoreError>;
}
