//! Outbound message routing.
//!
//! A connector is addressed by its container name on the shared network.
//! The name is looked up in the store on every request; nothing is cached,
//! so a re-provisioned or re-addressed instance is picked up immediately.
//!
//! Replies are relayed without interpretation: whatever status, content type,
//! and bytes the connector returns are what the caller gets.

use std::sync::Arc;

use bytes::Bytes;
use reqwest::header::{HeaderValue, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument, warn};
use zapi_id::InstanceId;

use crate::config::ConnectorConfig;
use crate::store::{MetadataStore, StoreError};

/// Text message request, forwarded to the connector as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendText {
    /// Recipient number with country and area code.
    pub to: String,

    /// Plain-text message body.
    pub text: String,
}

/// Raw connector response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectorReply {
    pub status: StatusCode,
    pub content_type: Option<HeaderValue>,
    pub body: Bytes,
}

#[derive(Debug, Error)]
pub enum RouteError {
    #[error("instance {0} not found")]
    InstanceNotFound(InstanceId),

    /// The instance exists but has no container to talk to.
    #[error("connector for instance {0} is not active")]
    ConnectorNotActive(InstanceId),

    #[error("store read failed: {0}")]
    Store(#[from] StoreError),

    #[error("connector at {address} unreachable: {source}")]
    Unreachable {
        address: String,
        #[source]
        source: reqwest::Error,
    },

    /// The connector answered with an error status; relayed verbatim.
    #[error("connector returned {}", .0.status)]
    Upstream(ConnectorReply),
}

/// HTTP client for connector relay endpoints.
#[derive(Clone)]
pub struct ConnectorClient {
    client: reqwest::Client,
    port: u16,
}

impl ConnectorClient {
    pub fn new(config: &ConnectorConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self {
            client,
            port: config.port,
        })
    }

    /// Relay endpoint of the connector running in `container_name`.
    pub fn send_text_url(&self, container_name: &str) -> String {
        format!("http://{}:{}/send-text", container_name, self.port)
    }

    /// POST the payload to the connector and collect its raw reply.
    pub async fn send_text(
        &self,
        container_name: &str,
        payload: &SendText,
    ) -> Result<ConnectorReply, RouteError> {
        let address = self.send_text_url(container_name);
        debug!(address = %address, "Forwarding message to connector");

        let unreachable = |source: reqwest::Error| RouteError::Unreachable {
            address: address.clone(),
            source,
        };

        let response = self
            .client
            .post(&address)
            .json(payload)
            .send()
            .await
            .map_err(unreachable)?;

        let status = response.status();
        let content_type = response.headers().get(CONTENT_TYPE).cloned();
        let body = response.bytes().await.map_err(unreachable)?;

        Ok(ConnectorReply {
            status,
            content_type,
            body,
        })
    }
}

#[derive(Clone)]
pub struct MessageRouter {
    store: Arc<dyn MetadataStore>,
    connector: ConnectorClient,
}

impl MessageRouter {
    pub fn new(store: Arc<dyn MetadataStore>, connector: ConnectorClient) -> Self {
        Self { store, connector }
    }

    /// Forward a text message to the instance's connector.
    ///
    /// Each failure is reported once; nothing is retried.
    #[instrument(skip(self, payload))]
    pub async fn send_text(
        &self,
        instance_id: InstanceId,
        payload: &SendText,
    ) -> Result<ConnectorReply, RouteError> {
        let address = self
            .store
            .connector_address(instance_id)
            .await?
            .ok_or(RouteError::InstanceNotFound(instance_id))?;

        let container_name = address
            .container_name
            .filter(|name| !name.trim().is_empty())
            .ok_or(RouteError::ConnectorNotActive(instance_id))?;

        let reply = self.connector.send_text(&container_name, payload).await?;
        if !reply.status.is_success() {
            warn!(
                instance_id = %instance_id,
                container_name = %container_name,
                status = %reply.status,
                "Connector returned an error"
            );
            return Err(RouteError::Upstream(reply));
        }

        Ok(reply)
    }
}
