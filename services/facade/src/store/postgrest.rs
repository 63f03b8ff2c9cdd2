//! PostgREST client for the metadata store.
//!
//! The store is a Supabase project; its REST interface exposes each table
//! under `{url}/rest/v1/{table}` and authenticates with the service key in
//! both the `apikey` and `Authorization` headers.

use std::fmt;

use async_trait::async_trait;
use reqwest::{header::HeaderValue, Method, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, error, instrument};
use zapi_id::InstanceId;

use super::{
    ConnectorAddress, InstancePatch, MetadataStore, NewInstance, QrCodeRecord, StoreError,
    INSTANCES, QR_CODES,
};

/// Store connection settings.
#[derive(Clone)]
pub struct StoreConfig {
    /// Project URL, e.g. `https://xyz.supabase.co`.
    pub url: String,

    /// Service key. Also handed to connector containers.
    pub key: String,
}

impl fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreConfig")
            .field("url", &self.url)
            .field("key", &"<redacted>")
            .finish()
    }
}

/// Equality filter on a single column (`?{field}=eq.{value}`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub field: String,
    pub value: String,
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl ToString) -> Self {
        Self {
            field: field.into(),
            value: value.to_string(),
        }
    }

    fn query_pair(&self) -> (String, String) {
        (self.field.clone(), format!("eq.{}", self.value))
    }
}

/// A filtered, ordered, limited select.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Select {
    pub columns: String,
    pub filter: Option<Filter>,
    /// Column to sort on, newest first.
    pub order_desc: Option<String>,
    pub limit: Option<usize>,
}

impl Select {
    pub fn columns(columns: impl Into<String>) -> Self {
        Self {
            columns: columns.into(),
            filter: None,
            order_desc: None,
            limit: None,
        }
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn order_desc(mut self, column: impl Into<String>) -> Self {
        self.order_desc = Some(column.into());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    fn query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = vec![("select".to_string(), self.columns.clone())];
        if let Some(filter) = &self.filter {
            pairs.push(filter.query_pair());
        }
        if let Some(column) = &self.order_desc {
            pairs.push(("order".to_string(), format!("{column}.desc")));
        }
        if let Some(limit) = self.limit {
            pairs.push(("limit".to_string(), limit.to_string()));
        }
        pairs
    }
}

/// Untyped collection access: insert, filtered update, filtered select.
#[derive(Clone)]
pub struct PostgrestClient {
    client: reqwest::Client,
    base_url: String,
    key: String,
}

impl PostgrestClient {
    /// Create a new client for the given project.
    pub fn new(config: &StoreConfig) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(StoreError::Transport)?;

        Ok(Self {
            client,
            base_url: format!("{}/rest/v1", config.url.trim_end_matches('/')),
            key: config.key.clone(),
        })
    }

    /// Insert one record into a collection.
    pub async fn insert<T: Serialize + ?Sized>(
        &self,
        collection: &str,
        record: &T,
    ) -> Result<(), StoreError> {
        debug!(collection, "Inserting record");

        let response = self
            .request(Method::POST, collection)
            .header("Prefer", "return=minimal")
            .json(record)
            .send()
            .await
            .map_err(StoreError::Transport)?;

        check_status(response).await?;
        Ok(())
    }

    /// Update the given fields on every record matching `filter`.
    pub async fn update<T: Serialize + ?Sized>(
        &self,
        collection: &str,
        filter: &Filter,
        fields: &T,
    ) -> Result<(), StoreError> {
        debug!(collection, field = %filter.field, value = %filter.value, "Updating records");

        let response = self
            .request(Method::PATCH, collection)
            .header("Prefer", "return=minimal")
            .query(&[filter.query_pair()])
            .json(fields)
            .send()
            .await
            .map_err(StoreError::Transport)?;

        check_status(response).await?;
        Ok(())
    }

    /// Run a select and decode the resulting rows.
    pub async fn select<T: DeserializeOwned>(
        &self,
        collection: &str,
        select: &Select,
    ) -> Result<Vec<T>, StoreError> {
        debug!(collection, columns = %select.columns, "Selecting records");

        let response = self
            .request(Method::GET, collection)
            .query(&select.query_pairs())
            .send()
            .await
            .map_err(StoreError::Transport)?;

        let response = check_status(response).await?;
        let body = response.bytes().await.map_err(StoreError::Transport)?;

        serde_json::from_slice(&body).map_err(|e| StoreError::Decode(e.to_string()))
    }

    fn request(&self, method: Method, collection: &str) -> RequestBuilder {
        let url = format!("{}/{}", self.base_url, collection);
        let bearer = format!("Bearer {}", self.key);

        let mut builder = self.client.request(method, url).header("apikey", &self.key);
        match HeaderValue::from_str(&bearer) {
            Ok(mut value) => {
                value.set_sensitive(true);
                builder = builder.header(reqwest::header::AUTHORIZATION, value);
            }
            Err(_) => {
                // The apikey header alone still identifies the project; the
                // store answers 401 if it is not enough.
                error!("Store key is not a valid header value");
            }
        }
        builder
    }
}

async fn check_status(response: Response) -> Result<Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = response.text().await.unwrap_or_default();
    error!(status = %status, message = %message, "Store rejected request");
    Err(StoreError::Rejected {
        status: status.as_u16(),
        message,
    })
}

/// [`MetadataStore`] backed by a Supabase project.
#[derive(Clone)]
pub struct PostgrestStore {
    client: PostgrestClient,
}

impl PostgrestStore {
    pub fn new(config: &StoreConfig) -> Result<Self, StoreError> {
        Ok(Self {
            client: PostgrestClient::new(config)?,
        })
    }
}

#[async_trait]
impl MetadataStore for PostgrestStore {
    #[instrument(skip(self, record), fields(instance_id = %record.id))]
    async fn insert_instance(&self, record: &NewInstance) -> Result<(), StoreError> {
        self.client.insert(INSTANCES, record).await
    }

    #[instrument(skip(self, patch))]
    async fn update_instance(
        &self,
        id: InstanceId,
        patch: &InstancePatch,
    ) -> Result<(), StoreError> {
        self.client
            .update(INSTANCES, &Filter::eq("id", id), patch)
            .await
    }

    #[instrument(skip(self))]
    async fn connector_address(
        &self,
        id: InstanceId,
    ) -> Result<Option<ConnectorAddress>, StoreError> {
        let select = Select::columns("container_name")
            .filter(Filter::eq("id", id))
            .limit(1);

        let rows: Vec<ConnectorAddress> = self.client.select(INSTANCES, &select).await?;
        Ok(rows.into_iter().next())
    }

    #[instrument(skip(self))]
    async fn latest_qr_code(
        &self,
        instance_id: InstanceId,
    ) -> Result<Option<QrCodeRecord>, StoreError> {
        let select = Select::columns("qr_string")
            .filter(Filter::eq("instance_id", instance_id))
            .order_desc("created_at")
            .limit(1);

        let rows: Vec<QrCodeRecord> = self.client.select(QR_CODES, &select).await?;
        Ok(rows.into_iter().next())
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        let select = Select::columns("id").limit(1);
        let _: Vec<serde_json::Value> = self.client.select(INSTANCES, &select).await?;
        Ok(())
    }
}
