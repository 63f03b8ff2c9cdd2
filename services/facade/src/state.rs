//! Application state shared across request handlers.

use std::sync::Arc;

use crate::config::Config;
use crate::provisioner::Provisioner;
use crate::qr::QrLookup;
use crate::router::{ConnectorClient, MessageRouter};
use crate::runtime::ContainerRuntime;
use crate::store::MetadataStore;

/// Shared application state.
///
/// This is passed to all request handlers via Axum's state extractor. The
/// store and runtime clients are constructed once at startup and injected
/// here; nothing else in the process holds request-spanning mutable state.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    store: Arc<dyn MetadataStore>,
    runtime: Arc<dyn ContainerRuntime>,
    provisioner: Provisioner,
    qr: QrLookup,
    router: MessageRouter,
}

impl AppState {
    /// Create a new application state around the given clients.
    pub fn new(
        store: Arc<dyn MetadataStore>,
        runtime: Arc<dyn ContainerRuntime>,
        config: &Config,
    ) -> Result<Self, reqwest::Error> {
        let connector = ConnectorClient::new(&config.connector)?;

        let provisioner = Provisioner::new(
            store.clone(),
            runtime.clone(),
            config.provisioning.clone(),
            config.store.clone(),
        );
        let qr = QrLookup::new(store.clone());
        let router = MessageRouter::new(store.clone(), connector);

        Ok(Self {
            inner: Arc::new(AppStateInner {
                store,
                runtime,
                provisioner,
                qr,
                router,
            }),
        })
    }

    pub fn store(&self) -> &dyn MetadataStore {
        self.inner.store.as_ref()
    }

    pub fn runtime(&self) -> &dyn ContainerRuntime {
        self.inner.runtime.as_ref()
    }

    pub fn provisioner(&self) -> &Provisioner {
        &self.inner.provisioner
    }

    pub fn qr(&self) -> &QrLookup {
        &self.inner.qr
    }

    pub fn router(&self) -> &MessageRouter {
        &self.inner.router
    }
}
