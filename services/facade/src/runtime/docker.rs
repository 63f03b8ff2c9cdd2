//! Docker Engine API client.
//!
//! Talks to the local Docker daemon over its Unix socket. Running a
//! container is two calls: create (which also attaches the network and sets
//! the restart policy) followed by start.
//!
//! Reference: https://docs.docker.com/engine/api/latest/

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use hyper::{body::Bytes, Body, Client, Method, Request, StatusCode};
use hyperlocal::{UnixClientExt, UnixConnector, Uri};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument};

use super::{ContainerHandle, ContainerRuntime, ContainerSpec, RuntimeError};

/// Docker daemon client for Unix socket communication.
pub struct DockerRuntime {
    socket_path: String,
    client: Client<UnixConnector>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct CreateContainerBody<'a> {
    image: &'a str,
    env: Vec<String>,
    host_config: HostConfig<'a>,
    networking_config: NetworkingConfig<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct HostConfig<'a> {
    network_mode: &'a str,
    restart_policy: RestartPolicyBody,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct RestartPolicyBody {
    name: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct NetworkingConfig<'a> {
    endpoints_config: BTreeMap<&'a str, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CreateContainerResponse {
    id: String,
    #[serde(default)]
    warnings: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

impl DockerRuntime {
    /// Create a new client for the daemon socket at the given path.
    pub fn new<P: AsRef<Path>>(socket_path: P) -> Self {
        let socket_path = socket_path.as_ref().to_string_lossy().to_string();
        let client = Client::unix();
        Self {
            socket_path,
            client,
        }
    }

    /// Create a container without starting it.
    async fn create(&self, spec: &ContainerSpec) -> Result<String, RuntimeError> {
        let body = CreateContainerBody {
            image: &spec.image,
            env: spec.env.iter().map(|(k, v)| format!("{k}={v}")).collect(),
            host_config: HostConfig {
                network_mode: &spec.network,
                restart_policy: RestartPolicyBody {
                    name: spec.restart_policy.as_str(),
                },
            },
            networking_config: NetworkingConfig {
                endpoints_config: BTreeMap::from([(
                    spec.network.as_str(),
                    serde_json::json!({}),
                )]),
            },
        };
        let body =
            serde_json::to_vec(&body).map_err(|e| RuntimeError::InvalidRequest(e.to_string()))?;

        let path = format!("/containers/create?name={}", spec.name);
        let (status, bytes) = self.request(Method::POST, &path, Some(body)).await?;
        if status != StatusCode::CREATED {
            return Err(api_error(status, &bytes));
        }

        let created: CreateContainerResponse = serde_json::from_slice(&bytes)
            .map_err(|e| RuntimeError::InvalidRequest(format!("unexpected create response: {e}")))?;
        for warning in created.warnings.unwrap_or_default() {
            debug!(name = %spec.name, warning = %warning, "Docker create warning");
        }

        Ok(created.id)
    }

    /// Start a created container.
    async fn start(&self, id: &str) -> Result<(), RuntimeError> {
        let path = format!("/containers/{id}/start");
        let (status, bytes) = self.request(Method::POST, &path, None).await?;

        // 304: already started.
        if status.is_success() || status == StatusCode::NOT_MODIFIED {
            Ok(())
        } else {
            Err(api_error(status, &bytes))
        }
    }

    /// Perform a request against the daemon socket.
    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
    ) -> Result<(StatusCode, Bytes), RuntimeError> {
        let uri = Uri::new(&self.socket_path, path);

        debug!(method = %method, path = path, "Request to Docker API");

        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("Accept", "application/json");
        let request = match body {
            Some(body) => builder
                .header("Content-Type", "application/json")
                .body(Body::from(body)),
            None => builder.body(Body::empty()),
        }
        .map_err(|e| RuntimeError::InvalidRequest(e.to_string()))?;

        let response = self
            .client
            .request(request)
            .await
            .map_err(RuntimeError::Transport)?;
        let status = response.status();
        let bytes = hyper::body::to_bytes(response.into_body())
            .await
            .map_err(RuntimeError::Transport)?;

        Ok((status, bytes))
    }
}

fn api_error(status: StatusCode, body: &[u8]) -> RuntimeError {
    let explanation = match serde_json::from_slice::<ErrorBody>(body) {
        Ok(parsed) => parsed.message,
        Err(_) => String::from_utf8_lossy(body).trim().to_string(),
    };
    error!(status = %status, explanation = %explanation, "Docker API error");
    RuntimeError::Api {
        status: status.as_u16(),
        explanation,
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    #[instrument(skip(self, spec), fields(name = %spec.name, image = %spec.image))]
    async fn run(&self, spec: &ContainerSpec) -> Result<ContainerHandle, RuntimeError> {
        let id = self.create(spec).await?;
        // A container that fails to start here is left behind in the
        // "created" state.
        self.start(&id).await?;

        info!(container_id = %id, network = %spec.network, "Container started");

        Ok(ContainerHandle {
            id,
            name: spec.name.clone(),
        })
    }

    async fn ping(&self) -> Result<(), RuntimeError> {
        let (status, bytes) = self.request(Method::GET, "/_ping", None).await?;
        if status.is_success() {
            Ok(())
        } else {
            Err(api_error(status, &bytes))
        }
    }
}
