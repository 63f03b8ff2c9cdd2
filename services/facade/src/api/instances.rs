//! Instance API endpoints.
//!
//! Provides instance creation, pairing code lookup, and outbound text
//! messages relayed to the instance's connector.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::header::CONTENT_TYPE,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use zapi_id::InstanceId;

use crate::api::error::ApiError;
use crate::api::request_context::RequestContext;
use crate::provisioner::CreatedInstance;
use crate::qr::LatestQr;
use crate::report::error_chain;
use crate::router::{ConnectorReply, RouteError, SendText};
use crate::state::AppState;

/// Create instance routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/create", post(create_instance))
        .route("/{instance_id}/qr", get(latest_qr))
        .route("/{instance_id}/send-text", post(send_text))
}

// =============================================================================
// Handlers
// =============================================================================

/// Provision a new instance and start its connector.
///
/// POST /instance/create
async fn create_instance(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<Json<CreatedInstance>, ApiError> {
    let created = state.provisioner().create_instance().await.map_err(|e| {
        tracing::error!(
            error = %error_chain(&e),
            request_id = %ctx.request_id,
            "Failed to create instance"
        );
        ApiError::from(e).with_request_id(ctx.request_id.clone())
    })?;

    Ok(Json(created))
}

/// Most recent pairing code for an instance.
///
/// GET /instance/{instance_id}/qr
async fn latest_qr(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(instance_id): Path<String>,
) -> Result<Json<LatestQr>, ApiError> {
    let instance_id = parse_instance_id(&instance_id, &ctx)?;

    let latest = state
        .qr()
        .latest(instance_id)
        .await
        .map_err(|e| ApiError::from(e).with_request_id(ctx.request_id.clone()))?;

    Ok(Json(latest))
}

/// Relay a text message to the instance's connector.
///
/// POST /instance/{instance_id}/send-text
async fn send_text(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(instance_id): Path<String>,
    payload: Result<Json<SendText>, JsonRejection>,
) -> Result<Response, ApiError> {
    let instance_id = parse_instance_id(&instance_id, &ctx)?;

    let Json(payload) = payload.map_err(|rejection| {
        ApiError::new(rejection.status(), "invalid_payload", rejection.body_text())
            .with_request_id(ctx.request_id.clone())
    })?;

    match state.router().send_text(instance_id, &payload).await {
        Ok(reply) | Err(RouteError::Upstream(reply)) => Ok(relay(reply)),
        Err(e) => {
            tracing::warn!(
                error = %error_chain(&e),
                instance_id = %instance_id,
                request_id = %ctx.request_id,
                "Failed to relay message"
            );
            Err(ApiError::from(e).with_request_id(ctx.request_id.clone()))
        }
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// A path segment that is not an instance id cannot name an instance.
fn parse_instance_id(raw: &str, ctx: &RequestContext) -> Result<InstanceId, ApiError> {
    raw.parse().map_err(|_| {
        ApiError::not_found("instance_not_found", format!("instance {raw} not found"))
            .with_request_id(ctx.request_id.clone())
    })
}

/// Turn a connector reply into a response with the same status, content
/// type, and body bytes.
fn relay(reply: ConnectorReply) -> Response {
    let mut response = (reply.status, reply.body).into_response();
    match reply.content_type {
        Some(content_type) => {
            response.headers_mut().insert(CONTENT_TYPE, content_type);
        }
        None => {
            response.headers_mut().remove(CONTENT_TYPE);
        }
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderValue, StatusCode};
    use bytes::Bytes;

    #[test]
    fn test_relay_preserves_status_type_and_body() {
        let response = relay(ConnectorReply {
            status: StatusCode::UNPROCESSABLE_ENTITY,
            content_type: Some(HeaderValue::from_static("application/json; charset=utf-8")),
            body: Bytes::from_static(br#"{"error":"bad number"}"#),
        });

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            "application/json; charset=utf-8"
        );
    }

    #[test]
    fn test_relay_without_content_type() {
        let response = relay(ConnectorReply {
            status: StatusCode::OK,
            content_type: None,
            body: Bytes::new(),
        });
        assert!(response.headers().get(CONTENT_TYPE).is_none());
    }

    #[test]
    fn test_non_uuid_path_is_not_found() {
        let ctx = RequestContext {
            request_id: "req-1".to_string(),
        };
        let err = parse_instance_id("conector-abc", &ctx).unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }
}
