use axum::{
    http::{header::CONTENT_TYPE, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::provisioner::ProvisionError;
use crate::qr::QrLookupError;
use crate::report::error_chain;
use crate::router::RouteError;

#[derive(Debug, Serialize)]
pub struct ProblemDetails {
    #[serde(rename = "type")]
    pub r#type: String,
    pub title: String,
    pub status: u16,
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
    pub code: String,
    pub request_id: String,
    pub retryable: bool,
}

impl ProblemDetails {
    fn new(status: StatusCode, code: impl Into<String>, detail: impl Into<String>) -> Self {
        let code = code.into();
        let title = status
            .canonical_reason()
            .unwrap_or("Unknown Error")
            .to_string();
        Self {
            r#type: format!("https://zapi.dev/problems/{code}"),
            title,
            status: status.as_u16(),
            detail: detail.into(),
            instance: None,
            code,
            request_id: "unknown".to_string(),
            retryable: false,
        }
    }

    fn set_request_id(&mut self, request_id: impl Into<String>) {
        let request_id = request_id.into();
        self.request_id = request_id.clone();
        if self.instance.is_none() {
            self.instance = Some(request_id);
        }
    }
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub problem: Box<ProblemDetails>,
}

impl ApiError {
    pub fn new(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Self {
        let problem = Box::new(ProblemDetails::new(status, code, message));
        Self { status, problem }
    }

    pub fn bad_request(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, code, message)
    }

    pub fn not_found(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, code, message)
    }

    pub fn internal(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, code, message)
    }

    pub fn bad_gateway(code: impl Into<String>, message: impl Into<String>) -> Self {
        let mut error = Self::new(StatusCode::BAD_GATEWAY, code, message);
        error.problem.retryable = true;
        error
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.problem.set_request_id(request_id);
        self
    }
}

impl From<ProvisionError> for ApiError {
    fn from(err: ProvisionError) -> Self {
        let code = match &err {
            ProvisionError::Insert(_) => "instance_record_failed",
            ProvisionError::Container(_) => "container_start_failed",
            ProvisionError::MarkStarting { .. } => "instance_update_failed",
        };
        ApiError::internal(code, error_chain(&err))
    }
}

impl From<QrLookupError> for ApiError {
    fn from(err: QrLookupError) -> Self {
        match err {
            QrLookupError::NotYetAvailable => ApiError::not_found(
                "qr_not_available",
                "QR code not available yet for this instance",
            ),
            QrLookupError::Store(e) => ApiError::internal(
                "store_error",
                format!("Failed to read QR code: {}", error_chain(&e)),
            ),
        }
    }
}

impl From<RouteError> for ApiError {
    fn from(err: RouteError) -> Self {
        match &err {
            RouteError::InstanceNotFound(_) => {
                ApiError::not_found("instance_not_found", err.to_string())
            }
            RouteError::ConnectorNotActive(_) => {
                ApiError::bad_request("connector_not_active", err.to_string())
            }
            RouteError::Store(e) => ApiError::internal(
                "store_error",
                format!("Failed to read instance: {}", error_chain(e)),
            ),
            RouteError::Unreachable { .. } | RouteError::Upstream(_) => {
                ApiError::bad_gateway("connector_unreachable", error_chain(&err))
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut response = (self.status, Json(self.problem)).into_response();
        response.headers_mut().insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/problem+json"),
        );
        response
    }
}
