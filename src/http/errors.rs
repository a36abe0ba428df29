//! Error envelope for HTTP responses.
//!
//! # Responsibilities
//! - Tag every response with `X-Trace-Id`
//! - Render every 4xx/5xx response as a JSON error envelope
//! - Hide internal error details unless explicitly allowed
//!
//! # Envelope
//! ```text
//! {"trace_id": "...", "error": {"code": 404, "index": 0, "message": "Not Found"}}
//! ```
//!
//! # Design Decisions
//! - Handlers return `ApiError`; framework errors (404, 405, 408) are mapped
//!   from their status code
//! - Masked internal errors carry index `service_id * 10000`

use axum::{
    extract::{Request, State},
    http::{header, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::config::HttpServerConfig;

/// Response header carrying the trace ID.
pub const TRACE_ID_HEADER: &str = "x-trace-id";

/// Request header the trace ID is taken from.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Message shown in place of masked internal errors.
pub const INTERNAL_ERROR_MESSAGE: &str = "internal server error";

/// Error details inside the envelope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
    /// HTTP status code.
    pub code: u16,
    /// Service-specific error index.
    pub index: u32,
    /// Human-readable message.
    pub message: String,
}

/// JSON body of every failed response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorResponse {
    pub trace_id: String,
    pub error: ErrorBody,
}

/// Error returned by request handlers.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ApiError {
    status: StatusCode,
    index: u32,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, index: u32, message: impl Into<String>) -> Self {
        Self {
            status,
            index,
            message: message.into(),
        }
    }

    pub fn bad_request(index: u32, message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, index, message)
    }

    pub fn not_found(index: u32, message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, index, message)
    }

    pub fn internal(index: u32, message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, index, message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn index(&self) -> u32 {
        self.index
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        // Unmasked fallback body; the envelope middleware rewrites it.
        let body = ErrorResponse {
            trace_id: String::new(),
            error: ErrorBody {
                code: self.status.as_u16(),
                index: self.index,
                message: self.message.clone(),
            },
        };
        let mut response = (self.status, Json(body)).into_response();
        response.extensions_mut().insert(self);
        response
    }
}

/// How failed responses are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorPolicy {
    pub service_id: u32,
    pub show_unknown_errors: bool,
}

impl From<&HttpServerConfig> for ErrorPolicy {
    fn from(config: &HttpServerConfig) -> Self {
        Self {
            service_id: config.service_id,
            show_unknown_errors: config.show_unknown_errors,
        }
    }
}

impl ErrorPolicy {
    /// Index reported for masked internal errors.
    pub fn masked_index(&self) -> u32 {
        self.service_id.saturating_mul(10_000)
    }

    /// Build the envelope body for a failed response.
    pub fn render(&self, status: StatusCode, error: Option<&ApiError>) -> ErrorBody {
        let code = status.as_u16();
        if status.is_server_error() && !self.show_unknown_errors {
            return ErrorBody {
                code,
                index: self.masked_index(),
                message: INTERNAL_ERROR_MESSAGE.to_string(),
            };
        }

        match error {
            Some(e) => ErrorBody {
                code,
                index: e.index,
                message: e.message.clone(),
            },
            None => ErrorBody {
                code,
                index: 0,
                message: status.canonical_reason().unwrap_or("Unknown Error").to_string(),
            },
        }
    }
}

/// Middleware wrapping failed responses in the error envelope.
pub async fn error_envelope(
    State(policy): State<ErrorPolicy>,
    request: Request,
    next: Next,
) -> Response {
    let trace_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let path = request.uri().path().to_owned();

    let response = next.run(request).await;
    let status = response.status();

    let mut response = if status.is_client_error() || status.is_server_error() {
        let error = policy.render(status, response.extensions().get::<ApiError>());
        tracing::warn!(
            trace_id = %trace_id,
            path = %path,
            status = status.as_u16(),
            index = error.index,
            message = %error.message,
            "Request failed"
        );

        let (parts, _body) = response.into_parts();
        let mut rendered = (
            status,
            Json(ErrorResponse {
                trace_id: trace_id.clone(),
                error,
            }),
        )
            .into_response();
        for (name, value) in parts.headers.iter() {
            if name != header::CONTENT_TYPE && name != header::CONTENT_LENGTH {
                rendered.headers_mut().append(name.clone(), value.clone());
            }
        }
        rendered
    } else {
        response
    };

    if let Ok(value) = HeaderValue::from_str(&trace_id) {
        response.headers_mut().insert(TRACE_ID_HEADER, value);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, middleware, routing::get, Router};
    use tower::ServiceExt;

    fn app(policy: ErrorPolicy) -> Router {
        Router::new()
            .route("/ok", get(|| async { "fine" }))
            .route(
                "/missing",
                get(|| async { Err::<(), _>(ApiError::not_found(3, "user not found")) }),
            )
            .route(
                "/boom",
                get(|| async { Err::<(), _>(ApiError::internal(7, "db pool exhausted")) }),
            )
            .layer(middleware::from_fn_with_state(policy, error_envelope))
    }

    async fn call(router: Router, uri: &str) -> (StatusCode, Option<String>, Vec<u8>) {
        let request = axum::http::Request::builder()
            .uri(uri)
            .header(REQUEST_ID_HEADER, "req-1")
            .body(Body::empty())
            .unwrap();
        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let trace = response
            .headers()
            .get(TRACE_ID_HEADER)
            .map(|v| v.to_str().unwrap().to_string());
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, trace, body.to_vec())
    }

    const POLICY: ErrorPolicy = ErrorPolicy {
        service_id: 42,
        show_unknown_errors: false,
    };

    #[tokio::test]
    async fn test_success_gets_trace_header_only() {
        let (status, trace, body) = call(app(POLICY), "/ok").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(trace.as_deref(), Some("req-1"));
        assert_eq!(body, b"fine");
    }

    #[tokio::test]
    async fn test_handler_error_envelope() {
        let (status, trace, body) = call(app(POLICY), "/missing").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(trace.as_deref(), Some("req-1"));

        let envelope: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(envelope.trace_id, "req-1");
        assert_eq!(
            envelope.error,
            ErrorBody {
                code: 404,
                index: 3,
                message: "user not found".into()
            }
        );
    }

    #[tokio::test]
    async fn test_unmatched_route_uses_canonical_reason() {
        let (status, _, body) = call(app(POLICY), "/nope").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let envelope: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(envelope.error.index, 0);
        assert_eq!(envelope.error.message, "Not Found");
    }

    #[tokio::test]
    async fn test_internal_error_is_masked() {
        let (status, _, body) = call(app(POLICY), "/boom").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let envelope: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(envelope.error.index, 420_000);
        assert_eq!(envelope.error.message, INTERNAL_ERROR_MESSAGE);
    }

    #[test]
    fn test_masked_index_saturates() {
        let policy = ErrorPolicy {
            service_id: 500_000,
            show_unknown_errors: false,
        };
        assert_eq!(policy.masked_index(), u32::MAX);

        let body = policy.render(StatusCode::BAD_GATEWAY, None);
        assert_eq!(body.index, u32::MAX);
        assert_eq!(body.message, INTERNAL_ERROR_MESSAGE);
    }

    #[tokio::test]
    async fn test_internal_error_shown_when_allowed() {
        let policy = ErrorPolicy {
            show_unknown_errors: true,
            ..POLICY
        };
        let (_, _, body) = call(app(policy), "/boom").await;
        let envelope: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(envelope.error.index, 7);
        assert_eq!(envelope.error.message, "db pool exhausted");
    }
}
