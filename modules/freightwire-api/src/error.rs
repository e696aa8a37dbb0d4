//! API error type: `{detail, code}` JSON bodies with matching HTTP status.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use freightwire_common::FreightwireError;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub detail: String,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    detail: &'a str,
    code: &'a str,
}

impl ApiError {
    pub fn not_found(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            code: "not_found",
            detail: detail.into(),
        }
    }

    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: "bad_request",
            detail: detail.into(),
        }
    }

    pub fn unauthorized(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            code: "unauthorized",
            detail: detail.into(),
        }
    }

    pub fn forbidden(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::FORBIDDEN,
            code: "forbidden",
            detail: detail.into(),
        }
    }

    pub fn unavailable(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            code: "unavailable",
            detail: detail.into(),
        }
    }

    pub fn conflict(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::CONFLICT,
            code: "conflict",
            detail: detail.into(),
        }
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "internal",
            detail: detail.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            detail: &self.detail,
            code: self.code,
        });
        let mut response = (self.status, body).into_response();
        if self.status == StatusCode::TOO_MANY_REQUESTS {
            response
                .headers_mut()
                .insert("Retry-After", axum::http::HeaderValue::from_static("60"));
        }
        response
    }
}

impl From<FreightwireError> for ApiError {
    fn from(e: FreightwireError) -> Self {
        match e {
            FreightwireError::Auth(detail) => ApiError::unauthorized(detail),
            FreightwireError::RateLimited => ApiError {
                status: StatusCode::TOO_MANY_REQUESTS,
                code: "rate_limited",
                detail: "rate limit exceeded".to_string(),
            },
            FreightwireError::Capacity(detail) => ApiError {
                status: StatusCode::SERVICE_UNAVAILABLE,
                code: "capacity",
                detail,
            },
            FreightwireError::Validation(detail) => ApiError::bad_request(detail),
            FreightwireError::Config(detail) => ApiError::internal(detail),
            FreightwireError::Database(detail) => {
                tracing::error!(error = %detail, "store error");
                ApiError::internal("storage failure")
            }
            FreightwireError::Network(detail) => ApiError {
                status: StatusCode::BAD_GATEWAY,
                code: "upstream",
                detail,
            },
            FreightwireError::Parse(detail) => ApiError::bad_request(detail),
            FreightwireError::Anyhow(e) => ApiError::internal(e.to_string()),
        }
    }
}
