//! Response envelope and error mapping for the REST surface.
//!
//! Every response body is `{"success": bool, "data"?: ..., "error"?: code,
//! "message"?: text}`.

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{FromRequest, FromRequestParts};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use outreach_core::OutreachError;
use serde::Serialize;
use tracing::{error, warn};
use utoipa::ToSchema;

/// Success envelope.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            message: None,
        })
    }

    pub fn created(data: T) -> (StatusCode, Json<Self>) {
        (StatusCode::CREATED, Self::ok(data))
    }
}

impl ApiResponse<()> {
    pub fn message(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            success: true,
            data: None,
            message: Some(message.into()),
        })
    }
}

/// Failure envelope.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Always `false`.
    pub success: bool,
    /// `VALIDATION_ERROR`, `NOT_FOUND`, `CONFLICT` or `INTERNAL_ERROR`.
    pub error: String,
    pub message: String,
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Error returned by handlers; renders as an [`ErrorBody`].
#[derive(Debug)]
pub struct ApiError(OutreachError);

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match &self.0 {
            OutreachError::Validation(_) => StatusCode::BAD_REQUEST,
            OutreachError::NotFound(_) => StatusCode::NOT_FOUND,
            OutreachError::Conflict(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn public_message(&self) -> String {
        match &self.0 {
            OutreachError::Validation(m)
            | OutreachError::NotFound(m)
            | OutreachError::Conflict(m) => m.clone(),
            _ => "Internal server error".to_string(),
        }
    }
}

impl From<OutreachError> for ApiError {
    fn from(err: OutreachError) -> Self {
        Self(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(OutreachError::validation(rejection.body_text()))
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self(OutreachError::validation(rejection.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self(OutreachError::validation(rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if self.0.is_internal() {
            error!(error = %self.0, "Request failed");
        } else {
            warn!(code = self.0.code(), error = %self.0, "Request rejected");
        }
        metrics::counter!("api.errors", "code" => self.0.code()).increment(1);

        let body = ErrorBody {
            success: false,
            error: self.0.code().to_string(),
            message: self.public_message(),
        };
        (status, Json(body)).into_response()
    }
}

/// `Json` whose rejection renders through [`ApiError`].
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

/// `Path` whose rejection renders through [`ApiError`].
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ApiError))]
pub struct ApiPath<T>(pub T);

/// `Query` whose rejection renders through [`ApiError`].
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct ApiQuery<T>(pub T);
