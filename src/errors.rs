// ABOUTME: Unified error type for the broker boundary with stable error codes and HTTP mapping
// ABOUTME: Converts domain, persistence and provider errors; internal detail never reaches clients
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Agent Broker Contributors

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use broker_core::DomainError;
use serde::Serialize;
use std::fmt;
use tracing::error;

use crate::database::DatabaseError;
use crate::providers::ProviderError;

/// Result alias used across services and handlers
pub type AppResult<T> = Result<T, AppError>;

/// Stable error codes exposed to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Malformed or missing input
    InvalidInput,
    /// No trusted caller identity
    AuthRequired,
    /// Absent, or deliberately masked as absent
    ResourceNotFound,
    /// Secret or grant unusable, handshake not finishable, adapter missing
    FailedPrecondition,
    /// Lost a concurrent state-guarded update
    Conflict,
    /// Unexpected failure
    InternalError,
    /// Persistence failure
    DatabaseError,
    /// Upstream provider failure
    ExternalServiceError,
    /// Invalid or missing configuration
    ConfigError,
}

impl ErrorCode {
    /// HTTP status for this code
    #[must_use]
    pub const fn http_status(self) -> StatusCode {
        match self {
            Self::InvalidInput => StatusCode::BAD_REQUEST,
            Self::AuthRequired => StatusCode::UNAUTHORIZED,
            Self::ResourceNotFound => StatusCode::NOT_FOUND,
            Self::FailedPrecondition => StatusCode::PRECONDITION_FAILED,
            Self::Conflict => StatusCode::CONFLICT,
            Self::InternalError | Self::DatabaseError | Self::ConfigError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::ExternalServiceError => StatusCode::BAD_GATEWAY,
        }
    }

    /// Whether the message may contain internal detail
    const fn is_internal(self) -> bool {
        matches!(
            self,
            Self::InternalError | Self::DatabaseError | Self::ConfigError
        )
    }

    const fn public_message(self) -> &'static str {
        match self {
            Self::InvalidInput => "invalid input",
            Self::AuthRequired => "authentication required",
            Self::ResourceNotFound => "not found",
            Self::FailedPrecondition => "failed precondition",
            Self::Conflict => "conflict",
            Self::InternalError | Self::DatabaseError | Self::ConfigError => {
                "internal server error"
            }
            Self::ExternalServiceError => "upstream provider error",
        }
    }
}

/// Boundary error: a code plus a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppError {
    /// Error code
    pub code: ErrorCode,
    /// Message; only shown to callers for non-internal codes
    pub message: String,
}

impl AppError {
    /// Create an error with an explicit code
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Validation failure
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    /// Missing or untrusted caller identity
    pub fn auth_required(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::AuthRequired, message)
    }

    /// Absent or not visible to the caller
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ResourceNotFound, message)
    }

    /// State does not allow the operation
    pub fn failed_precondition(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::FailedPrecondition, message)
    }

    /// Concurrent writer won
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Conflict, message)
    }

    /// Unexpected failure
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    /// Persistence failure
    pub fn database(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DatabaseError, message)
    }

    /// Upstream provider failure
    pub fn external_service(provider: &str, message: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::ExternalServiceError,
            format!("{provider}: {}", message.into()),
        )
    }

    /// Configuration failure
    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConfigError, message)
    }

    /// Map store conflicts to a failed precondition, as workflow layers report them
    #[must_use]
    pub fn conflict_as_precondition(self) -> Self {
        if self.code == ErrorCode::Conflict {
            Self::failed_precondition(self.message)
        } else {
            self
        }
    }

    /// HTTP status for this error
    #[must_use]
    pub const fn http_status(&self) -> StatusCode {
        self.code.http_status()
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {}

impl From<DomainError> for AppError {
    fn from(err: DomainError) -> Self {
        if err.is_transition() {
            Self::failed_precondition(err.to_string())
        } else {
            Self::invalid_input(err.to_string())
        }
    }
}

impl From<DatabaseError> for AppError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::NotFound { .. } => Self::not_found(err.to_string()),
            DatabaseError::Conflict { .. } => Self::conflict(err.to_string()),
            DatabaseError::QueryError { .. } | DatabaseError::CorruptRow { .. } => {
                Self::database(err.to_string())
            }
        }
    }
}

impl From<ProviderError> for AppError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::NotConfigured { .. } => Self::failed_precondition(err.to_string()),
            ProviderError::Request { .. }
            | ProviderError::Status { .. }
            | ProviderError::MalformedResponse { .. } => {
                Self::new(ErrorCode::ExternalServiceError, err.to_string())
            }
        }
    }
}

/// JSON error body
#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    code: ErrorCode,
    message: &'a str,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.http_status();
        let message = if self.code.is_internal() {
            error!(code = ?self.code, detail = %self.message, "Request failed with internal error");
            self.code.public_message()
        } else {
            self.message.as_str()
        };
        let body = ErrorBody {
            code: self.code,
            message,
        };
        (status, Json(body)).into_response()
    }
}
