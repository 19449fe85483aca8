// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application error types with consistent API responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::time_utils::format_remaining;

/// Application error type that converts to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Authentication required")]
    Unauthorized,

    #[error("Invalid or expired session token")]
    InvalidToken,

    #[error("Collector role required")]
    Forbidden,

    #[error("Malformed reward token: {0}")]
    MalformedToken(String),

    #[error("Token deactivated, reactivates at {reactivates_at}")]
    TokenDeactivated {
        /// When the user's token becomes redeemable again (RFC 3339).
        reactivates_at: String,
        /// Remaining cooldown in whole seconds.
        remaining_secs: i64,
    },

    #[error("Invalid credit amount")]
    InvalidAmount,

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Camera unavailable: {0}")]
    CameraUnavailable(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, details) = match &self {
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized", None),
            AppError::InvalidToken => (StatusCode::UNAUTHORIZED, "invalid_token", None),
            AppError::Forbidden => (StatusCode::FORBIDDEN, "forbidden", None),
            AppError::MalformedToken(msg) => (
                StatusCode::BAD_REQUEST,
                "malformed_token",
                Some(msg.clone()),
            ),
            AppError::TokenDeactivated {
                reactivates_at,
                remaining_secs,
            } => (
                StatusCode::CONFLICT,
                "token_deactivated",
                Some(format!(
                    "already collected, try again in {} (at {})",
                    format_remaining(*remaining_secs),
                    reactivates_at
                )),
            ),
            AppError::InvalidAmount => {
                // Award amounts are policy constants; a zero delta is a bug
                // in the caller, not a user error.
                tracing::error!("Credit called with invalid amount");
                (StatusCode::INTERNAL_SERVER_ERROR, "invalid_amount", None)
            }
            AppError::Persistence(msg) => {
                tracing::error!(error = %msg, "Persistence error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "persistence_error",
                    None,
                )
            }
            AppError::CameraUnavailable(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "camera_unavailable",
                Some(msg.clone()),
            ),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", Some(msg.clone())),
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "bad_request", Some(msg.clone()))
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

impl AppError {
    /// True for failures the collector view surfaces as a transient notice
    /// while the scan loop keeps running.
    pub fn is_scan_rejection(&self) -> bool {
        matches!(
            self,
            AppError::MalformedToken(_) | AppError::TokenDeactivated { .. }
        )
    }
}

/// Result type alias for handlers
pub type Result<T> = std::result::Result<T, AppError>;
