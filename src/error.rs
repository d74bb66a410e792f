use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::api::response::ApiResponse;

#[derive(Debug, Error)]
pub enum AppError {
    // Auth errors
    #[error("Email or password incorrect")]
    InvalidCredentials,
    #[error("Not logged in")]
    Unauthorized,
    #[error("Permission denied")]
    Forbidden,

    // User errors
    #[error("Email not registered")]
    UserNotFound,
    #[error("Email already registered")]
    UserAlreadyExists,

    // OTP errors
    #[error("Verification code incorrect")]
    InvalidOtp,

    // WeChat login errors
    #[error("Not logged in")]
    LoginPending,
    #[error("Not logged in")]
    LoginNotConfirmed,

    // Todo errors
    #[error("Task not found")]
    TaskNotFound,
    #[error("Tag not found")]
    TagNotFound,

    // Validation errors
    #[error("{0}")]
    Validation(String),
    #[error("Bad request: {0}")]
    BadRequest(String),

    // Upstream provider errors
    #[error("Upstream error: {0}")]
    Upstream(String),
    #[error("Upstream access token rejected: {0}")]
    StaleAccessToken(String),

    // Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    // Redis errors
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    // JWT errors
    #[error("JWT error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    // Internal errors
    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::InvalidCredentials
            | AppError::UserNotFound
            | AppError::UserAlreadyExists
            | AppError::InvalidOtp
            | AppError::LoginNotConfirmed
            | AppError::TaskNotFound
            | AppError::TagNotFound
            | AppError::Validation(_)
            | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,

            AppError::Unauthorized | AppError::LoginPending | AppError::Jwt(_) => {
                StatusCode::UNAUTHORIZED
            }

            AppError::Forbidden => StatusCode::FORBIDDEN,

            AppError::Upstream(_)
            | AppError::StaleAccessToken(_)
            | AppError::Database(_)
            | AppError::Redis(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<reqwest::Error> for AppError {
    fn from(e: reqwest::Error) -> Self {
        AppError::Upstream(e.to_string())
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let message = match &self {
            AppError::Upstream(e) | AppError::StaleAccessToken(e) => {
                tracing::error!("Upstream provider error: {}", e);
                "Upstream service unavailable".to_string()
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                "Database error".to_string()
            }
            AppError::Redis(e) => {
                tracing::error!("Redis error: {}", e);
                "Cache error".to_string()
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {:#}", e);
                "Internal server error".to_string()
            }
            AppError::Jwt(_) => "Not logged in".to_string(),
            AppError::Validation(msg) | AppError::BadRequest(msg) => msg.clone(),
            other => other.to_string(),
        };

        ApiResponse::<()>::error(self.status(), message).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
