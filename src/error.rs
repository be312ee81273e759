use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use std::any::Any;
use thiserror::Error;

/// The single message returned for every failed login, whatever factor failed.
pub const INVALID_CREDENTIALS_MESSAGE: &str = "Invalid username or password";

/// The application's error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// A database error.
    #[error("Database error: {0}")]
    Database(#[from] tokio_postgres::Error),

    /// A connection pool error.
    #[error("Pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    /// A pool construction error.
    #[error("Pool creation error: {0}")]
    PoolCreation(#[from] deadpool_postgres::CreatePoolError),

    /// A Redis error.
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// A session store call ran past its deadline.
    #[error("Session store timed out after {0} ms")]
    StoreTimeout(u64),

    /// A row was missing a column the mapper expected.
    #[error("Missing data: {0}")]
    MissingData(String),

    /// Bad identifier or bad password. Deliberately carries no detail.
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// No authenticated principal is attached to the request.
    #[error("Authentication required")]
    Unauthenticated,

    /// A validation error.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The password hashing primitive failed.
    #[error("Hashing error: {0}")]
    Hashing(String),

    /// An encryption error.
    #[error("Encryption error: {0}")]
    Encryption(String),

    /// An internal server error.
    #[error("Internal server error: {0}")]
    Internal(String),

    /// A rate limit exceeded error.
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),
}

/// A `Result` type that uses `AppError` as the error type.
pub type Result<T> = std::result::Result<T, AppError>;

impl AppError {
    /// The status code this error is rendered with.
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::InvalidCredentials | AppError::Unauthenticated => StatusCode::UNAUTHORIZED,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::RateLimitExceeded(_) => StatusCode::TOO_MANY_REQUESTS,
            AppError::StoreTimeout(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            AppError::Database(ref e) => {
                tracing::error!("Database error: {}", e);
                "Database error".to_string()
            }

            AppError::Pool(ref e) => {
                tracing::error!("Pool error: {}", e);
                "Database error".to_string()
            }

            AppError::PoolCreation(ref e) => {
                tracing::error!("Pool creation error: {}", e);
                "Database error".to_string()
            }

            AppError::Redis(ref e) => {
                tracing::error!("Redis error: {}", e);
                "Cache error".to_string()
            }

            AppError::StoreTimeout(ms) => {
                tracing::error!("Session store timed out after {} ms", ms);
                "Service temporarily unavailable".to_string()
            }

            AppError::MissingData(ref column) => {
                tracing::error!("Missing column in row: {}", column);
                "Internal server error".to_string()
            }

            AppError::InvalidCredentials => INVALID_CREDENTIALS_MESSAGE.to_string(),

            AppError::Unauthenticated => {
                tracing::debug!("Request without an authenticated principal");
                "Authentication required".to_string()
            }

            AppError::Validation(ref msg) => {
                tracing::debug!("Validation error: {}", msg);
                msg.clone()
            }

            AppError::Hashing(ref msg) => {
                tracing::error!("Hashing error: {}", msg);
                "Internal server error".to_string()
            }

            AppError::Encryption(ref msg) => {
                tracing::error!("Encryption error: {}", msg);
                "Encryption error".to_string()
            }

            AppError::Internal(ref msg) => {
                tracing::error!("Internal error: {}", msg);
                "Internal server error".to_string()
            }

            AppError::RateLimitExceeded(ref msg) => {
                tracing::warn!("Rate limit exceeded: {}", msg);
                msg.clone()
            }
        };

        let body = sonic_rs::to_string(&sonic_rs::json!({
            "error": message
        }))
        .unwrap_or_else(|_| r#"{"error":"Internal server error"}"#.to_string());

        (
            status,
            [(http::header::CONTENT_TYPE, "application/json")],
            body,
        )
            .into_response()
    }
}

/// Turns a caught handler panic into the usual JSON 500.
///
/// The connection is closed afterwards since the panicking task may have left
/// the request body half read.
pub fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else if let Some(msg) = panic.downcast_ref::<&str>() {
        msg.to_string()
    } else {
        "unknown panic payload".to_string()
    };

    let mut response = AppError::Internal(format!("Handler panicked: {}", detail)).into_response();
    response
        .headers_mut()
        .insert(header::CONNECTION, HeaderValue::from_static("close"));
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_failures_share_one_status() {
        assert_eq!(AppError::InvalidCredentials.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::Unauthenticated.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn infrastructure_failures_are_server_faults() {
        assert_eq!(
            AppError::Internal("boom".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(AppError::StoreTimeout(50).status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(AppError::Hashing("bad".into()).status().is_server_error());
    }

    #[test]
    fn panics_become_a_closing_500() {
        let response = panic_response(Box::new("index out of bounds"));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.headers()[header::CONNECTION], "close");
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
    }
}
