//! Typed error handling for the corral engine
//!
//! Every error raised by the engine is a [`CorralError`], carrying an HTTP
//! status code, a machine-readable code string, and an optional details
//! payload. Errors propagate unchanged up to the transport boundary, where
//! they serialize to the wire shape:
//!
//! ```json
//! {"error": {"code": "NOT_FOUND", "message": "...", "details": {...}}}
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use corral::prelude::*;
//!
//! match engine.get(&id, &params, user).await {
//!     Ok(result) => { /* ... */ }
//!     Err(CorralError::NotFound { collection, id }) => {
//!         println!("{} {} is gone", collection, id);
//!     }
//!     Err(e) => eprintln!("Other error: {}", e),
//! }
//! ```

use axum::http::StatusCode;
use serde::Serialize;
use std::fmt;

/// The main error type for the corral engine
///
/// Variants map one-to-one onto the engine's error taxonomy; each knows its
/// HTTP status and stable error code.
#[derive(Debug)]
pub enum CorralError {
    /// Malformed or disallowed filter/sort/projection/body input.
    ///
    /// Carries a specific machine-readable code (e.g. `UNSUPPORTED_OPERATOR`,
    /// `RESERVED_FIELD_PREFIX`) so clients can distinguish rejection causes.
    BadRequest {
        code: &'static str,
        message: String,
        details: Option<serde_json::Value>,
    },

    /// Schema validation failure on create/replace, with per-field errors.
    Validation(Vec<FieldValidationError>),

    /// A permission rule is present but no authenticated user was supplied.
    Unauthorized { message: String },

    /// The authenticated user lacks a required role, or a custom permission
    /// predicate denied the operation.
    Forbidden { message: String },

    /// The target record of a get/replace/patch/delete does not exist.
    NotFound { collection: String, id: String },

    /// Anything else: hook-thrown errors, store-driver failures.
    Internal(String),
}

/// A single field validation error
#[derive(Debug, Clone, Serialize)]
pub struct FieldValidationError {
    pub field: String,
    pub message: String,
}

impl fmt::Display for CorralError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CorralError::BadRequest { message, .. } => write!(f, "{}", message),
            CorralError::Validation(errors) => {
                let msgs: Vec<String> = errors
                    .iter()
                    .map(|e| format!("{}: {}", e.field, e.message))
                    .collect();
                write!(f, "Validation failed: {}", msgs.join(", "))
            }
            CorralError::Unauthorized { message } => write!(f, "Unauthorized: {}", message),
            CorralError::Forbidden { message } => write!(f, "Forbidden: {}", message),
            CorralError::NotFound { collection, id } => {
                write!(f, "{} with id '{}' not found", collection, id)
            }
            CorralError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for CorralError {}

/// Error envelope serialized inside the top-level `error` key
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Error code for programmatic handling
    pub code: String,
    /// Human-readable error message
    pub message: String,
    /// Optional additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Wire response: `{"error": {...}}`
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

impl CorralError {
    /// Build a `BadRequest` with a specific machine-readable code.
    pub fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        CorralError::BadRequest {
            code,
            message: message.into(),
            details: None,
        }
    }

    /// Build a `BadRequest` with a details payload attached.
    pub fn bad_request_with(
        code: &'static str,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        CorralError::BadRequest {
            code,
            message: message.into(),
            details: Some(details),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        CorralError::Unauthorized {
            message: message.into(),
        }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        CorralError::Forbidden {
            message: message.into(),
        }
    }

    pub fn not_found(collection: impl Into<String>, id: impl Into<String>) -> Self {
        CorralError::NotFound {
            collection: collection.into(),
            id: id.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        CorralError::Internal(message.into())
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            CorralError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            CorralError::Validation(_) => StatusCode::BAD_REQUEST,
            CorralError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            CorralError::Forbidden { .. } => StatusCode::FORBIDDEN,
            CorralError::NotFound { .. } => StatusCode::NOT_FOUND,
            CorralError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            CorralError::BadRequest { code, .. } => code,
            CorralError::Validation(_) => "VALIDATION_ERROR",
            CorralError::Unauthorized { .. } => "UNAUTHORIZED",
            CorralError::Forbidden { .. } => "FORBIDDEN",
            CorralError::NotFound { .. } => "NOT_FOUND",
            CorralError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Get additional details for the error
    fn details(&self) -> Option<serde_json::Value> {
        match self {
            CorralError::BadRequest { details, .. } => details.clone(),
            CorralError::Validation(errors) => Some(serde_json::json!({ "fields": errors })),
            CorralError::NotFound { collection, id } => Some(serde_json::json!({
                "collection": collection,
                "id": id,
            })),
            _ => None,
        }
    }

    /// Convert to the wire envelope.
    ///
    /// In production mode, `Internal` messages are replaced with a generic
    /// string so driver/hook internals never leak to clients. The caller is
    /// responsible for logging the original before converting.
    pub fn to_response(&self, production: bool) -> ErrorResponse {
        let message = match self {
            CorralError::Internal(_) if production => "Internal server error".to_string(),
            other => other.to_string(),
        };
        ErrorResponse {
            error: ErrorBody {
                code: self.error_code().to_string(),
                message,
                details: self.details(),
            },
        }
    }
}

/// Wrap untyped errors at the boundary into `Internal`.
impl From<anyhow::Error> for CorralError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<CorralError>() {
            Ok(engine_err) => engine_err,
            Err(other) => CorralError::Internal(other.to_string()),
        }
    }
}

/// A specialized Result type for corral operations
pub type CorralResult<T> = Result<T, CorralError>;
