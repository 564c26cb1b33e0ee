/// Error handling for the API server
///
/// Handlers return `Result<T, ApiError>`. Every error becomes a JSON body:
///
/// ```json
/// { "error": "not_found", "message": "User not found" }
/// ```
///
/// Validation failures add a `details` array with one entry per field.
///
/// Account deletion failures keep their own codes so clients can tell a
/// clean rollback (`transaction_aborted`, 409) from a deletion that left
/// records behind (`partial_deletion`, 500).

use accord_shared::{
    account::DeleteAccountError,
    auth::{authorization::AuthzError, jwt::JwtError, middleware::AuthError, password::PasswordError},
};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// API result type alias
pub type ApiResult<T> = Result<T, ApiError>;

/// Unified API error type
#[derive(Debug)]
pub enum ApiError {
    /// Bad request (400)
    BadRequest(String),

    /// Unauthorized (401)
    Unauthorized(String),

    /// Forbidden (403)
    Forbidden(String),

    /// Not found (404)
    NotFound(String),

    /// Conflict (409), e.g. duplicate email
    Conflict(String),

    /// Account deletion rolled back (409)
    TransactionAborted(String),

    /// Unprocessable entity (422)
    ValidationError(Vec<ValidationErrorDetail>),

    /// Account deletion stopped half way (500)
    PartialDeletion(String),

    /// Internal server error (500)
    InternalError(String),

    /// Service unavailable (503)
    ServiceUnavailable(String),
}

/// Validation error detail
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationErrorDetail {
    /// Field that failed validation
    pub field: String,

    /// Error message
    pub message: String,
}

impl ValidationErrorDetail {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Error response format
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error code (e.g., "bad_request", "unauthorized")
    pub error: String,

    /// Human-readable error message
    pub message: String,

    /// Per-field validation errors
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<ValidationErrorDetail>>,
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) | ApiError::TransactionAborted(_) => StatusCode::CONFLICT,
            ApiError::ValidationError(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::PartialDeletion(_) | ApiError::InternalError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Unauthorized(_) => "unauthorized",
            ApiError::Forbidden(_) => "forbidden",
            ApiError::NotFound(_) => "not_found",
            ApiError::Conflict(_) => "conflict",
            ApiError::TransactionAborted(_) => "transaction_aborted",
            ApiError::ValidationError(_) => "validation_error",
            ApiError::PartialDeletion(_) => "partial_deletion",
            ApiError::InternalError(_) => "internal_error",
            ApiError::ServiceUnavailable(_) => "service_unavailable",
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            ApiError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            ApiError::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
            ApiError::NotFound(msg) => write!(f, "Not found: {}", msg),
            ApiError::Conflict(msg) => write!(f, "Conflict: {}", msg),
            ApiError::TransactionAborted(msg) => write!(f, "Transaction aborted: {}", msg),
            ApiError::ValidationError(errors) => {
                write!(f, "Validation failed: {} errors", errors.len())
            }
            ApiError::PartialDeletion(msg) => write!(f, "Partial deletion: {}", msg),
            ApiError::InternalError(msg) => write!(f, "Internal error: {}", msg),
            ApiError::ServiceUnavailable(msg) => write!(f, "Service unavailable: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error = self.code().to_string();

        let (message, details) = match self {
            ApiError::ValidationError(errors) => {
                let message = errors
                    .first()
                    .map(|e| e.message.clone())
                    .unwrap_or_else(|| "Request validation failed".to_string());
                (message, Some(errors))
            }
            ApiError::InternalError(msg) => {
                // Log internal errors but don't expose details to clients
                tracing::error!(error = %msg, "Internal error");
                ("An internal error occurred".to_string(), None)
            }
            ApiError::PartialDeletion(msg) => {
                tracing::error!(error = %msg, "Account partially deleted");
                (msg, None)
            }
            ApiError::BadRequest(msg)
            | ApiError::Unauthorized(msg)
            | ApiError::Forbidden(msg)
            | ApiError::NotFound(msg)
            | ApiError::Conflict(msg)
            | ApiError::TransactionAborted(msg)
            | ApiError::ServiceUnavailable(msg) => (msg, None),
        };

        (
            status,
            Json(ErrorResponse {
                error,
                message,
                details,
            }),
        )
            .into_response()
    }
}

/// Convert sqlx errors to API errors
impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => ApiError::NotFound("Resource not found".to_string()),
            sqlx::Error::Database(db_err) => {
                if let Some(constraint) = db_err.constraint() {
                    if constraint.contains("email") {
                        return ApiError::Conflict("Email already exists".to_string());
                    }
                    return ApiError::Conflict(format!("Constraint violation: {}", constraint));
                }

                ApiError::InternalError(format!("Database error: {}", db_err))
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                ApiError::ServiceUnavailable("Database unavailable".to_string())
            }
            _ => ApiError::InternalError(format!("Database error: {}", err)),
        }
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(err: validator::ValidationErrors) -> Self {
        let mut errors: Vec<ValidationErrorDetail> = err
            .field_errors()
            .iter()
            .flat_map(|(field, errors)| {
                errors.iter().map(move |error| {
                    ValidationErrorDetail::new(
                        field.to_string(),
                        error
                            .message
                            .as_ref()
                            .map(|m| m.to_string())
                            .unwrap_or_else(|| format!("{} is invalid", field)),
                    )
                })
            })
            .collect();
        errors.sort_by(|a, b| a.field.cmp(&b.field));

        ApiError::ValidationError(errors)
    }
}

impl From<DeleteAccountError> for ApiError {
    fn from(err: DeleteAccountError) -> Self {
        match err {
            DeleteAccountError::TransactionAborted { .. } => ApiError::TransactionAborted(
                "Account deletion was rolled back, no data was removed. Retry the request."
                    .to_string(),
            ),
            DeleteAccountError::PartialDeletion {
                user_id,
                completed,
                failed,
                source,
            } => {
                tracing::error!(%user_id, %failed, error = %source, "Account deletion left records behind");

                let removed: Vec<String> = completed.iter().map(ToString::to_string).collect();
                ApiError::PartialDeletion(format!(
                    "Account deletion did not complete: {} removed, {} failed",
                    removed.join(", "),
                    failed
                ))
            }
            DeleteAccountError::StorageUnavailable { source } => {
                tracing::warn!(error = %source, "Account storage unavailable");
                ApiError::ServiceUnavailable("Account storage unavailable".to_string())
            }
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingCredentials => {
                ApiError::Unauthorized("Missing credentials".to_string())
            }
            AuthError::InvalidFormat(msg) => ApiError::BadRequest(msg),
            AuthError::InvalidToken(msg) | AuthError::InvalidApiKey(msg) => {
                ApiError::Unauthorized(msg)
            }
            AuthError::DatabaseError(msg) => ApiError::InternalError(msg),
        }
    }
}

impl From<AuthzError> for ApiError {
    fn from(err: AuthzError) -> Self {
        match err {
            AuthzError::UnknownUser(_) => ApiError::NotFound("User not found".to_string()),
            AuthzError::NotAdmin => {
                ApiError::Forbidden("Administrator privileges required".to_string())
            }
            AuthzError::SessionRequired => {
                ApiError::Forbidden("This operation requires a user session".to_string())
            }
            AuthzError::DatabaseError(err) => err.into(),
        }
    }
}

impl From<PasswordError> for ApiError {
    fn from(err: PasswordError) -> Self {
        ApiError::InternalError(format!("Password operation failed: {}", err))
    }
}

impl From<JwtError> for ApiError {
    fn from(err: JwtError) -> Self {
        match err {
            JwtError::CreateError(msg) => {
                ApiError::InternalError(format!("Token creation failed: {}", msg))
            }
            JwtError::Expired => ApiError::Unauthorized("Token expired".to_string()),
            JwtError::InvalidIssuer => ApiError::Unauthorized("Invalid token issuer".to_string()),
            other => ApiError::Unauthorized(format!("Invalid token: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use accord_shared::account::{DeletionStep, StoreError};
    use uuid::Uuid;

    #[test]
    fn test_error_display() {
        let err = ApiError::BadRequest("Invalid input".to_string());
        assert_eq!(err.to_string(), "Bad request: Invalid input");

        let err = ApiError::NotFound("User not found".to_string());
        assert_eq!(err.to_string(), "Not found: User not found");
    }

    #[test]
    fn test_validation_error() {
        let err = ApiError::ValidationError(vec![
            ValidationErrorDetail::new("email", "Invalid email format"),
            ValidationErrorDetail::new("password", "Password too short"),
        ]);
        assert_eq!(err.to_string(), "Validation failed: 2 errors");
        assert_eq!(err.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn test_deletion_errors_map_to_distinct_statuses() {
        let aborted: ApiError = DeleteAccountError::TransactionAborted {
            source: StoreError::Backend("x".to_string()),
        }
        .into();
        let partial: ApiError = DeleteAccountError::PartialDeletion {
            user_id: Uuid::new_v4(),
            completed: vec![DeletionStep::User],
            failed: DeletionStep::Subscriptions,
            source: StoreError::Backend("x".to_string()),
        }
        .into();
        let unavailable: ApiError = DeleteAccountError::StorageUnavailable {
            source: StoreError::Backend("x".to_string()),
        }
        .into();

        assert_eq!(aborted.status_code(), StatusCode::CONFLICT);
        assert_eq!(aborted.code(), "transaction_aborted");
        assert_eq!(partial.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(partial.code(), "partial_deletion");
        assert!(partial.to_string().contains("user removed, subscriptions failed"));
        assert_eq!(unavailable.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_partial_deletion_hides_storage_error() {
        let partial: ApiError = DeleteAccountError::PartialDeletion {
            user_id: Uuid::new_v4(),
            completed: vec![DeletionStep::User, DeletionStep::Subscriptions],
            failed: DeletionStep::Keys,
            source: StoreError::Backend("relation \"api_keys\" does not exist".to_string()),
        }
        .into();

        let message = match &partial {
            ApiError::PartialDeletion(msg) => msg.clone(),
            other => panic!("unexpected error: {:?}", other),
        };
        assert_eq!(
            message,
            "Account deletion did not complete: user, subscriptions removed, keys failed"
        );
        assert!(!message.contains("api_keys"));
    }

    #[test]
    fn test_authz_mapping() {
        assert_eq!(
            ApiError::from(AuthzError::NotAdmin).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::from(AuthError::MissingCredentials).status_code(),
            StatusCode::UNAUTHORIZED
        );
    }
}
