/// Request body validation
///
/// [`ValidatedJson`] deserializes a JSON body and runs its `validator`
/// rules before the handler sees it. Both malformed field values and rule
/// violations answer 422 with per-field details; a body that is not JSON at
/// all answers 400.
///
/// The free functions below are the field rules shared by several request
/// types, referenced from `#[validate(custom(function = "..."))]`.

use crate::error::{ApiError, ValidationErrorDetail};
use accord_shared::auth::password::check_password_policy;
use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequest, Request},
    Json,
};
use serde::de::DeserializeOwned;
use std::borrow::Cow;
use uuid::Uuid;
use validator::{Validate, ValidateEmail, ValidationError};

/// Longest accepted first or last name
pub const MAX_NAME_LENGTH: usize = 20;

/// Longest accepted email address
pub const MAX_EMAIL_LENGTH: usize = 50;

/// Longest accepted API key description
pub const MAX_DESCRIPTION_LENGTH: usize = 50;

const FORBIDDEN_NAME_CHARS: &str = "!@#$%^&*(){}[]\\.;'\",<>/?`~|";

/// JSON body that passed validation
#[derive(Debug, Clone)]
pub struct ValidatedJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(json_rejection)?;

        value.validate()?;
        Ok(ValidatedJson(value))
    }
}

fn json_rejection(rejection: JsonRejection) -> ApiError {
    match rejection {
        JsonRejection::JsonDataError(e) => {
            ApiError::ValidationError(vec![ValidationErrorDetail::new("body", e.body_text())])
        }
        other => ApiError::BadRequest(other.body_text()),
    }
}

fn invalid(code: &'static str, message: impl Into<Cow<'static, str>>) -> ValidationError {
    let mut error = ValidationError::new(code);
    error.message = Some(message.into());
    error
}

fn check_name(label: &str, value: &str) -> Result<(), ValidationError> {
    let name = value.trim();
    let length = name.chars().count();

    if length == 0 || length > MAX_NAME_LENGTH {
        return Err(invalid(
            "name_length",
            format!("{} must be between 1 and {} characters", label, MAX_NAME_LENGTH),
        ));
    }

    if name
        .chars()
        .any(|c| c.is_ascii_digit() || FORBIDDEN_NAME_CHARS.contains(c))
    {
        return Err(invalid(
            "name_characters",
            format!("{} must not contain numbers or special characters", label),
        ));
    }

    Ok(())
}

/// Rule for `first_name`
pub fn validate_first_name(value: &str) -> Result<(), ValidationError> {
    check_name("First name", value)
}

/// Rule for `last_name`
pub fn validate_last_name(value: &str) -> Result<(), ValidationError> {
    check_name("Last name", value)
}

/// Email rule, applied to the trimmed address
///
/// Handlers trim before lookups, so surrounding whitespace is accepted here.
pub fn validate_email(value: &str) -> Result<(), ValidationError> {
    let email = value.trim();

    if email.chars().count() > MAX_EMAIL_LENGTH {
        return Err(invalid(
            "email_length",
            format!("Email must be at most {} characters", MAX_EMAIL_LENGTH),
        ));
    }

    if !email.validate_email() {
        return Err(invalid("email", "Invalid email format"));
    }

    Ok(())
}

/// Password length policy
pub fn validate_password(value: &str) -> Result<(), ValidationError> {
    check_password_policy(value).map_err(|message| invalid("password_length", message))
}

/// Rule for API key descriptions: letters and spaces only
pub fn validate_key_description(value: &str) -> Result<(), ValidationError> {
    let description = value.trim();
    let length = description.chars().count();

    if length == 0 || length > MAX_DESCRIPTION_LENGTH {
        return Err(invalid(
            "description_length",
            format!(
                "keyDescription must be between 1 and {} characters",
                MAX_DESCRIPTION_LENGTH
            ),
        ));
    }

    if !description.chars().all(|c| c.is_alphabetic() || c == ' ') {
        return Err(invalid(
            "description_characters",
            "keyDescription must contain only alphabets",
        ));
    }

    Ok(())
}

/// Parses a key id taken from the path
pub fn parse_key_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| {
        ApiError::ValidationError(vec![ValidationErrorDetail::new(
            "keyId",
            "\"keyId\" must be a valid UUID",
        )])
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names() {
        assert!(validate_first_name("Ada").is_ok());
        assert!(validate_first_name("  Mary Ann ").is_ok());
        assert!(validate_last_name("O-Neil").is_ok());

        assert!(validate_first_name("").is_err());
        assert!(validate_first_name("   ").is_err());
        assert!(validate_first_name("Ada1").is_err());
        assert!(validate_last_name("Smith!").is_err());
        assert!(validate_last_name("a/b").is_err());
        assert!(validate_first_name(&"a".repeat(21)).is_err());
        assert!(validate_first_name(&"a".repeat(20)).is_ok());
    }

    #[test]
    fn test_name_messages_name_the_field() {
        let err = validate_last_name("R2D2").unwrap_err();
        assert_eq!(
            err.message.unwrap(),
            "Last name must not contain numbers or special characters"
        );
    }

    #[test]
    fn test_email() {
        assert!(validate_email("ada@example.com").is_ok());
        assert!(validate_email("  ada@example.com\t").is_ok());

        let err = validate_email("not-an-email").unwrap_err();
        assert_eq!(err.code, "email");

        let err = validate_email(&format!("{}@example.com", "a".repeat(39))).unwrap_err();
        assert_eq!(err.code, "email_length");
        assert!(validate_email(&format!("{}@example.com", "a".repeat(38))).is_ok());
    }

    #[test]
    fn test_password_policy() {
        assert!(validate_password("password1").is_ok());
        assert!(validate_password("short").is_err());
        assert!(validate_password(&"x".repeat(31)).is_err());
    }

    #[test]
    fn test_key_description() {
        assert!(validate_key_description("Reporting job").is_ok());
        assert!(validate_key_description("").is_err());
        assert!(validate_key_description(&"a".repeat(51)).is_err());

        let err = validate_key_description("key 2").unwrap_err();
        assert_eq!(err.message.unwrap(), "keyDescription must contain only alphabets");
    }

    #[test]
    fn test_parse_key_id() {
        let id = Uuid::new_v4();
        assert_eq!(parse_key_id(&id.to_string()).unwrap(), id);

        match parse_key_id("not-a-uuid") {
            Err(ApiError::ValidationError(details)) => {
                assert_eq!(details[0].field, "keyId");
                assert_eq!(details[0].message, "\"keyId\" must be a valid UUID");
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }
}
