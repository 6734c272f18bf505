use crate::auth::{ALL_SENTINEL, NONE_SENTINEL};
use crate::error::AppError;
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use rocket::http::Status;
use rocket::response::status::Custom;
use rocket::serde::json::Json;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::instrument;
use validator::Validate;

pub static USERNAME_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_.@-]+$").expect("username pattern compiles"));

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ValidationResponse {
    pub status: String,
    pub errors: HashMap<String, Vec<String>>,
}

impl ValidationResponse {
    pub fn new(errors: HashMap<String, Vec<String>>) -> Self {
        Self {
            status: "error".to_string(),
            errors,
        }
    }

    pub fn with_error(field: &str, message: &str) -> Self {
        let mut errors = HashMap::new();
        errors.insert(field.to_string(), vec![message.to_string()]);
        Self::new(errors)
    }
}

pub type ApiError = Custom<Json<ValidationResponse>>;

pub trait ToValidationResponse {
    fn to_validation_response(self) -> ApiError;
}

impl ToValidationResponse for AppError {
    #[instrument]
    fn to_validation_response(self) -> ApiError {
        self.log_and_record("API Validation Error");
        let status = self.status_code();

        let (field, message) = match &self {
            AppError::Database(_) => (
                "database",
                "The record store is unavailable; nothing was changed".to_string(),
            ),
            AppError::Authentication(msg) => {
                ("authentication", format!("Authentication error: {}", msg))
            }
            AppError::Authorization(msg) => {
                ("authorization", format!("Permission denied: {}", msg))
            }
            AppError::NotFound(msg) => ("resource", format!("Not found: {}", msg)),
            AppError::Validation(msg) => ("validation", msg.clone()),
            AppError::InvalidRange { .. } => ("date_range", self.to_string()),
            AppError::LinkageConflict(msg) => ("linkage", msg.clone()),
            AppError::Internal(_) => ("server", "Internal server error".to_string()),
        };

        Custom(status, Json(ValidationResponse::with_error(field, &message)))
    }
}

impl ToValidationResponse for Status {
    #[instrument]
    fn to_validation_response(self) -> ApiError {
        let (field, message) = match self {
            s if s == Status::Forbidden => (
                "permission",
                "You don't have permission to perform this action",
            ),
            s if s == Status::Unauthorized => ("authentication", "Authentication required"),
            s if s == Status::NotFound => ("resource", "Resource not found"),
            s if s == Status::Conflict => ("resource", "Resource already exists"),
            s if s == Status::BadRequest => ("request", "Bad request"),
            s if s == Status::UnprocessableEntity => ("validation", "Validation failed"),
            s if s == Status::InternalServerError => ("server", "Internal server error"),
            s if s == Status::ServiceUnavailable => ("service", "Service unavailable"),
            _ => ("error", "An error occurred"),
        };

        Custom(self, Json(ValidationResponse::with_error(field, message)))
    }
}

#[derive(Debug)]
pub struct ValidationErrorWrapper(pub validator::ValidationErrors);

impl From<ValidationErrorWrapper> for ApiError {
    #[instrument]
    fn from(wrapper: ValidationErrorWrapper) -> Self {
        let errors = wrapper.0;
        let mut error_map = HashMap::new();

        for (field, field_errors) in errors.field_errors() {
            let error_messages: Vec<String> = field_errors
                .iter()
                .map(|error| {
                    error
                        .message
                        .clone()
                        .unwrap_or_else(|| "Invalid value".into())
                        .to_string()
                })
                .collect();

            error_map.insert(field.to_string(), error_messages);
        }

        Custom(
            Status::UnprocessableEntity,
            Json(ValidationResponse::new(error_map)),
        )
    }
}

pub trait JsonValidateExt<T> {
    fn validate_custom(self) -> Result<T, ApiError>;
}

impl<T: Validate> JsonValidateExt<T> for Json<T> {
    fn validate_custom(self) -> Result<T, ApiError> {
        let inner = self.into_inner();
        inner
            .validate()
            .map_err(|e| ApiError::from(ValidationErrorWrapper(e)))?;
        Ok(inner)
    }
}

pub trait AppErrorExt<T> {
    fn validate_custom(self) -> Result<T, ApiError>;
}

impl<T> AppErrorExt<T> for Result<T, AppError> {
    fn validate_custom(self) -> Result<T, ApiError> {
        self.map_err(ToValidationResponse::to_validation_response)
    }
}

pub fn validate_record_key(field: &str, value: &str) -> Result<String, AppError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation(format!("{} is required", field)));
    }
    if trimmed == ALL_SENTINEL || trimmed == NONE_SENTINEL {
        return Err(AppError::Validation(format!(
            "{} cannot be '{}'; that name is reserved",
            field, trimmed
        )));
    }
    Ok(trimmed.to_string())
}

pub fn parse_iso_date(field: &str, value: &str) -> Result<NaiveDate, AppError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| {
        AppError::Validation(format!(
            "{} must be an ISO-8601 date (YYYY-MM-DD), got '{}'",
            field, value
        ))
    })
}

pub fn parse_optional_date(field: &str, value: Option<&str>) -> Result<Option<NaiveDate>, AppError> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(v) => parse_iso_date(field, v).map(Some),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_and_reserved_keys_are_rejected() {
        assert!(matches!(
            validate_record_key("Username", "   "),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            validate_record_key("Child name", "None"),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            validate_record_key("Child name", "All"),
            Err(AppError::Validation(_))
        ));
        assert_eq!(validate_record_key("Child name", " Tony ").unwrap(), "Tony");
    }

    #[test]
    fn dates_must_be_iso() {
        assert_eq!(
            parse_iso_date("start", "2025-01-31").unwrap(),
            NaiveDate::from_ymd_opt(2025, 1, 31).unwrap()
        );
        assert!(parse_iso_date("start", "31/01/2025").is_err());
        assert_eq!(parse_optional_date("end", Some("")).unwrap(), None);
        assert_eq!(parse_optional_date("end", None).unwrap(), None);
    }

    #[test]
    fn usernames_follow_pattern() {
        assert!(USERNAME_PATTERN.is_match("alice.smith"));
        assert!(USERNAME_PATTERN.is_match("ot_lead-2"));
        assert!(!USERNAME_PATTERN.is_match("alice smith"));
        assert!(!USERNAME_PATTERN.is_match("drop;table"));
    }

    #[test]
    fn app_errors_map_to_status_and_field() {
        let response = AppError::LinkageConflict("Child 'Tony' is already linked".into())
            .to_validation_response();
        assert_eq!(response.0, Status::Conflict);
        assert!(response.1.errors.contains_key("linkage"));

        let response = AppError::InvalidRange {
            start: "2025-02-01".into(),
            end: "2025-01-01".into(),
        }
        .to_validation_response();
        assert_eq!(response.0, Status::BadRequest);
        assert!(response.1.errors.contains_key("date_range"));
    }
}
