//! Error types and error codes for Keyward
//!
//! This module defines:
//! - `KeywardError`: Application-specific error enum
//! - `ErrorType`: The error type tag sent back to HTTP clients

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// Application-specific error types
#[derive(thiserror::Error, Debug)]
pub enum KeywardError {
    #[error("{0}")]
    IllegalArgument(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
}

impl KeywardError {
    /// HTTP status code this error is reported with
    pub fn status(&self) -> u16 {
        match self {
            KeywardError::IllegalArgument(_) => 400,
            KeywardError::Conflict(_) => 409,
            KeywardError::StoreUnavailable(_) => 503,
        }
    }

    /// Error type tag reported in the response body
    pub fn error_type(&self) -> ErrorType {
        match self {
            KeywardError::IllegalArgument(_) => ErrorType::BadRequest,
            KeywardError::Conflict(_) => ErrorType::Conflict,
            KeywardError::StoreUnavailable(_) => ErrorType::StoreUnavailable,
        }
    }
}

/// Error type tag carried in the `type` field of error responses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorType {
    #[serde(rename = "BAD_REQUEST")]
    BadRequest,
    #[serde(rename = "CONFLICT")]
    Conflict,
    #[serde(rename = "STORE_UNAVAILABLE")]
    StoreUnavailable,
    #[serde(rename = "INTERNAL")]
    Internal,
}

impl ErrorType {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorType::BadRequest => "BAD_REQUEST",
            ErrorType::Conflict => "CONFLICT",
            ErrorType::StoreUnavailable => "STORE_UNAVAILABLE",
            ErrorType::Internal => "INTERNAL",
        }
    }
}

impl Display for ErrorType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Body of every error response: `{message, name, type}`
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub message: String,
    pub name: String,
    #[serde(rename = "type")]
    pub error_type: ErrorType,
}

/// Name reported for errors raised while handling a request
pub const HANDLE_ERROR_NAME: &str = "HandleError";

impl ErrorBody {
    pub fn new(message: impl Into<String>, error_type: ErrorType) -> Self {
        ErrorBody {
            message: message.into(),
            name: HANDLE_ERROR_NAME.to_string(),
            error_type,
        }
    }
}

impl From<&KeywardError> for ErrorBody {
    fn from(value: &KeywardError) -> Self {
        ErrorBody::new(value.to_string(), value.error_type())
    }
}
