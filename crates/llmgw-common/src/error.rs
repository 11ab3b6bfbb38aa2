use std::fmt;
use std::panic::Location;

use serde::{Deserialize, Serialize};

/// Gateway-wide error categories. Each maps to exactly one HTTP status and
/// one stable wire code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidArgument,
    Unauthenticated,
    PermissionDenied,
    NotFound,
    /// Reserved for rate/quota layers; the core never produces it.
    ResourceExhausted,
    Unavailable,
    Internal,
    Canceled,
}

impl ErrorCode {
    pub fn http_status(self) -> u16 {
        match self {
            ErrorCode::InvalidArgument => 400,
            ErrorCode::Unauthenticated => 401,
            ErrorCode::PermissionDenied => 403,
            ErrorCode::NotFound => 404,
            ErrorCode::ResourceExhausted => 429,
            ErrorCode::Unavailable => 503,
            ErrorCode::Internal => 500,
            // Closest HTTP mapping for a caller-initiated abort.
            ErrorCode::Canceled => 499,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::InvalidArgument => "INVALID_ARGUMENT",
            ErrorCode::Unauthenticated => "UNAUTHORIZED",
            ErrorCode::PermissionDenied => "PERMISSION_DENIED",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::ResourceExhausted => "QUOTA_EXCEEDED",
            ErrorCode::Unavailable => "UNAVAILABLE",
            ErrorCode::Internal => "INTERNAL_SERVER_ERROR",
            ErrorCode::Canceled => "CANCELED",
        }
    }

    fn default_title(self) -> &'static str {
        match self {
            ErrorCode::InvalidArgument => "Invalid Argument",
            ErrorCode::Unauthenticated => "Unauthorized",
            ErrorCode::PermissionDenied => "Permission Denied",
            ErrorCode::NotFound => "Not Found",
            ErrorCode::ResourceExhausted => "Quota Exceeded",
            ErrorCode::Unavailable => "Service Unavailable",
            ErrorCode::Internal => "Internal Server Error",
            ErrorCode::Canceled => "Canceled",
        }
    }

    fn default_detail(self) -> &'static str {
        match self {
            ErrorCode::InvalidArgument => {
                "Invalid parameters, queries, body, or headers were sent, please check the request"
            }
            ErrorCode::Unauthenticated => "The requested resources require authentication",
            ErrorCode::PermissionDenied => {
                "You do not have permission to access the requested resources"
            }
            ErrorCode::NotFound => "The requested resources were not found",
            ErrorCode::ResourceExhausted => "The request quota has been exceeded",
            ErrorCode::Unavailable => "The requested service is unavailable",
            ErrorCode::Internal => "An internal server error occurred",
            ErrorCode::Canceled => "The request was canceled by the caller",
        }
    }
}

/// JSON:API-style pointer to the offending part of the request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorSource {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pointer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameter: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub header: Option<String>,
}

impl fmt::Display for ErrorSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "pointer={:?} parameter={:?} header={:?}",
            self.pointer, self.parameter, self.header
        )
    }
}

impl std::error::Error for ErrorSource {}

/// Server-side origin of the error, for diagnostics only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorCaller {
    pub file: String,
    pub line: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorObject {
    pub id: String,
    pub status: u16,
    pub code: String,
    pub title: String,
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<ErrorSource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caller: Option<ErrorCaller>,
}

/// The error envelope written on HTTP transports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub errors: Vec<ErrorObject>,
}

impl ErrorResponse {
    pub fn http_status(&self) -> u16 {
        self.errors.first().map(|e| e.status).unwrap_or(200)
    }
}

/// A typed gateway error: a category plus optional detail, source, and the
/// call site that raised it.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{code}: {detail}")]
pub struct GatewayError {
    pub code: ErrorCode,
    pub title: String,
    pub detail: String,
    pub source: Option<ErrorSource>,
    pub caller: Option<ErrorCaller>,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl GatewayError {
    pub fn new(code: ErrorCode) -> Self {
        Self {
            code,
            title: code.default_title().to_string(),
            detail: code.default_detail().to_string(),
            source: None,
            caller: None,
        }
    }

    pub fn invalid_argument() -> Self {
        Self::new(ErrorCode::InvalidArgument)
    }

    pub fn unauthenticated() -> Self {
        Self::new(ErrorCode::Unauthenticated)
    }

    pub fn permission_denied() -> Self {
        Self::new(ErrorCode::PermissionDenied)
    }

    pub fn not_found() -> Self {
        Self::new(ErrorCode::NotFound)
    }

    pub fn unavailable() -> Self {
        Self::new(ErrorCode::Unavailable)
    }

    pub fn internal() -> Self {
        Self::new(ErrorCode::Internal)
    }

    pub fn canceled() -> Self {
        Self::new(ErrorCode::Canceled)
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = detail.into();
        self
    }

    pub fn with_source_pointer(mut self, pointer: impl Into<String>) -> Self {
        self.source = Some(ErrorSource {
            pointer: Some(pointer.into()),
            ..Default::default()
        });
        self
    }

    pub fn with_source_parameter(mut self, parameter: impl Into<String>) -> Self {
        self.source = Some(ErrorSource {
            parameter: Some(parameter.into()),
            ..Default::default()
        });
        self
    }

    pub fn with_source_header(mut self, header: impl Into<String>) -> Self {
        self.source = Some(ErrorSource {
            header: Some(header.into()),
            ..Default::default()
        });
        self
    }

    /// Records the call site of the invoking function.
    #[track_caller]
    pub fn with_caller(mut self) -> Self {
        let loc = Location::caller();
        self.caller = Some(ErrorCaller {
            file: loc.file().to_string(),
            line: loc.line(),
            function: None,
        });
        self
    }

    pub fn is_code(&self, code: ErrorCode) -> bool {
        self.code == code
    }

    /// Renders the envelope. `Internal` errors are scrubbed: the stored
    /// detail stays on the server side and only the generic message ships.
    pub fn to_response(&self) -> ErrorResponse {
        let detail = if self.code == ErrorCode::Internal {
            ErrorCode::Internal.default_detail().to_string()
        } else {
            self.detail.clone()
        };

        ErrorResponse {
            errors: vec![ErrorObject {
                id: self.code.as_str().to_string(),
                status: self.code.http_status(),
                code: self.code.as_str().to_string(),
                title: self.title.clone(),
                detail,
                source: self.source.clone(),
                caller: self.caller.clone(),
            }],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_status_mapping() {
        assert_eq!(ErrorCode::InvalidArgument.http_status(), 400);
        assert_eq!(ErrorCode::Unauthenticated.http_status(), 401);
        assert_eq!(ErrorCode::PermissionDenied.http_status(), 403);
        assert_eq!(ErrorCode::NotFound.http_status(), 404);
        assert_eq!(ErrorCode::ResourceExhausted.http_status(), 429);
        assert_eq!(ErrorCode::Unavailable.http_status(), 503);
        assert_eq!(ErrorCode::Internal.http_status(), 500);
    }

    #[test]
    fn internal_detail_never_leaks() {
        let err = GatewayError::internal().with_detail("db password leaked in trace");
        let resp = err.to_response();
        assert_eq!(resp.errors[0].detail, "An internal server error occurred");
        assert_eq!(resp.http_status(), 500);
    }

    #[test]
    fn caller_site_is_captured() {
        let err = GatewayError::not_found().with_caller();
        let caller = err.caller.expect("caller");
        assert!(caller.file.ends_with("error.rs"));
        assert!(caller.line > 0);
    }

    #[test]
    fn source_header_round_trips() {
        let err = GatewayError::unauthenticated().with_source_header("X-Api-Key");
        let resp = err.to_response();
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["errors"][0]["source"]["header"], "X-Api-Key");
        assert_eq!(json["errors"][0]["status"], 401);
    }
}
