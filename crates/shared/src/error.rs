use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Unauthorized,
    Forbidden,
    NotFound,
    Conflict,
    Validation,
    RateLimited,
    Internal,
}

impl ErrorCode {
    pub fn from_status(status: u16) -> Self {
        match status {
            401 => ErrorCode::Unauthorized,
            403 => ErrorCode::Forbidden,
            404 => ErrorCode::NotFound,
            409 => ErrorCode::Conflict,
            400 | 422 => ErrorCode::Validation,
            429 => ErrorCode::RateLimited,
            _ => ErrorCode::Internal,
        }
    }
}

/// Error body returned by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{code:?}: {message}")]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Builds an error from a non-2xx body. Accepts the structured form,
    /// the `{"detail": ...}` form, and plain text. A structured code this
    /// client does not know is replaced by the one the status implies.
    pub fn from_body(status: u16, body: &str) -> Self {
        #[derive(Deserialize)]
        struct Structured {
            code: serde_json::Value,
            message: String,
        }

        #[derive(Deserialize)]
        struct Detail {
            detail: serde_json::Value,
        }

        let code = ErrorCode::from_status(status);
        if let Ok(structured) = serde_json::from_str::<Structured>(body) {
            let code = serde_json::from_value(structured.code).unwrap_or(code);
            return Self::new(code, structured.message);
        }

        if let Ok(Detail { detail }) = serde_json::from_str::<Detail>(body) {
            let message = match detail {
                serde_json::Value::String(text) => text,
                other => other.to_string(),
            };
            return Self::new(code, message);
        }

        let trimmed = body.trim();
        if trimmed.is_empty() {
            Self::new(code, format!("http status {status}"))
        } else {
            Self::new(code, trimmed)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_structured_body() {
        let err = ApiError::from_body(404, r#"{"code":"not_found","message":"no such checklist"}"#);
        assert_eq!(err.code, ErrorCode::NotFound);
        assert_eq!(err.message, "no such checklist");
    }

    #[test]
    fn unknown_structured_code_falls_back_to_status() {
        let err = ApiError::from_body(400, r#"{"code":"bad_request","message":"x"}"#);
        assert_eq!(err.code, ErrorCode::Validation);
        assert_eq!(err.message, "x");

        let numeric = ApiError::from_body(503, r#"{"code":17,"message":"maintenance"}"#);
        assert_eq!(numeric.code, ErrorCode::Internal);
        assert_eq!(numeric.message, "maintenance");
    }

    #[test]
    fn parses_detail_body_with_status_code() {
        let err = ApiError::from_body(422, r#"{"detail":"answer_id is required"}"#);
        assert_eq!(err.code, ErrorCode::Validation);
        assert_eq!(err.message, "answer_id is required");
    }

    #[test]
    fn falls_back_to_plain_text_and_status() {
        let err = ApiError::from_body(502, "  bad gateway ");
        assert_eq!(err.code, ErrorCode::Internal);
        assert_eq!(err.message, "bad gateway");

        let empty = ApiError::from_body(401, "");
        assert_eq!(empty.code, ErrorCode::Unauthorized);
        assert_eq!(empty.message, "http status 401");
    }
}
