//! Error type shared by the data-plane clients

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("service returned error (HTTP {status}, {code}): {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    #[error("authentication failed")]
    AuthenticationFailed,

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("failed to parse response: {0}")]
    Parse(String),

    #[error("failed to encode request body: {0}")]
    Encode(String),

    #[error("failed to sign request: {0}")]
    Signing(String),
}

impl ApiError {
    /// True when the service answered with 404 for the addressed object.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::Api { status: 404, .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_formatting_includes_status_and_code() {
        let err = ApiError::Api {
            status: 409,
            code: "TableAlreadyExists".to_string(),
            message: "The table specified already exists.".to_string(),
        };

        let text = err.to_string();
        assert!(text.contains("HTTP 409"));
        assert!(text.contains("TableAlreadyExists"));
        assert!(!err.is_not_found());
    }

    #[test]
    fn not_found_is_detected_by_status() {
        let err = ApiError::Api {
            status: 404,
            code: "ResourceNotFound".to_string(),
            message: "The specified resource does not exist.".to_string(),
        };
        assert!(err.is_not_found());

        assert!(!ApiError::AuthenticationFailed.is_not_found());
    }
}
