/// Invocation error type used across all modules.
#[derive(Debug, thiserror::Error)]
pub enum InvokeError {
    #[error("Config error: {0}")]
    Config(String),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Authorization error: {0}")]
    Authorization(String),
    #[error("Rate limited: {0}")]
    RateLimit(String),
    #[error("Server unavailable: {0}")]
    ServerUnavailable(String),
    #[error("Connection error: {0}")]
    Connection(String),
    #[error("Upstream error: status={status}, message={message}")]
    Upstream { status: u16, message: String },
    #[error("No valid response chunks received from stream")]
    EmptyStream,
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Credentials validation failed: {0}")]
    CredentialsValidation(String),
}

impl InvokeError {
    /// Map a non-200 upstream status to the matching error variant.
    #[must_use]
    pub fn from_upstream_status(status: u16, message: String) -> Self {
        match status {
            400 => InvokeError::BadRequest(message),
            401 | 403 => InvokeError::Authorization(message),
            429 => InvokeError::RateLimit(message),
            500..=599 => InvokeError::ServerUnavailable(message),
            _ => InvokeError::Upstream { status, message },
        }
    }
}

impl From<reqwest::Error> for InvokeError {
    fn from(err: reqwest::Error) -> Self {
        InvokeError::Connection(err.to_string())
    }
}

/// Extract a human-readable message from an upstream error body.
///
/// Looks for `error.message`, then a string `error`, then a top-level
/// `message`; falls back to a prefix of the raw text when the body is not
/// JSON.
#[must_use]
pub fn extract_error_message(status: u16, body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        if let Some(error) = value.get("error") {
            if let Some(message) = error.get("message").and_then(|m| m.as_str()) {
                return message.to_string();
            }
            return error.to_string();
        }
        if let Some(message) = value.get("message").and_then(|m| m.as_str()) {
            return message.to_string();
        }
        return format!("HTTP {status}");
    }

    let preview: String = body.chars().take(200).collect();
    format!("HTTP {status}: {preview}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            InvokeError::from_upstream_status(400, String::new()),
            InvokeError::BadRequest(_)
        ));
        assert!(matches!(
            InvokeError::from_upstream_status(401, String::new()),
            InvokeError::Authorization(_)
        ));
        assert!(matches!(
            InvokeError::from_upstream_status(429, String::new()),
            InvokeError::RateLimit(_)
        ));
        assert!(matches!(
            InvokeError::from_upstream_status(503, String::new()),
            InvokeError::ServerUnavailable(_)
        ));
        assert!(matches!(
            InvokeError::from_upstream_status(418, String::new()),
            InvokeError::Upstream { status: 418, .. }
        ));
    }

    #[test]
    fn test_extract_error_message_structured() {
        let body = r#"{"error":{"message":"model not found","code":"unknown_model"}}"#;
        assert_eq!(extract_error_message(404, body), "model not found");
    }

    #[test]
    fn test_extract_error_message_string_error() {
        let body = r#"{"error":"overloaded"}"#;
        assert_eq!(extract_error_message(503, body), "\"overloaded\"");
    }

    #[test]
    fn test_extract_error_message_top_level_message() {
        let body = r#"{"message":"upstream gone"}"#;
        assert_eq!(extract_error_message(502, body), "upstream gone");
    }

    #[test]
    fn test_extract_error_message_raw_text() {
        let msg = extract_error_message(500, "<html>Internal Server Error</html>");
        assert!(msg.starts_with("HTTP 500: <html>"));
    }
}
