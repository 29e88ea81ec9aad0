//! Gateway connection settings.

use std::time::Duration;

use url::Url;

use crate::error::InvokeError;

/// Credentials and endpoint configuration for one gateway deployment.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Base URL of the gateway, e.g. `https://gateway.internal/llm`.
    pub base_url: String,
    /// Bearer token sent on every request.
    pub api_key: String,
    /// Optional extra header attached verbatim to every request.
    pub custom_header: Option<(String, String)>,
    /// Overall request timeout.
    pub timeout: Duration,
}

impl GatewayConfig {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        GatewayConfig {
            base_url: base_url.into(),
            api_key: api_key.into(),
            custom_header: None,
            timeout: Duration::from_secs(300),
        }
    }

    #[must_use]
    pub fn with_custom_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.custom_header = Some((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Chat-completions endpoint for a model. The model name is part of the
    /// URL path rather than the request body.
    ///
    /// # Errors
    ///
    /// Returns `InvokeError::Config` when `base_url` is not a valid URL.
    pub fn endpoint(&self, model: &str) -> Result<String, InvokeError> {
        let base = Url::parse(&self.base_url)
            .map_err(|err| InvokeError::Config(format!("invalid base_url: {err}")))?;
        let base = base.as_str().trim_end_matches('/');
        Ok(format!("{base}/{model}/chat/completions"))
    }

    /// Headers added to every gateway request.
    #[must_use]
    pub fn headers(&self) -> Vec<(String, String)> {
        let mut headers = vec![
            ("Content-Type".to_string(), "application/json".to_string()),
            (
                "Authorization".to_string(),
                format!("Bearer {}", self.api_key),
            ),
        ];
        if let Some((name, value)) = &self.custom_header {
            headers.push((name.clone(), value.clone()));
        }
        headers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_strips_trailing_slash() {
        let cfg = GatewayConfig::new("https://gw.example.com/llm/", "k");
        assert_eq!(
            cfg.endpoint("qwen-plus").unwrap(),
            "https://gw.example.com/llm/qwen-plus/chat/completions"
        );
    }

    #[test]
    fn test_endpoint_rejects_invalid_base_url() {
        let cfg = GatewayConfig::new("", "k");
        assert!(matches!(cfg.endpoint("m"), Err(InvokeError::Config(_))));
        let cfg = GatewayConfig::new("not a url", "k");
        assert!(matches!(cfg.endpoint("m"), Err(InvokeError::Config(_))));
    }

    #[test]
    fn test_headers_include_custom() {
        let cfg = GatewayConfig::new("https://gw", "secret")
            .with_custom_header("X-Tenant-Id", "team-7");
        let headers = cfg.headers();
        assert!(headers
            .iter()
            .any(|(n, v)| n == "Authorization" && v == "Bearer secret"));
        assert!(headers
            .iter()
            .any(|(n, v)| n == "X-Tenant-Id" && v == "team-7"));
    }
}
