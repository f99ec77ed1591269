//! HTTP transport for the repository-hosting API

use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use serde_json::Value;
use tracing::debug;

use crate::config::DriftConfig;
use crate::error::{DriftError, RemoteError, Result};
use crate::gateway::{ApiRequest, Credential, HttpTransport};

const ACCEPT_JSON: &str = "application/vnd.github+json";

/// `reqwest`-backed transport
pub struct ReqwestTransport {
    api_url: String,
    http_client: reqwest::Client,
}

impl ReqwestTransport {
    /// Create a transport for the API configured in `config`
    pub fn new(config: &DriftConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| DriftError::Config(format!("failed to create HTTP client: {e}")))?;

        Ok(ReqwestTransport {
            api_url: config.api_url.trim_end_matches('/').to_string(),
            http_client,
        })
    }

    fn url(&self, request: &ApiRequest) -> String {
        format!("{}{}", self.api_url, request.path)
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(
        &self,
        request: &ApiRequest,
        credential: Option<&Credential>,
    ) -> std::result::Result<Value, RemoteError> {
        let mut builder = self
            .http_client
            .get(self.url(request))
            .header(ACCEPT, ACCEPT_JSON)
            .query(&request.query);
        if let Some(credential) = credential {
            builder = builder.header(AUTHORIZATION, format!("token {}", credential.token()));
        }

        let response = builder
            .send()
            .await
            .map_err(|e| RemoteError::transport(e.to_string()))?;
        let status = response.status();
        debug!(request = %request, status = status.as_u16(), "api response");

        if status.is_success() {
            return response
                .json::<Value>()
                .await
                .map_err(|e| RemoteError::new(Some(status.as_u16()), e.to_string()));
        }

        let body = response.text().await.unwrap_or_default();
        Err(RemoteError::new(Some(status.as_u16()), error_message(&body, status)))
    }
}

/// Pull the API's `message` out of an error body, falling back to the status text.
fn error_message(body: &str, status: reqwest::StatusCode) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::RequestOptions;

    #[test]
    fn test_error_message_prefers_api_message() {
        let msg = error_message(
            r#"{"message":"API rate limit exceeded","documentation_url":"x"}"#,
            reqwest::StatusCode::FORBIDDEN,
        );
        assert_eq!(msg, "API rate limit exceeded");
    }

    #[test]
    fn test_error_message_falls_back_to_status() {
        let msg = error_message("<html>", reqwest::StatusCode::BAD_GATEWAY);
        assert_eq!(msg, "Bad Gateway");
    }

    #[test]
    fn test_url_joins_api_root_and_path() {
        let config = DriftConfig::default().with_api_url("http://localhost:9000/");
        let transport = ReqwestTransport::new(&config).unwrap();
        let request = ApiRequest::new("/repos/o/r", RequestOptions::new());
        assert_eq!(transport.url(&request), "http://localhost:9000/repos/o/r");
    }
}
