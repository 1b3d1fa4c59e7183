use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;
use std::time::Duration;

/// Outcome of a single JSON request. `ok` means transport succeeded, the
/// status was 2xx and the body (if any) parsed as JSON.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub ok: bool,
    pub status: Option<u16>,
    pub payload: Value,
    pub error: String,
}

impl ApiResponse {
    pub fn ok_json(payload: Value) -> Self {
        Self {
            ok: true,
            status: Some(200),
            payload,
            error: String::new(),
        }
    }

    pub fn http_error(status: u16, payload: Value) -> Self {
        Self {
            ok: false,
            status: Some(status),
            payload,
            error: format!("HTTP {}", status),
        }
    }

    pub fn transport_error(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            status: None,
            payload: Value::Null,
            error: error.into(),
        }
    }
}

/// JSON API seam. The harness and supervisor poll through this trait so
/// their loops are testable without a live backend.
#[async_trait]
pub trait Api: Send + Sync {
    async fn get_json(&self, path: &str, timeout: Duration) -> ApiResponse;
    async fn post_json(&self, path: &str, timeout: Duration, body: &Value) -> ApiResponse;
}

/// reqwest-backed client. Per-call timeouts are set on each request so a
/// hung call cannot outlive its loop deadline by more than one timeout.
pub struct ApiClient {
    base_url: String,
    client: reqwest::Client,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        timeout: Duration,
        body: Option<&Value>,
    ) -> ApiResponse {
        let mut request = self
            .client
            .request(method, self.url(path))
            .timeout(timeout)
            .header("Accept", "application/json");
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(err) => return ApiResponse::transport_error(err.to_string()),
        };

        let status = response.status().as_u16();
        let text = match response.text().await {
            Ok(text) => text,
            Err(err) => {
                return ApiResponse {
                    ok: false,
                    status: Some(status),
                    payload: Value::Null,
                    error: err.to_string(),
                }
            }
        };

        let ok_status = (200..300).contains(&status);
        if text.trim().is_empty() {
            return ApiResponse {
                ok: ok_status,
                status: Some(status),
                payload: Value::Object(Default::default()),
                error: if ok_status {
                    String::new()
                } else {
                    format!("HTTP {}", status)
                },
            };
        }

        match serde_json::from_str::<Value>(&text) {
            Ok(payload) => ApiResponse {
                ok: ok_status,
                status: Some(status),
                payload,
                error: if ok_status {
                    String::new()
                } else {
                    format!("HTTP {}", status)
                },
            },
            Err(_) => ApiResponse {
                ok: false,
                status: Some(status),
                payload: serde_json::json!({ "raw": text }),
                error: "response was not valid JSON".to_string(),
            },
        }
    }
}

#[async_trait]
impl Api for ApiClient {
    async fn get_json(&self, path: &str, timeout: Duration) -> ApiResponse {
        self.request(Method::GET, path, timeout, None).await
    }

    async fn post_json(&self, path: &str, timeout: Duration, body: &Value) -> ApiResponse {
        self.request(Method::POST, path, timeout, Some(body)).await
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_join_handles_slashes() {
        let client = ApiClient::new("http://127.0.0.1:8420/").unwrap();
        assert_eq!(client.url("/health"), "http://127.0.0.1:8420/health");
        assert_eq!(client.url("api/status"), "http://127.0.0.1:8420/api/status");
    }

    #[test]
    fn response_constructors() {
        let ok = ApiResponse::ok_json(serde_json::json!({"status": "healthy"}));
        assert!(ok.ok);
        assert!(ok.error.is_empty());

        let err = ApiResponse::http_error(503, Value::Null);
        assert!(!err.ok);
        assert_eq!(err.status, Some(503));
        assert_eq!(err.error, "HTTP 503");

        let transport = ApiResponse::transport_error("connection refused");
        assert!(!transport.ok);
        assert_eq!(transport.status, None);
    }
}
