//! HTTP JSON-RPC transport backed by `reqwest`.
//!
//! One `HttpTransport` serves any number of endpoints: the URL comes with
//! every request, so a watcher that switches networks keeps its client and
//! connection pool.

use std::time::Duration;

use async_trait::async_trait;

use chaincall_core::error::TransportError;
use chaincall_core::request::{JsonRpcRequest, JsonRpcResponse, RpcId};
use chaincall_core::transport::RpcTransport;

use crate::retry::RetryConfig;

/// Configuration for [`HttpTransport`].
#[derive(Debug, Clone)]
pub struct HttpTransportConfig {
    pub request_timeout: Duration,
    pub retry: RetryConfig,
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            retry: RetryConfig::default(),
        }
    }
}

/// HTTP JSON-RPC transport.
pub struct HttpTransport {
    http: reqwest::Client,
    config: HttpTransportConfig,
}

impl HttpTransport {
    pub fn new(config: HttpTransportConfig) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| TransportError::Http(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { http, config })
    }

    /// Create with default configuration.
    pub fn with_defaults() -> Result<Self, TransportError> {
        Self::new(HttpTransportConfig::default())
    }

    async fn send_once(
        &self,
        url: &str,
        req: &JsonRpcRequest,
    ) -> Result<JsonRpcResponse, TransportError> {
        let resp = self.http.post(url).json(req).send().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout {
                    ms: self.config.request_timeout.as_millis() as u64,
                }
            } else {
                TransportError::Http(e.to_string())
            }
        })?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(TransportError::Http(format!("HTTP {status}: {body}")));
        }

        let body = resp
            .bytes()
            .await
            .map_err(|e| TransportError::Http(e.to_string()))?;
        let parsed: JsonRpcResponse = serde_json::from_slice(&body)?;
        // nodes answer parse errors with a null id
        if parsed.id != req.id && parsed.id != RpcId::Null {
            return Err(TransportError::InvalidResponse(format!(
                "response id {:?} does not match request id {:?}",
                parsed.id, req.id
            )));
        }
        Ok(parsed)
    }
}

#[async_trait]
impl RpcTransport for HttpTransport {
    async fn send(
        &self,
        endpoint: &str,
        req: JsonRpcRequest,
    ) -> Result<JsonRpcResponse, TransportError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.send_once(endpoint, &req).await {
                Ok(resp) => return Ok(resp),
                Err(e) if e.is_retryable() => match self.config.retry.next_delay(attempt) {
                    Some(delay) => {
                        tracing::warn!(
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            url = %endpoint,
                            "retrying request"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    None => {
                        tracing::debug!(attempt, error = %e, url = %endpoint, "giving up");
                        return Err(e);
                    }
                },
                // RPC-level errors (reverts, bad params) are final
                Err(e) => return Err(e),
            }
        }
    }

    fn name(&self) -> &str {
        "http"
    }
}
