//! HTTP transport: the one external collaborator `Node` depends on.
//! `Node` never talks to `reqwest` directly so tests can swap in a
//! mocked transport instead of hitting the network.

use async_trait::async_trait;

use crate::types::{HttpUrl, Timespan};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawHttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
    pub elapsed: Timespan,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("connect failed: {0}")]
    ConnectFailed(String),
    #[error("request timed out")]
    Timeout,
    #[error("transport error: {0}")]
    Other(String),
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HttpTransport: Send + Sync + std::fmt::Debug {
    async fn post(
        &self,
        url: &HttpUrl,
        body: Vec<u8>,
        timeout: Timespan,
        auth: Option<(String, String)>,
    ) -> Result<RawHttpResponse, TransportError>;
}

/// Default transport, a thin wrapper around `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn post(
        &self,
        url: &HttpUrl,
        body: Vec<u8>,
        timeout: Timespan,
        auth: Option<(String, String)>,
    ) -> Result<RawHttpResponse, TransportError> {
        let started = std::time::Instant::now();
        let mut request = self
            .client
            .post(url.as_str())
            .timeout(timeout.as_duration())
            .header("content-type", "application/json")
            .body(body);
        if let Some((user, pass)) = auth {
            request = request.basic_auth(user, Some(pass));
        }
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout
            } else if e.is_connect() {
                TransportError::ConnectFailed(e.to_string())
            } else {
                TransportError::Other(e.to_string())
            }
        })?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError::Other(e.to_string()))?
            .to_vec();
        Ok(RawHttpResponse {
            status,
            body,
            elapsed: Timespan::from_millis(started.elapsed().as_millis() as u64),
        })
    }
}
