use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client as HttpClient, StatusCode};

use super::types::Todo;

pub const DEFAULT_BASE_URL: &str = "https://jsonplaceholder.typicode.com/todos";
pub const DEFAULT_TIMEOUT_SECS: u64 = 20;

#[derive(Clone, Debug, PartialEq)]
pub struct ClientConfig {
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

/// Fetches a single item by id. The orchestrator only ever sees this seam.
#[async_trait]
pub trait TodoSource: Send + Sync {
    async fn fetch_todo(&self, id: u64) -> Result<Todo, FetchError>;
}

#[derive(Clone)]
pub struct HttpTodoSource {
    http: HttpClient,
    cfg: ClientConfig,
}

impl HttpTodoSource {
    pub fn new(cfg: ClientConfig) -> Result<Self, FetchError> {
        let http = HttpClient::builder()
            .timeout(cfg.timeout)
            .build()
            .map_err(FetchError::http)?;
        Ok(Self { http, cfg })
    }

    fn endpoint(&self, id: u64) -> String {
        format!("{}/{}", self.cfg.base_url.trim_end_matches('/'), id)
    }
}

#[async_trait]
impl TodoSource for HttpTodoSource {
    async fn fetch_todo(&self, id: u64) -> Result<Todo, FetchError> {
        let response = self
            .http
            .get(self.endpoint(id))
            .send()
            .await
            .map_err(FetchError::http)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }

        let bytes = response.bytes().await.map_err(FetchError::http)?;
        serde_json::from_slice(&bytes).map_err(FetchError::Decode)
    }
}

/// Every variant counts as the same "fetch failed" to the retry loop.
#[derive(Debug)]
pub enum FetchError {
    Http(reqwest::Error),
    Timeout,
    Status(StatusCode),
    Decode(serde_json::Error),
}

impl FetchError {
    fn http(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else {
            FetchError::Http(err)
        }
    }
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchError::Http(err) => write!(f, "http error: {err}"),
            FetchError::Timeout => write!(f, "request timed out"),
            FetchError::Status(status) => write!(f, "unexpected status {status}"),
            FetchError::Decode(err) => write!(f, "decode error: {err}"),
        }
    }
}

impl std::error::Error for FetchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FetchError::Http(err) => Some(err),
            FetchError::Decode(err) => Some(err),
            _ => None,
        }
    }
}
