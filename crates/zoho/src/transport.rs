use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// One authorized request against the Projects API.
#[derive(Clone, Debug)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    pub access_token: String,
}

impl ApiRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            query: Vec::new(),
            body: None,
            access_token: String::new(),
        }
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            query: Vec::new(),
            body: Some(body),
            access_token: String::new(),
        }
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SendError {
    #[error("backend returned status {code}")]
    Status { code: u16, retry_after_secs: Option<u64>, body: String },
    #[error("network failure: {0}")]
    Network(String),
}

/// HTTP seam for the Projects client; tests substitute scripted fakes.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: ApiRequest) -> Result<Value, SendError>;
}

pub struct HttpTransport {
    http: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>, timeout_secs: u64) -> Result<Self, SendError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|error| SendError::Network(format!("http client build failed: {error}")))?;

        Ok(Self { http, base_url: base_url.into() })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: ApiRequest) -> Result<Value, SendError> {
        let url = format!("{}{}", self.base_url.trim_end_matches('/'), request.path);

        let mut builder = match request.method {
            Method::Get => self.http.get(&url),
            Method::Post => self.http.post(&url),
        };
        builder = builder
            .header("Authorization", format!("Zoho-oauthtoken {}", request.access_token))
            .query(&request.query);
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response =
            builder.send().await.map_err(|error| SendError::Network(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after_secs = response
                .headers()
                .get("Retry-After")
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.parse::<u64>().ok());
            let body = response.text().await.unwrap_or_default();
            return Err(SendError::Status { code: status.as_u16(), retry_after_secs, body });
        }

        let raw = response.text().await.map_err(|error| SendError::Network(error.to_string()))?;
        if raw.trim().is_empty() {
            // Some write endpoints answer 204 with no body.
            return Ok(Value::Null);
        }
        serde_json::from_str(&raw)
            .map_err(|error| SendError::Network(format!("unparseable response body: {error}")))
    }
}
