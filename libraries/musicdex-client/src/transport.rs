//! Request execution against the Musicdex API.
//!
//! The services never talk to `reqwest` directly. They describe each call as an
//! [`ApiRequest`] and hand it to a [`Transport`], which makes the transport
//! swappable in tests and lets other HTTP stacks plug in.

use crate::error::{MusicdexError, Result};
use crate::types::ClientConfig;
use async_trait::async_trait;
use reqwest::header::IF_MODIFIED_SINCE;
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

/// A single API call, relative to the API prefix.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    /// Path below the API prefix, e.g. `/playlist/abc`
    pub path: String,
    pub body: Option<serde_json::Value>,
    /// Value for `If-Modified-Since`, turning this into a conditional fetch
    pub if_modified_since: Option<String>,
    pub bearer_token: Option<String>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            if_modified_since: None,
            bearer_token: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn if_modified_since(mut self, token: impl Into<String>) -> Self {
        self.if_modified_since = Some(token.into());
        self
    }

    pub fn bearer(mut self, token: Option<String>) -> Self {
        self.bearer_token = token;
        self
    }
}

/// Raw response of an [`ApiRequest`].
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl ApiResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Map non-2xx statuses onto errors. 304 is passed through.
    pub fn error_for_status(self) -> Result<Self> {
        match self.status {
            s if (200..300).contains(&s) || s == 304 => Ok(self),
            401 => Err(MusicdexError::AuthRequired),
            status => Err(MusicdexError::ServerError {
                status,
                message: String::from_utf8_lossy(&self.body).into_owned(),
            }),
        }
    }

    /// Decode the body as JSON.
    pub fn json<T: DeserializeOwned>(&self, what: &str) -> Result<T> {
        serde_json::from_slice(&self.body).map_err(|e| {
            MusicdexError::ParseError(format!("Failed to parse {} response: {}", what, e))
        })
    }

    /// Decode a conditional response.
    ///
    /// `None` means the server confirmed the cached copy: a 304, an empty body,
    /// or a JSON object without an `id`.
    pub fn json_if_modified<T: DeserializeOwned>(&self, what: &str) -> Result<Option<T>> {
        if self.status == 304 || self.body.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }

        let value: serde_json::Value = self.json(what)?;
        if matches!(value.get("id"), None | Some(serde_json::Value::Null)) {
            return Ok(None);
        }

        serde_json::from_value(value)
            .map(Some)
            .map_err(|e| MusicdexError::ParseError(format!("Failed to parse {} response: {}", what, e)))
    }
}

/// Executes API requests.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse>;
}

/// [`Transport`] over `reqwest`.
pub struct HttpTransport {
    http: Client,
    base_url: String,
}

impl HttpTransport {
    /// Create a transport for the server and prefix in `config`.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        if config.url.is_empty() {
            return Err(MusicdexError::InvalidUrl("URL cannot be empty".into()));
        }

        let url = config.url.trim_end_matches('/');
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(MusicdexError::InvalidUrl(
                "URL must start with http:// or https://".into(),
            ));
        }
        url::Url::parse(url).map_err(|e| MusicdexError::InvalidUrl(e.to_string()))?;

        let prefix = config.api_prefix.trim_end_matches('/');
        let base_url = if prefix.is_empty() || prefix.starts_with('/') {
            format!("{}{}", url, prefix)
        } else {
            format!("{}/{}", url, prefix)
        };

        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(format!("Musicdex/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(MusicdexError::Request)?;

        Ok(Self { http, base_url })
    }

    /// Base URL every request path is appended to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse> {
        let url = format!("{}{}", self.base_url, request.path);
        debug!(
            method = %request.method,
            url = %url,
            conditional = request.if_modified_since.is_some(),
            "Sending request"
        );

        let mut builder = self.http.request(request.method, &url);
        if let Some(token) = &request.bearer_token {
            builder = builder.bearer_auth(token);
        }
        if let Some(since) = &request.if_modified_since {
            builder = builder.header(IF_MODIFIED_SINCE, since);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(MusicdexError::from_transport)?;
        let status = response.status().as_u16();
        let body = response.bytes().await?.to_vec();

        debug!(url = %url, status, bytes = body.len(), "Received response");
        Ok(ApiResponse { status, body })
    }
}

/// Percent-encode one path segment.
pub(crate) fn segment(s: &str) -> String {
    url::form_urlencoded::byte_serialize(s.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}
