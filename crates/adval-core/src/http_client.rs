//! Transport abstraction used by the provider adapters.
//!
//! Adapters speak to their upstream services through the [`HttpClient`]
//! trait so tests can inject scripted transports; production wiring uses
//! [`ReqwestHttpClient`].

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Minimal method set needed by the verification services.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

/// Authentication strategy applied to outgoing requests.
///
/// The three upstream services authenticate differently: bearer tokens
/// (OAuth lookup), static credential query parameters (street lookup),
/// and a static key query parameter (verdict endpoint).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HttpAuth {
    None,
    BearerToken(String),
    Header { name: String, value: String },
    QueryParams(Vec<(String, String)>),
}

impl HttpAuth {
    fn apply(&self, request: &mut HttpRequest) {
        match self {
            Self::None => {}
            Self::BearerToken(token) => {
                request
                    .headers
                    .insert(String::from("authorization"), format!("Bearer {token}"));
            }
            Self::Header { name, value } => {
                request
                    .headers
                    .insert(name.to_ascii_lowercase(), value.clone());
            }
            Self::QueryParams(params) => {
                for (name, value) in params {
                    request.url = append_query_param(&request.url, name, value);
                }
            }
        }
    }
}

fn append_query_param(url: &str, name: &str, value: &str) -> String {
    let separator = if url.contains('?') { '&' } else { '?' };
    format!(
        "{url}{separator}{}={}",
        urlencoding::encode(name),
        urlencoding::encode(value)
    )
}

/// Request envelope handed to a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<String>,
    pub timeout_ms: u64,
}

impl HttpRequest {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: BTreeMap::new(),
            body: None,
            timeout_ms: 5_000,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, url)
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.into().to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_json_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self.headers.insert(
            String::from("content-type"),
            String::from("application/json"),
        );
        self
    }

    pub fn with_auth(mut self, auth: &HttpAuth) -> Self {
        auth.apply(&mut self);
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }
}

/// Response envelope returned by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn ok_json(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }

    pub fn with_status(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    /// Quota and throttling signals from any of the upstream services.
    pub const fn is_rate_limited(&self) -> bool {
        self.status == 429 || self.status == 402
    }

    pub const fn is_auth_failure(&self) -> bool {
        self.status == 401 || self.status == 403
    }
}

/// Transport-level failure (connect, timeout, body read).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpError {
    message: String,
    timed_out: bool,
}

impl HttpError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            timed_out: false,
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            timed_out: true,
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn timed_out(&self) -> bool {
        self.timed_out
    }
}

impl Display for HttpError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for HttpError {}

/// Object-safe async transport contract.
pub trait HttpClient: Send + Sync {
    fn execute<'a>(
        &'a self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>>;
}

/// No-op transport for deterministic offline tests.
#[derive(Debug, Default)]
pub struct NoopHttpClient;

impl HttpClient for NoopHttpClient {
    fn execute<'a>(
        &'a self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
        let _ = request;
        Box::pin(async move { Ok(HttpResponse::ok_json("{}")) })
    }
}

/// Production transport backed by reqwest.
#[derive(Debug, Clone)]
pub struct ReqwestHttpClient {
    client: Arc<reqwest::Client>,
}

impl ReqwestHttpClient {
    pub fn new() -> Self {
        Self {
            client: Arc::new(
                reqwest::Client::builder()
                    .user_agent("adval/0.1.0")
                    .build()
                    .unwrap_or_else(|_| reqwest::Client::new()),
            ),
        }
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client: Arc::new(client),
        }
    }
}

impl Default for ReqwestHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient for ReqwestHttpClient {
    fn execute<'a>(
        &'a self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
        Box::pin(async move {
            let mut builder = match request.method {
                HttpMethod::Get => self.client.get(&request.url),
                HttpMethod::Post => self.client.post(&request.url),
            };

            for (name, value) in &request.headers {
                builder = builder.header(name, value);
            }

            builder = builder.timeout(std::time::Duration::from_millis(request.timeout_ms));

            if let Some(body) = request.body {
                builder = builder.body(body);
            }

            let response = builder.send().await.map_err(|error| {
                if error.is_timeout() {
                    HttpError::timeout(format!("request timeout: {error}"))
                } else if error.is_connect() {
                    HttpError::new(format!("connection failed: {error}"))
                } else {
                    HttpError::new(format!("request failed: {error}"))
                }
            })?;

            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .map_err(|error| HttpError::new(format!("failed to read response body: {error}")))?;

            Ok(HttpResponse { status, body })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_auth_populates_authorization_header() {
        let request = HttpRequest::get("https://example.test/address")
            .with_auth(&HttpAuth::BearerToken(String::from("token-123")));

        assert_eq!(
            request.headers.get("authorization").map(String::as_str),
            Some("Bearer token-123")
        );
    }

    #[test]
    fn query_param_auth_appends_encoded_credentials() {
        let request = HttpRequest::get("https://example.test/lookup?street=1+Main")
            .with_auth(&HttpAuth::QueryParams(vec![
                (String::from("auth-id"), String::from("id 1")),
                (String::from("auth-token"), String::from("tok")),
            ]));

        assert_eq!(
            request.url,
            "https://example.test/lookup?street=1+Main&auth-id=id%201&auth-token=tok"
        );
    }

    #[test]
    fn query_param_auth_starts_query_string_when_absent() {
        let request = HttpRequest::get("https://example.test/lookup")
            .with_auth(&HttpAuth::QueryParams(vec![(
                String::from("key"),
                String::from("abc"),
            )]));

        assert_eq!(request.url, "https://example.test/lookup?key=abc");
    }

    #[test]
    fn rate_limit_covers_quota_and_throttle_statuses() {
        assert!(HttpResponse::with_status(429, "").is_rate_limited());
        assert!(HttpResponse::with_status(402, "").is_rate_limited());
        assert!(!HttpResponse::with_status(500, "").is_rate_limited());
    }
}
