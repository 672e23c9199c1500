//! HTTP client for traffic sent through a gateway
//!
//! Requests can be pinned to an address (the gateway load balancer) while
//! still presenting the public hostname, both as `Host` and as TLS SNI.

use anyhow::{Context, Result};
use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue},
    Certificate, Client, Method,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;

/// HTTP client errors
#[derive(Error, Debug)]
pub enum HttpError {
    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Timeout after {0} seconds")]
    Timeout(u64),

    #[error("Connection refused to {0}")]
    ConnectionRefused(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("TLS error: {0}")]
    TlsError(String),
}

/// Builder for `KuadrantClient`
#[derive(Clone, Debug)]
pub struct ClientBuilder {
    base_url: String,
    headers: Vec<(String, String)>,
    resolve: Option<(String, SocketAddr)>,
    root_ca: Option<String>,
    verify: bool,
    timeout_secs: u64,
    retry_codes: Vec<u16>,
    attempts: u32,
    retry_delay: Duration,
}

impl ClientBuilder {
    fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            headers: Vec::new(),
            resolve: None,
            root_ca: None,
            verify: true,
            timeout_secs: 30,
            retry_codes: vec![503],
            attempts: 3,
            retry_delay: Duration::from_secs(1),
        }
    }

    /// Header sent with every request
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Override the `Host` header
    pub fn host(self, hostname: impl Into<String>) -> Self {
        self.header("Host", hostname)
    }

    /// Connect to `address` whenever the URL names `hostname`
    ///
    /// The hostname stays in the URL, so it is also used for SNI and
    /// certificate verification.
    pub fn resolve(mut self, hostname: impl Into<String>, address: SocketAddr) -> Self {
        self.resolve = Some((hostname.into(), address));
        self
    }

    /// Trust this PEM certificate (in addition to the built-in roots)
    pub fn root_ca(mut self, pem: impl Into<String>) -> Self {
        self.root_ca = Some(pem.into());
        self
    }

    /// Disable certificate verification
    pub fn insecure(mut self) -> Self {
        self.verify = false;
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Status codes answered by re-sending the request
    pub fn retry_codes(mut self, codes: Vec<u16>) -> Self {
        self.retry_codes = codes;
        self
    }

    /// Total attempts for retried requests, at least one
    pub fn attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts.max(1);
        self
    }

    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn build(self) -> Result<KuadrantClient> {
        let mut builder = Client::builder()
            .timeout(Duration::from_secs(self.timeout_secs))
            .danger_accept_invalid_certs(!self.verify);

        if let Some(pem) = &self.root_ca {
            let certificate = Certificate::from_pem(pem.as_bytes())
                .map_err(|e| HttpError::TlsError(e.to_string()))?;
            builder = builder.add_root_certificate(certificate);
        }
        if let Some((hostname, address)) = &self.resolve {
            builder = builder.resolve(hostname, *address);
        }

        let mut default_headers = HeaderMap::new();
        for (name, value) in &self.headers {
            let header_name = HeaderName::from_bytes(name.as_bytes()).context("Invalid header name")?;
            let header_value = HeaderValue::from_str(value).context("Invalid header value")?;
            default_headers.insert(header_name, header_value);
        }

        let client = builder.build().context("Failed to create HTTP client")?;

        Ok(KuadrantClient {
            client,
            base_url: self.base_url,
            default_headers,
            timeout_secs: self.timeout_secs,
            retry_codes: self.retry_codes,
            attempts: self.attempts,
            retry_delay: self.retry_delay,
        })
    }
}

/// HTTP client bound to a base URL
#[derive(Clone, Debug)]
pub struct KuadrantClient {
    client: Client,
    base_url: String,
    default_headers: HeaderMap,
    timeout_secs: u64,
    retry_codes: Vec<u16>,
    attempts: u32,
    retry_delay: Duration,
}

impl KuadrantClient {
    pub fn builder(base_url: impl Into<String>) -> ClientBuilder {
        ClientBuilder::new(base_url)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build full URL
    fn build_url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        if path.is_empty() {
            return self.base_url.clone();
        }
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// Send a request, re-sending it while the answer is a retry code
    pub async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let mut attempt = 1;
        loop {
            let response = self.send_once(&request).await?;
            if attempt >= self.attempts || !self.retry_codes.contains(&response.status_code) {
                return Ok(response);
            }
            debug!(
                "Got {} from {}, retrying ({}/{})",
                response.status_code, request.url, attempt, self.attempts
            );
            attempt += 1;
            tokio::time::sleep(self.retry_delay).await;
        }
    }

    /// Send a request exactly once, whatever the answer
    pub async fn send_once(&self, request: &HttpRequest) -> Result<HttpResponse> {
        let url = self.build_url(&request.url);
        debug!("Sending {} request to {}", request.method, url);

        let method =
            Method::from_bytes(request.method.as_bytes()).context("Invalid HTTP method")?;

        let mut req_builder = self
            .client
            .request(method, &url)
            .headers(self.default_headers.clone());

        for (key, value) in &request.headers {
            req_builder = req_builder.header(key.as_str(), value.as_str());
        }
        if let Some(token) = &request.bearer {
            req_builder = req_builder.bearer_auth(token);
        }

        let start = Instant::now();

        let response = req_builder.send().await.map_err(|e| {
            if e.is_timeout() {
                anyhow::anyhow!(HttpError::Timeout(self.timeout_secs))
            } else if e.is_connect() {
                anyhow::anyhow!(HttpError::ConnectionRefused(url.clone()))
            } else if e.is_builder() {
                anyhow::anyhow!(HttpError::InvalidUrl(url.clone()))
            } else {
                anyhow::anyhow!(HttpError::RequestFailed(e.to_string()))
            }
        })?;

        let duration_ms = start.elapsed().as_millis() as u64;
        let status = response.status();

        let mut headers = HashMap::new();
        for (key, value) in response.headers() {
            if let Ok(v) = value.to_str() {
                headers.insert(key.to_string(), v.to_string());
            }
        }

        let body = response
            .text()
            .await
            .context("Failed to read response body")?;

        debug!(
            "Response: {} {} in {}ms",
            status.as_u16(),
            status.canonical_reason().unwrap_or(""),
            duration_ms
        );

        Ok(HttpResponse {
            status_code: status.as_u16(),
            headers,
            body,
            duration_ms,
        })
    }

    pub async fn get(&self, path: &str) -> Result<HttpResponse> {
        self.send(HttpRequest::get(path)).await
    }

    /// GET with a bearer token
    pub async fn get_with_token(&self, path: &str, token: &str) -> Result<HttpResponse> {
        self.send(HttpRequest::get(path).bearer(token)).await
    }

    /// Send the same GET `count` times without retries, one after another
    pub async fn get_many(&self, path: &str, count: usize) -> Result<Vec<HttpResponse>> {
        let request = HttpRequest::get(path);
        let mut responses = Vec::with_capacity(count);
        for _ in 0..count {
            responses.push(self.send_once(&request).await?);
        }
        Ok(responses)
    }
}

/// HTTP request builder
#[derive(Clone, Debug)]
pub struct HttpRequest {
    pub method: String,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub bearer: Option<String>,
}

impl HttpRequest {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            headers: HashMap::new(),
            bearer: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new("GET", url)
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn bearer(mut self, token: impl Into<String>) -> Self {
        self.bearer = Some(token.into());
        self
    }
}

/// HTTP response
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HttpResponse {
    pub status_code: u16,
    pub headers: HashMap<String, String>,
    pub body: String,
    pub duration_ms: u64,
}

impl HttpResponse {
    pub fn get_header(&self, name: &str) -> Option<&String> {
        self.headers.get(&name.to_lowercase())
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_str(&self.body).context("Response body is not the expected JSON")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, header_regex, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fast(builder: ClientBuilder) -> ClientBuilder {
        builder.retry_delay(Duration::from_millis(1)).timeout_secs(5)
    }

    async fn answer(server: &MockServer, status: u16, times: u64) {
        Mock::given(method("GET"))
            .and(path("/get"))
            .respond_with(ResponseTemplate::new(status))
            .up_to_n_times(times)
            .expect(times)
            .mount(server)
            .await;
    }

    #[test]
    fn test_build_url() {
        let client = KuadrantClient::builder("http://example.com/").build().unwrap();
        assert_eq!(client.build_url("/get"), "http://example.com/get");
        assert_eq!(client.build_url("anything"), "http://example.com/anything");
        assert_eq!(client.build_url(""), "http://example.com/");
        assert_eq!(client.build_url("https://other.io/x"), "https://other.io/x");
    }

    #[tokio::test]
    async fn test_retries_on_503() {
        let server = MockServer::start().await;
        answer(&server, 503, 2).await;
        answer(&server, 200, 1).await;

        let client = fast(KuadrantClient::builder(server.uri())).build().unwrap();
        let response = client.get("/get").await.unwrap();
        assert_eq!(response.status_code, 200);
    }

    #[tokio::test]
    async fn test_gives_up_after_attempts() {
        let server = MockServer::start().await;
        answer(&server, 503, 2).await;

        let client = fast(KuadrantClient::builder(server.uri()))
            .attempts(2)
            .build()
            .unwrap();
        let response = client.get("/get").await.unwrap();
        assert_eq!(response.status_code, 503);
    }

    #[tokio::test]
    async fn test_rate_limit_answers_are_not_retried() {
        let server = MockServer::start().await;
        answer(&server, 200, 1).await;
        answer(&server, 429, 1).await;

        let client = fast(KuadrantClient::builder(server.uri())).build().unwrap();
        let statuses: Vec<u16> = client
            .get_many("/get", 2)
            .await
            .unwrap()
            .iter()
            .map(|r| r.status_code)
            .collect();
        assert_eq!(statuses, vec![200, 429]);
    }

    #[tokio::test]
    async fn test_resolve_and_bearer() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/get"))
            .and(header_regex("host", "^my-app\\.test\\.com"))
            .and(header("authorization", "Bearer abc"))
            .and(header("x-user", "alice"))
            .respond_with(ResponseTemplate::new(200).insert_header("x-served-by", "mock"))
            .expect(1)
            .mount(&server)
            .await;

        let address = *server.address();
        let client = fast(KuadrantClient::builder(format!("http://my-app.test.com:{}", address.port())))
            .resolve("my-app.test.com", address)
            .build()
            .unwrap();

        let request = HttpRequest::get("/get").bearer("abc").header("x-user", "alice");
        let response = client.send(request).await.unwrap();
        assert_eq!(response.status_code, 200);
        assert_eq!(response.get_header("X-Served-By").map(String::as_str), Some("mock"));
    }

    #[tokio::test]
    async fn test_unreachable_host() {
        let client = fast(KuadrantClient::builder("http://127.0.0.1:1")).build().unwrap();
        let err = client.get("/get").await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<HttpError>(),
            Some(HttpError::ConnectionRefused(_))
        ));
    }

    #[test]
    fn test_response_json() {
        let response = HttpResponse {
            status_code: 200,
            headers: HashMap::from([("x-auth".to_string(), "1".to_string())]),
            body: r#"{"identity": {"anonymous": true}}"#.to_string(),
            duration_ms: 3,
        };

        let body: serde_json::Value = response.json().unwrap();
        assert_eq!(body["identity"]["anonymous"], true);
        assert_eq!(response.get_header("X-Auth").map(String::as_str), Some("1"));
    }
}
