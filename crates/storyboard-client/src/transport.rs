//! HTTP transport seam and its implementations.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use url::Url;

use crate::error::ClientError;

/// Status and body of one HTTP response.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
  pub status: u16,
  pub body: Bytes,
}

impl HttpResponse {
  pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
    Self {
      status,
      body: body.into(),
    }
  }

  pub fn json(status: u16, value: &serde_json::Value) -> Self {
    Self::new(status, value.to_string())
  }

  pub fn is_success(&self) -> bool {
    (200..300).contains(&self.status)
  }

  pub fn is_client_error(&self) -> bool {
    (400..500).contains(&self.status)
  }

  pub fn is_server_error(&self) -> bool {
    self.status >= 500
  }

  /// Body as lossy UTF-8, for diagnostics.
  pub fn text(&self) -> String {
    String::from_utf8_lossy(&self.body).into_owned()
  }

  /// Body parsed as JSON, or the raw text as a JSON string when it is not JSON.
  pub fn payload(&self) -> serde_json::Value {
    serde_json::from_slice(&self.body).unwrap_or_else(|_| serde_json::Value::String(self.text()))
  }
}

/// Failure to get any HTTP response at all.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransportError {
  #[error("connection failed: {0}")]
  Connect(String),

  #[error("request timed out: {0}")]
  Timeout(String),

  #[error("request failed: {0}")]
  Request(String),
}

/// Trait for the HTTP layer, enabling mockability in tests.
///
/// Paths are relative to the service's base address (`/prompt`, `/queue`).
#[async_trait]
pub trait Transport: Send + Sync {
  async fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<HttpResponse, TransportError>;

  async fn post_json(
    &self,
    path: &str,
    body: &serde_json::Value,
  ) -> Result<HttpResponse, TransportError>;
}

/// Production transport over a pooled reqwest client.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
  inner: reqwest::Client,
  base_url: Url,
}

impl ReqwestTransport {
  pub fn new(server_address: &str, timeout: Duration) -> Result<Self, ClientError> {
    let invalid = |message: String| ClientError::InvalidAddress {
      address: server_address.to_string(),
      message,
    };

    // A trailing slash keeps any path prefix when joining endpoint paths.
    let mut base = server_address.trim_end_matches('/').to_string();
    base.push('/');
    let base_url = Url::parse(&base).map_err(|e| invalid(e.to_string()))?;
    if base_url.cannot_be_a_base() {
      return Err(invalid("not a base URL".to_string()));
    }

    let inner = reqwest::Client::builder()
      .timeout(timeout)
      .build()
      .map_err(|e| invalid(e.to_string()))?;

    Ok(Self { inner, base_url })
  }

  fn url(&self, path: &str) -> Result<Url, TransportError> {
    self
      .base_url
      .join(path.trim_start_matches('/'))
      .map_err(|e| TransportError::Request(format!("invalid path '{}': {}", path, e)))
  }

  async fn read(response: reqwest::Response) -> Result<HttpResponse, TransportError> {
    let status = response.status().as_u16();
    let body = response.bytes().await.map_err(map_reqwest_error)?;
    Ok(HttpResponse { status, body })
  }
}

fn map_reqwest_error(e: reqwest::Error) -> TransportError {
  if e.is_connect() {
    TransportError::Connect(e.to_string())
  } else if e.is_timeout() {
    TransportError::Timeout(e.to_string())
  } else {
    TransportError::Request(e.to_string())
  }
}

#[async_trait]
impl Transport for ReqwestTransport {
  async fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<HttpResponse, TransportError> {
    let url = self.url(path)?;
    tracing::debug!(%url, "http_get");
    let response = self
      .inner
      .get(url)
      .query(query)
      .send()
      .await
      .map_err(map_reqwest_error)?;
    Self::read(response).await
  }

  async fn post_json(
    &self,
    path: &str,
    body: &serde_json::Value,
  ) -> Result<HttpResponse, TransportError> {
    let url = self.url(path)?;
    tracing::debug!(%url, "http_post");
    let response = self
      .inner
      .post(url)
      .json(body)
      .send()
      .await
      .map_err(map_reqwest_error)?;
    Self::read(response).await
  }
}

/// Scripted transport for testing.
///
/// Replies are registered per route key, `"GET /queue"` or
/// `"GET /view?filename=a.png&subfolder=&type=output"` (query pairs in the
/// order the caller sends them). Each route holds a queue of replies; the
/// last reply of a queue repeats forever. Unknown routes answer HTTP 404.
#[derive(Debug, Default)]
pub struct MockTransport {
  routes: Mutex<HashMap<String, VecDeque<Result<HttpResponse, TransportError>>>>,
  calls: Mutex<Vec<String>>,
  bodies: Mutex<Vec<serde_json::Value>>,
}

impl MockTransport {
  pub fn new() -> Self {
    Self::default()
  }

  /// Queue a reply for a route.
  pub fn push(&self, route: &str, reply: Result<HttpResponse, TransportError>) {
    self
      .routes
      .lock()
      .unwrap_or_else(|e| e.into_inner())
      .entry(route.to_string())
      .or_default()
      .push_back(reply);
  }

  pub fn with_json(self, route: &str, status: u16, value: serde_json::Value) -> Self {
    self.push(route, Ok(HttpResponse::json(status, &value)));
    self
  }

  pub fn with_bytes(self, route: &str, bytes: impl Into<Bytes>) -> Self {
    self.push(route, Ok(HttpResponse::new(200, bytes)));
    self
  }

  pub fn with_error(self, route: &str, error: TransportError) -> Self {
    self.push(route, Err(error));
    self
  }

  /// Route keys of every request made so far, in order.
  pub fn calls(&self) -> Vec<String> {
    self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
  }

  /// Number of requests whose route key starts with `prefix`.
  pub fn count(&self, prefix: &str) -> usize {
    self.calls().iter().filter(|c| c.starts_with(prefix)).count()
  }

  /// JSON bodies of every POST made so far, in order.
  pub fn posted(&self) -> Vec<serde_json::Value> {
    self.bodies.lock().unwrap_or_else(|e| e.into_inner()).clone()
  }

  fn respond(&self, key: String) -> Result<HttpResponse, TransportError> {
    self
      .calls
      .lock()
      .unwrap_or_else(|e| e.into_inner())
      .push(key.clone());

    let mut routes = self.routes.lock().unwrap_or_else(|e| e.into_inner());
    match routes.get_mut(&key) {
      Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or_else(|| not_found(&key)),
      Some(queue) => queue.front().cloned().unwrap_or_else(|| not_found(&key)),
      None => not_found(&key),
    }
  }
}

fn not_found(key: &str) -> Result<HttpResponse, TransportError> {
  Ok(HttpResponse::new(404, format!("no mock route for {}", key)))
}

fn route_key(method: &str, path: &str, query: &[(&str, &str)]) -> String {
  if query.is_empty() {
    return format!("{} {}", method, path);
  }
  let query: Vec<String> = query.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
  format!("{} {}?{}", method, path, query.join("&"))
}

#[async_trait]
impl Transport for MockTransport {
  async fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<HttpResponse, TransportError> {
    self.respond(route_key("GET", path, query))
  }

  async fn post_json(
    &self,
    path: &str,
    body: &serde_json::Value,
  ) -> Result<HttpResponse, TransportError> {
    self
      .bodies
      .lock()
      .unwrap_or_else(|e| e.into_inner())
      .push(body.clone());
    self.respond(route_key("POST", path, &[]))
  }
}
