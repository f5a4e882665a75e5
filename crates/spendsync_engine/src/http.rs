//! HTTP repository implementation.
//!
//! This module provides the JSON-over-HTTP [`RemoteRepository`]. The actual
//! HTTP client is abstracted via a trait so tests can route requests to an
//! in-process server instead of the network.

use crate::error::{SyncError, SyncResult};
use crate::transport::RemoteRepository;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use spendsync_protocol::{
    DeleteResponse, ErrorBody, Expense, FetchResponse, PushRequest, PushResponse, ServerId,
};
use std::time::Duration;
use tracing::debug;

/// Status and body of an HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Raw body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Creates a response.
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Returns true for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// HTTP client abstraction.
///
/// Implementations return `Err` only when no response was received
/// (connection refused, DNS failure, reset). Any response, including a
/// non-2xx one, is `Ok`.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Sends a GET request.
    async fn get(&self, url: &str) -> Result<HttpResponse, String>;

    /// Sends a POST request with a JSON body.
    async fn post(&self, url: &str, body: Vec<u8>) -> Result<HttpResponse, String>;

    /// Sends a DELETE request.
    async fn delete(&self, url: &str) -> Result<HttpResponse, String>;
}

/// A [`RemoteRepository`] speaking JSON to the spendsync server.
pub struct HttpRepository<C: HttpClient> {
    /// Base URL of the server (e.g., "http://localhost:5000").
    base_url: String,
    client: C,
}

impl<C: HttpClient> HttpRepository<C> {
    /// Creates a repository for the server at `base_url`.
    pub fn new(base_url: impl Into<String>, client: C) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { base_url, client }
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn decode<T: DeserializeOwned>(response: HttpResponse) -> SyncResult<T> {
        if !response.is_success() {
            let message = serde_json::from_slice::<ErrorBody>(&response.body)
                .map(|body| body.error)
                .unwrap_or_else(|_| String::from_utf8_lossy(&response.body).into_owned());
            return Err(SyncError::Server {
                status: response.status,
                message,
            });
        }
        serde_json::from_slice(&response.body)
            .map_err(|e| SyncError::Protocol(format!("failed to decode response: {e}")))
    }
}

/// Formats a watermark for the `since` query parameter.
///
/// Sub-second digits are kept exactly so the server compares against the
/// same instant it reported.
fn since_param(since: DateTime<Utc>) -> String {
    since.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

#[async_trait]
impl<C: HttpClient> RemoteRepository for HttpRepository<C> {
    async fn fetch(&self, since: Option<DateTime<Utc>>) -> SyncResult<FetchResponse> {
        let url = match since {
            Some(since) => self.url(&format!("/api/expenses?since={}", since_param(since))),
            None => self.url("/api/expenses"),
        };
        debug!(%url, "fetching expenses");
        let response = self
            .client
            .get(&url)
            .await
            .map_err(SyncError::transport_retryable)?;
        Self::decode(response)
    }

    async fn push(&self, batch: &[Expense]) -> SyncResult<Vec<Expense>> {
        let body = serde_json::to_vec(&PushRequest {
            expenses: batch.to_vec(),
        })?;
        debug!(count = batch.len(), "pushing expenses");
        let response = self
            .client
            .post(&self.url("/api/expenses/sync"), body)
            .await
            .map_err(SyncError::transport_retryable)?;
        let PushResponse { expenses } = Self::decode(response)?;
        Ok(expenses)
    }

    async fn delete(&self, id: &ServerId) -> SyncResult<Expense> {
        let response = self
            .client
            .delete(&self.url(&format!("/api/expenses/{id}")))
            .await
            .map_err(SyncError::transport_retryable)?;
        let DeleteResponse { expense } = Self::decode(response)?;
        Ok(expense)
    }
}

/// [`HttpClient`] backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    /// Creates a client whose requests give up after `timeout`.
    pub fn new(timeout: Duration) -> SyncResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::transport_fatal(e.to_string()))?;
        Ok(Self { client })
    }

    async fn finish(request: reqwest::RequestBuilder) -> Result<HttpResponse, String> {
        let response = request.send().await.map_err(|e| e.to_string())?;
        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(|e| e.to_string())?;
        Ok(HttpResponse::new(status, body.to_vec()))
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn get(&self, url: &str) -> Result<HttpResponse, String> {
        Self::finish(self.client.get(url)).await
    }

    async fn post(&self, url: &str, body: Vec<u8>) -> Result<HttpResponse, String> {
        Self::finish(
            self.client
                .post(url)
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(body),
        )
        .await
    }

    async fn delete(&self, url: &str) -> Result<HttpResponse, String> {
        Self::finish(self.client.delete(url)).await
    }
}

/// A loopback HTTP client that routes requests directly to a server.
///
/// Useful for testing without actual network overhead.
pub struct LoopbackClient<S: LoopbackServer> {
    server: S,
}

impl<S: LoopbackServer> LoopbackClient<S> {
    /// Creates a new loopback client connected to the given server.
    pub fn new(server: S) -> Self {
        Self { server }
    }

    fn path(url: &str) -> &str {
        url.find("/api/").map(|i| &url[i..]).unwrap_or(url)
    }
}

/// Trait for servers that can handle loopback requests.
pub trait LoopbackServer: Send + Sync {
    /// Handles a request. `path` includes the query string.
    fn handle(&self, method: &str, path: &str, body: &[u8]) -> HttpResponse;
}

#[async_trait]
impl<S: LoopbackServer> HttpClient for LoopbackClient<S> {
    async fn get(&self, url: &str) -> Result<HttpResponse, String> {
        Ok(self.server.handle("GET", Self::path(url), &[]))
    }

    async fn post(&self, url: &str, body: Vec<u8>) -> Result<HttpResponse, String> {
        Ok(self.server.handle("POST", Self::path(url), &body))
    }

    async fn delete(&self, url: &str) -> Result<HttpResponse, String> {
        Ok(self.server.handle("DELETE", Self::path(url), &[]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};
    use parking_lot::Mutex;
    use spendsync_protocol::NewExpense;

    /// Replays a canned response and records the requests it saw.
    struct TestClient {
        response: Mutex<Result<HttpResponse, String>>,
        requests: Mutex<Vec<(String, String)>>,
    }

    impl TestClient {
        fn new(response: Result<HttpResponse, String>) -> Self {
            Self {
                response: Mutex::new(response),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn reply(&self, method: &str, url: &str) -> Result<HttpResponse, String> {
            self.requests.lock().push((method.into(), url.into()));
            self.response.lock().clone()
        }
    }

    #[async_trait]
    impl HttpClient for TestClient {
        async fn get(&self, url: &str) -> Result<HttpResponse, String> {
            self.reply("GET", url)
        }

        async fn post(&self, url: &str, _body: Vec<u8>) -> Result<HttpResponse, String> {
            self.reply("POST", url)
        }

        async fn delete(&self, url: &str) -> Result<HttpResponse, String> {
            self.reply("DELETE", url)
        }
    }

    fn synced_lunch(id: &str) -> Expense {
        let new = NewExpense::parse(
            "12.50",
            "food",
            "lunch",
            NaiveDate::from_ymd_opt(2024, 5, 10).unwrap(),
        )
        .unwrap();
        let mut expense = Expense::create(new, Utc::now()).into_synced();
        expense.id = ServerId::new(id).into();
        expense
    }

    #[test]
    fn base_url_is_normalized() {
        let repo = HttpRepository::new("http://localhost:5000/", TestClient::new(Err("x".into())));
        assert_eq!(repo.base_url(), "http://localhost:5000");
    }

    #[tokio::test]
    async fn fetch_builds_since_query() {
        let body = serde_json::to_vec(&FetchResponse {
            expenses: vec![synced_lunch("a1")],
            server_time: Utc::now(),
        })
        .unwrap();
        let repo = HttpRepository::new(
            "http://localhost:5000",
            TestClient::new(Ok(HttpResponse::new(200, body))),
        );

        let since = Utc.with_ymd_and_hms(2024, 5, 10, 12, 0, 0).unwrap();
        let fetched = repo.fetch(Some(since)).await.unwrap();
        assert_eq!(fetched.expenses.len(), 1);

        let requests = repo.client.requests.lock().clone();
        assert_eq!(
            requests,
            vec![(
                "GET".to_string(),
                "http://localhost:5000/api/expenses?since=2024-05-10T12:00:00Z".to_string()
            )]
        );
    }

    #[tokio::test]
    async fn error_status_maps_to_server_error() {
        let body = serde_json::to_vec(&ErrorBody::new("Expense not found")).unwrap();
        let repo = HttpRepository::new(
            "http://localhost:5000",
            TestClient::new(Ok(HttpResponse::new(404, body))),
        );

        let err = repo.delete(&ServerId::new("nope")).await.unwrap_err();
        match err {
            SyncError::Server { status, message } => {
                assert_eq!(status, 404);
                assert_eq!(message, "Expense not found");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn unreachable_server_is_retryable() {
        let repo = HttpRepository::new(
            "http://localhost:5000",
            TestClient::new(Err("connection refused".into())),
        );

        let err = repo.push(&[synced_lunch("a1")]).await.unwrap_err();
        assert!(matches!(err, SyncError::Transport { .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn garbage_body_is_protocol_error() {
        let repo = HttpRepository::new(
            "http://localhost:5000",
            TestClient::new(Ok(HttpResponse::new(200, b"<html>".to_vec()))),
        );

        assert!(matches!(
            repo.fetch(None).await,
            Err(SyncError::Protocol(_))
        ));
    }

    #[test]
    fn loopback_path_extraction() {
        struct Null;
        impl LoopbackServer for Null {
            fn handle(&self, _: &str, _: &str, _: &[u8]) -> HttpResponse {
                HttpResponse::new(204, Vec::new())
            }
        }
        type Client = LoopbackClient<Null>;

        assert_eq!(
            Client::path("http://memory/api/expenses?since=x"),
            "/api/expenses?since=x"
        );
        assert_eq!(Client::path("/api/expenses/sync"), "/api/expenses/sync");
    }
}
