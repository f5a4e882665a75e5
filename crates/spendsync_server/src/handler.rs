//! Request handlers for the expense endpoints.
//!
//! Routes:
//!
//! | Method | Path | Body | Response |
//! |---|---|---|---|
//! | GET | `/api/expenses[?since=<RFC 3339>]` | | [`FetchResponse`] |
//! | POST | `/api/expenses/sync` | [`PushRequest`] | [`PushResponse`] |
//! | DELETE | `/api/expenses/{id}` | | [`DeleteResponse`] |
//! | POST | `/api/expenses` | [`NewExpense`] | [`Expense`] (201) |
//! | PUT | `/api/expenses/{id}` | [`ExpensePatch`] | [`Expense`] |
//! | GET | `/api/expenses/export` | | CSV |
//!
//! Errors are answered with an [`ErrorBody`].

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::repository::ExpenseRepository;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use spendsync_protocol::{
    DeleteResponse, ErrorBody, Expense, ExpensePatch, FetchResponse, NewExpense, PushRequest,
    PushResponse, ServerId,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Handler for expense requests.
pub struct RequestHandler {
    config: ServerConfig,
    repository: Arc<ExpenseRepository>,
}

impl RequestHandler {
    /// Creates a new request handler.
    pub fn new(config: ServerConfig, repository: Arc<ExpenseRepository>) -> Self {
        Self { config, repository }
    }

    /// Returns the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Returns the record repository.
    pub fn repository(&self) -> &Arc<ExpenseRepository> {
        &self.repository
    }

    /// Handles a pull. `since` is the raw query value.
    pub fn handle_fetch(&self, since: Option<&str>) -> ServerResult<FetchResponse> {
        let since = since.map(parse_since).transpose()?;
        Ok(self.repository.fetch(since))
    }

    /// Handles a batch push.
    pub fn handle_push(&self, request: PushRequest) -> ServerResult<PushResponse> {
        let count = request.expenses.len();
        if count > self.config.max_push_batch {
            return Err(ServerError::BatchTooLarge {
                count,
                max: self.config.max_push_batch,
            });
        }
        let expenses = self.repository.push(request.expenses)?;
        info!(count, "push accepted");
        Ok(PushResponse { expenses })
    }

    /// Handles a single-record delete.
    pub fn handle_delete(&self, id: &str) -> ServerResult<DeleteResponse> {
        let expense = self.repository.delete(&ServerId::new(id))?;
        info!(%id, "expense deleted");
        Ok(DeleteResponse { expense })
    }

    /// Handles a single-record create.
    pub fn handle_create(&self, new: NewExpense) -> ServerResult<Expense> {
        let expense = self.repository.create(new)?;
        info!(id = %expense.id, "expense created");
        Ok(expense)
    }

    /// Handles a single-record edit.
    pub fn handle_update(&self, id: &str, patch: ExpensePatch) -> ServerResult<Expense> {
        self.repository.update(&ServerId::new(id), &patch)
    }

    /// Handles a CSV export.
    pub fn handle_export(&self) -> ServerResult<String> {
        self.repository.export_csv()
    }

    /// Routes a raw request and returns the status and body.
    ///
    /// `path` may carry a query string. Used for in-process transports;
    /// the HTTP router calls the typed handlers directly.
    pub fn handle(&self, method: &str, path: &str, body: &[u8]) -> (u16, Vec<u8>) {
        debug!(%method, %path, "request");
        let (path, query) = path.split_once('?').unwrap_or((path, ""));
        let segments: Vec<&str> = path.trim_matches('/').split('/').collect();

        let result = match (method, segments.as_slice()) {
            ("GET", ["api", "expenses"]) => self
                .handle_fetch(query_param(query, "since"))
                .and_then(|r| json(200, &r)),
            ("GET", ["api", "expenses", "export"]) => self
                .handle_export()
                .map(|csv| (200, csv.into_bytes())),
            ("POST", ["api", "expenses", "sync"]) => decode(body)
                .and_then(|request| self.handle_push(request))
                .and_then(|r| json(200, &r)),
            ("POST", ["api", "expenses"]) => decode(body)
                .and_then(|new| self.handle_create(new))
                .and_then(|r| json(201, &r)),
            ("PUT", ["api", "expenses", id]) => decode(body)
                .and_then(|patch| self.handle_update(id, patch))
                .and_then(|r| json(200, &r)),
            ("DELETE", ["api", "expenses", id]) => {
                self.handle_delete(id).and_then(|r| json(200, &r))
            }
            _ => Err(ServerError::NoRoute {
                method: method.to_string(),
                path: path.to_string(),
            }),
        };

        result.unwrap_or_else(|e| error_response(&e))
    }
}

/// Parses a `since` watermark.
fn parse_since(raw: &str) -> ServerResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| ServerError::InvalidRequest(format!("invalid since {raw:?}: {e}")))
}

fn query_param<'a>(query: &'a str, name: &str) -> Option<&'a str> {
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value)
}

fn decode<T: DeserializeOwned>(body: &[u8]) -> ServerResult<T> {
    serde_json::from_slice(body)
        .map_err(|e| ServerError::InvalidRequest(format!("malformed body: {e}")))
}

fn json<T: Serialize>(status: u16, value: &T) -> ServerResult<(u16, Vec<u8>)> {
    serde_json::to_vec(value)
        .map(|body| (status, body))
        .map_err(|e| ServerError::Internal(e.to_string()))
}

/// Renders an error as its status and [`ErrorBody`].
pub(crate) fn error_response(error: &ServerError) -> (u16, Vec<u8>) {
    if error.is_server_error() {
        warn!(%error, "request failed");
    } else {
        debug!(%error, "request rejected");
    }
    let body = serde_json::to_vec(&ErrorBody::new(error.to_string())).unwrap_or_default();
    (error.status_code(), body)
}
