//! HTTP front end.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::handler::{error_response, RequestHandler};
use crate::repository::ExpenseRepository;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use spendsync_protocol::{
    DeleteResponse, ErrorBody, Expense, ExpensePatch, FetchResponse, NewExpense, PushRequest,
    PushResponse,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{info, warn};

/// The expense server.
///
/// Serves the routes listed in [`RequestHandler`] over HTTP.
///
/// # Example
///
/// ```no_run
/// use spendsync_server::{ServerConfig, SyncServer};
///
/// # async fn run() -> spendsync_server::ServerResult<()> {
/// let server = SyncServer::new(ServerConfig::default());
/// server.serve_with_shutdown(async {
///     let _ = tokio::signal::ctrl_c().await;
/// }).await
/// # }
/// ```
pub struct SyncServer {
    handler: Arc<RequestHandler>,
}

impl SyncServer {
    /// Creates a server with an empty repository.
    pub fn new(config: ServerConfig) -> Self {
        Self::with_repository(config, Arc::new(ExpenseRepository::new()))
    }

    /// Creates a server over an existing repository.
    pub fn with_repository(config: ServerConfig, repository: Arc<ExpenseRepository>) -> Self {
        Self {
            handler: Arc::new(RequestHandler::new(config, repository)),
        }
    }

    /// Returns the request handler.
    pub fn handler(&self) -> &Arc<RequestHandler> {
        &self.handler
    }

    /// Returns the server configuration.
    pub fn config(&self) -> &ServerConfig {
        self.handler.config()
    }

    /// Builds the axum router.
    pub fn router(&self) -> Router {
        let timeout = self.config().request_timeout;
        Router::new()
            .route("/api/expenses", get(fetch).post(create))
            .route("/api/expenses/sync", post(push))
            .route("/api/expenses/export", get(export))
            .route("/api/expenses/:id", put(update).delete(delete))
            .layer(middleware::from_fn_with_state(timeout, enforce_timeout))
            .with_state(Arc::clone(&self.handler))
    }

    /// Binds `config.bind_addr` and serves until `signal` resolves.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> ServerResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.config().bind_addr).await?;
        self.serve_on(listener, signal).await
    }

    /// Serves on an already bound listener until `signal` resolves.
    pub async fn serve_on<F>(self, listener: TcpListener, signal: F) -> ServerResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        info!(%addr, "expense server listening");
        axum::serve(listener, self.router())
            .with_graceful_shutdown(signal)
            .await?;
        info!("expense server stopped");
        Ok(())
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, body) = error_response(&self);
        let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, [(header::CONTENT_TYPE, "application/json")], body).into_response()
    }
}

type Shared = State<Arc<RequestHandler>>;

#[derive(Debug, Deserialize)]
struct FetchQuery {
    since: Option<String>,
}

fn rejected(rejection: JsonRejection) -> ServerError {
    ServerError::InvalidRequest(rejection.body_text())
}

async fn fetch(
    State(handler): Shared,
    Query(query): Query<FetchQuery>,
) -> ServerResult<Json<FetchResponse>> {
    handler.handle_fetch(query.since.as_deref()).map(Json)
}

async fn push(
    State(handler): Shared,
    payload: Result<Json<PushRequest>, JsonRejection>,
) -> ServerResult<Json<PushResponse>> {
    let Json(request) = payload.map_err(rejected)?;
    handler.handle_push(request).map(Json)
}

async fn create(
    State(handler): Shared,
    payload: Result<Json<NewExpense>, JsonRejection>,
) -> ServerResult<(StatusCode, Json<Expense>)> {
    let Json(new) = payload.map_err(rejected)?;
    let expense = handler.handle_create(new)?;
    Ok((StatusCode::CREATED, Json(expense)))
}

async fn update(
    State(handler): Shared,
    Path(id): Path<String>,
    payload: Result<Json<ExpensePatch>, JsonRejection>,
) -> ServerResult<Json<Expense>> {
    let Json(patch) = payload.map_err(rejected)?;
    handler.handle_update(&id, patch).map(Json)
}

async fn delete(
    State(handler): Shared,
    Path(id): Path<String>,
) -> ServerResult<Json<DeleteResponse>> {
    handler.handle_delete(&id).map(Json)
}

async fn export(State(handler): Shared) -> ServerResult<impl IntoResponse> {
    let csv = handler.handle_export()?;
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"expenses.csv\"",
            ),
        ],
        csv,
    ))
}

async fn enforce_timeout(State(limit): State<Duration>, request: Request, next: Next) -> Response {
    let path = request.uri().path().to_string();
    match tokio::time::timeout(limit, next.run(request)).await {
        Ok(response) => response,
        Err(_) => {
            warn!(%path, ?limit, "request timed out");
            (
                StatusCode::REQUEST_TIMEOUT,
                Json(ErrorBody::new("request timed out")),
            )
                .into_response()
        }
    }
}
