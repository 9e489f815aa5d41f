//! HTTP API for the orchestrator.
//!
//! Public routes accept expressions and report their progress; internal
//! routes are polled by agents for tasks and results.

use std::future::Future;
use std::net::SocketAddr;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpListener;

use crate::agent::TaskResult;
use crate::core::{AtomicTask, ExpressionId, ExpressionSnapshot};
use crate::error::{Error, Result};
use crate::orchestration::Coordinator;
use crate::{clog, clog_debug, clog_error};

#[derive(Debug, Deserialize)]
struct CalculateRequest {
    expression: String,
}

#[derive(Debug, Serialize)]
struct CalculateResponse {
    id: ExpressionId,
}

#[derive(Debug, Serialize)]
struct ExpressionsResponse {
    expressions: Vec<ExpressionSnapshot>,
}

#[derive(Debug, Serialize)]
struct ExpressionResponse {
    expression: ExpressionSnapshot,
}

#[derive(Debug, Serialize)]
struct TaskResponse {
    task: AtomicTask,
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        let status = match &error {
            Error::Parse(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Error::ExpressionNotFound { .. } | Error::TaskNotFound { .. } => StatusCode::NOT_FOUND,
            _ => {
                clog_error!("Request failed: {}", error);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self {
            status,
            message: error.to_string(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self {
            status: StatusCode::UNPROCESSABLE_ENTITY,
            message: format!("invalid JSON: {}", rejection.body_text()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "error": self.message }));
        (self.status, body).into_response()
    }
}

/// Build the orchestrator router around a shared coordinator.
pub fn router(coordinator: Coordinator) -> Router {
    Router::new()
        .route("/api/v1/calculate", post(calculate))
        .route("/api/v1/expressions", get(list_expressions))
        .route("/api/v1/expressions/:id", get(get_expression))
        .route("/internal/task", get(next_task).post(submit_result))
        .with_state(coordinator)
}

/// Serve the API on `0.0.0.0:port` until Ctrl-C.
pub async fn serve(coordinator: Coordinator, port: u16) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    serve_with_shutdown(listener, coordinator, async {
        if tokio::signal::ctrl_c().await.is_ok() {
            clog!("Shutting down orchestrator");
        }
    })
    .await
}

/// Serve the API on an already bound listener until `shutdown` resolves.
pub async fn serve_with_shutdown<F>(
    listener: TcpListener,
    coordinator: Coordinator,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    clog!("Orchestrator listening on {}", listener.local_addr()?);
    axum::serve(listener, router(coordinator))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

async fn calculate(
    State(coordinator): State<Coordinator>,
    request: std::result::Result<Json<CalculateRequest>, JsonRejection>,
) -> std::result::Result<(StatusCode, Json<CalculateResponse>), ApiError> {
    let Json(request) = request?;
    let id = coordinator.submit(&request.expression).await?;
    Ok((StatusCode::CREATED, Json(CalculateResponse { id })))
}

async fn list_expressions(State(coordinator): State<Coordinator>) -> Json<ExpressionsResponse> {
    Json(ExpressionsResponse {
        expressions: coordinator.list().await,
    })
}

async fn get_expression(
    State(coordinator): State<Coordinator>,
    Path(id): Path<ExpressionId>,
) -> std::result::Result<Json<ExpressionResponse>, ApiError> {
    let expression = coordinator.get(id).await?;
    Ok(Json(ExpressionResponse { expression }))
}

async fn next_task(
    State(coordinator): State<Coordinator>,
) -> std::result::Result<Json<TaskResponse>, ApiError> {
    match coordinator.next_task().await {
        Some(task) => Ok(Json(TaskResponse { task })),
        None => Err(ApiError::not_found("no task")),
    }
}

async fn submit_result(
    State(coordinator): State<Coordinator>,
    body: std::result::Result<Json<TaskResult>, JsonRejection>,
) -> std::result::Result<Json<serde_json::Value>, ApiError> {
    let Json(body) = body?;
    let status = coordinator.submit_result(body.id, body.result).await?;
    clog_debug!("Accepted result for task {}, expression now {}", body.id, status);
    Ok(Json(json!({ "status": "result accepted" })))
}
