//! Defines the Axum API routes and handlers.
//!
//! Route names map onto [`DoorAction`] through a fixed match; anything else
//! is a 404. Controller calls block for up to the maximum motor runtime, so
//! they run on the blocking thread pool.

use crate::motion::{ControlError, MotionController, OperationResult};
use crate::web::models::{ActionResponse, DoorAction, ErrorResponse, StatusResponse};
use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use std::sync::Arc;
use thiserror::Error;

pub type AppState = Arc<MotionController>;

#[derive(Debug, Error)]
pub enum WebError {
    #[error("Unknown action: {0}")]
    UnknownAction(String),
    #[error("{0}")]
    Control(#[from] ControlError),
    #[error("Controller task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        let code = match &self {
            WebError::UnknownAction(_) => StatusCode::NOT_FOUND,
            WebError::Control(_) | WebError::Join(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        tracing::warn!("Request failed: {}", self);
        (code, Json(ErrorResponse { error: self.to_string() })).into_response()
    }
}

/// Creates the Axum router with all the API endpoints.
pub fn create_router(controller: AppState) -> Router {
    Router::new()
        .route("/door/action/{name}", get(door_action))
        .route("/door/status", get(door_status))
        .with_state(controller)
}

/// Handler for `/door/action/{name}`.
async fn door_action(
    State(controller): State<AppState>,
    Path(name): Path<String>,
) -> Result<(StatusCode, Json<ActionResponse>), WebError> {
    let action: DoorAction = name.parse().map_err(WebError::UnknownAction)?;
    tracing::info!("HTTP request: {}", action);

    let (code, result, resumed) = match action {
        DoorAction::Status => (StatusCode::OK, None, None),
        DoorAction::Open | DoorAction::Close => {
            let worker = controller.clone();
            let result = tokio::task::spawn_blocking(move || match action {
                DoorAction::Open => worker.open(),
                _ => worker.close(),
            })
            .await??;
            (result_code(&result), Some(result), None)
        }
        DoorAction::Resume => {
            let worker = controller.clone();
            let result = tokio::task::spawn_blocking(move || worker.resume_outcome()).await??;
            let code = result.as_ref().map_or(StatusCode::OK, result_code);
            let resumed = Some(result.is_some());
            (code, result, resumed)
        }
    };

    Ok((
        code,
        Json(ActionResponse {
            action,
            result,
            resumed,
            status: controller.status(),
        }),
    ))
}

/// Handler for `/door/status`; never waits on an operation.
async fn door_status(State(controller): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        status: controller.status(),
        busy: controller.is_busy(),
    })
}

fn result_code(result: &OperationResult) -> StatusCode {
    match result {
        OperationResult::Opened | OperationResult::Closed => StatusCode::OK,
        OperationResult::PreconditionViolation | OperationResult::MotorBusy => StatusCode::CONFLICT,
        OperationResult::FailedTimeout => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
