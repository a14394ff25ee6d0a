use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Router;

use crate::application::task_service::{TaskError, TaskService};
use crate::domain::task::TaskId;
use crate::http::payload::{PayloadRejection, RequestPayload};
use crate::http::types::ApiResponse;

const NOT_FOUND: &str = "API_TASK_NOT_FOUND";

#[derive(Clone)]
pub struct AppState<S: TaskService> { pub service: S }

pub fn router<S: TaskService + Clone>(state: AppState<S>) -> Router {
    Router::new()
        .route("/tasks", post(create_task::<S>).get(list_tasks::<S>))
        .route(
            "/tasks/:id",
            get(get_task::<S>).put(update_task::<S>).patch(partial_update_task::<S>).delete(delete_task::<S>),
        )
        .with_state(state)
}

#[derive(Debug, Clone, Copy)]
enum Op { Create, Retrieve, Update, Delete, List }

impl Op {
    fn success(self) -> (&'static str, &'static str) {
        match self {
            Op::Create => ("API_TASK_CREATE_SUCCESS", "Task created successfully"),
            Op::Retrieve => ("API_TASK_RETRIEVE_SUCCESS", "Task retrieved successfully"),
            Op::Update => ("API_TASK_UPDATE_SUCCESS", "Task updated successfully"),
            Op::Delete => ("API_TASK_DELETE_SUCCESS", "Task deleted successfully"),
            Op::List => ("API_TASK_LIST_SUCCESS", "Tasks retrieved successfully"),
        }
    }

    fn failure(self) -> (&'static str, &'static str) {
        match self {
            Op::Create => ("API_TASK_CREATE_ERROR", "Failed to create task"),
            Op::Retrieve => ("API_TASK_RETRIEVE_ERROR", "Failed to retrieve task."),
            Op::Update => ("API_TASK_UPDATE_ERROR", "Failed to update task"),
            Op::Delete => ("API_TASK_DELETE_ERROR", "Failed to delete task."),
            Op::List => ("API_TASK_LIST_ERROR", "Failed to retrieve tasks."),
        }
    }

    fn not_found(self) -> ApiResponse {
        let message = match self {
            Op::Update => "Task does not exist.",
            _ => "Task not found",
        };
        ApiResponse::status(StatusCode::NOT_FOUND, NOT_FOUND, message)
    }
}

async fn create_task<S: TaskService>(State(state): State<AppState<S>>, payload: Result<RequestPayload, PayloadRejection>) -> ApiResponse {
    let payload = match payload {
        Ok(payload) => payload,
        Err(rejection) => return rejected(Op::Create, &rejection),
    };
    match state.service.create(&payload.fields).await {
        Ok(task) => {
            let (code, message) = Op::Create.success();
            ApiResponse::success(StatusCode::CREATED, code, message, "task", &task)
        }
        Err(e) => error_response(Op::Create, e),
    }
}

async fn list_tasks<S: TaskService>(State(state): State<AppState<S>>) -> ApiResponse {
    match state.service.list().await {
        Ok(tasks) => {
            let (code, message) = Op::List.success();
            ApiResponse::success(StatusCode::OK, code, message, "tasks", &tasks)
        }
        Err(e) => error_response(Op::List, e),
    }
}

async fn get_task<S: TaskService>(State(state): State<AppState<S>>, Path(id): Path<String>) -> ApiResponse {
    let Some(id) = parse_id(&id) else { return Op::Retrieve.not_found() };
    match state.service.get(id).await {
        Ok(task) => {
            let (code, message) = Op::Retrieve.success();
            ApiResponse::success(StatusCode::OK, code, message, "task", &task)
        }
        Err(e) => error_response(Op::Retrieve, e),
    }
}

async fn update_task<S: TaskService>(
    State(state): State<AppState<S>>,
    Path(id): Path<String>,
    payload: Result<RequestPayload, PayloadRejection>,
) -> ApiResponse {
    change(&state.service, &id, payload, false).await
}

async fn partial_update_task<S: TaskService>(
    State(state): State<AppState<S>>,
    Path(id): Path<String>,
    payload: Result<RequestPayload, PayloadRejection>,
) -> ApiResponse {
    change(&state.service, &id, payload, true).await
}

async fn change<S: TaskService>(service: &S, id: &str, payload: Result<RequestPayload, PayloadRejection>, partial: bool) -> ApiResponse {
    let Some(id) = parse_id(id) else { return Op::Update.not_found() };
    let payload = match payload {
        Ok(payload) => payload,
        // An unreadable body on a missing task is still a not-found.
        Err(rejection) => {
            return match service.get(id).await {
                Ok(_) => rejected(Op::Update, &rejection),
                Err(e) => error_response(Op::Update, e),
            };
        }
    };
    let result = if partial {
        service.partial_update(id, &payload.fields).await
    } else {
        service.update(id, &payload.fields).await
    };
    match result {
        Ok(task) => {
            let (code, message) = Op::Update.success();
            ApiResponse::success(StatusCode::OK, code, message, "task", &task)
        }
        Err(e) => error_response(Op::Update, e),
    }
}

async fn delete_task<S: TaskService>(State(state): State<AppState<S>>, Path(id): Path<String>) -> ApiResponse {
    let Some(id) = parse_id(&id) else { return Op::Delete.not_found() };
    match state.service.delete(id).await {
        Ok(()) => ApiResponse::no_content(),
        Err(e) => error_response(Op::Delete, e),
    }
}

fn parse_id(raw: &str) -> Option<TaskId> { raw.parse().ok() }

fn rejected(op: Op, rejection: &PayloadRejection) -> ApiResponse {
    let (code, message) = op.failure();
    rejection.to_response(code, message)
}

fn error_response(op: Op, err: TaskError) -> ApiResponse {
    let (code, message) = op.failure();
    match err {
        TaskError::Validation(errors) => ApiResponse::invalid(code, message, &errors),
        TaskError::NotFound => op.not_found(),
        TaskError::Store(e) => {
            tracing::error!(error = %e, ?op, "task operation failed");
            ApiResponse::failure(StatusCode::INTERNAL_SERVER_ERROR, code, message, e)
        }
    }
}
