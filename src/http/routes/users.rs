use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::middleware;
use axum::routing::{get, post};
use axum::{Extension, Router};

use crate::application::user_service::{UserError, UserService};
use crate::domain::user::UserId;
use crate::domain::validation::FieldErrors;
use crate::http::auth::{self, AuthUser};
use crate::http::payload::{PayloadRejection, RequestPayload};
use crate::http::types::ApiResponse;

const EMAIL_IN_USE: &str = "E-mail is already in use.";
const GROUP_MISSING: &str = "Group does not exist.";

#[derive(Clone)]
pub struct AppState<S: UserService> { pub service: S }

/// User routes; every one of them requires a valid access token.
pub fn router<S: UserService + Clone>(state: AppState<S>) -> Router {
    Router::new()
        .route("/users", post(create_user::<S>).get(list_users::<S>))
        .route(
            "/users/:id",
            get(get_user::<S>).put(update_user::<S>).patch(partial_update_user::<S>).delete(delete_user::<S>),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::require_token::<S>))
        .with_state(state)
}

#[derive(Debug, Clone, Copy)]
enum Op { Create, Retrieve, Update, Delete, List }

impl Op {
    fn success(self) -> (&'static str, &'static str) {
        match self {
            Op::Create => ("API_USER_CREATE_SUCCESS", "User created successfully"),
            Op::Retrieve => ("API_USER_RETRIEVE_SUCCESS", "User retrieved successfully"),
            Op::Update => ("API_USER_UPDATE_SUCCESS", "User updated successfully"),
            Op::Delete => ("API_USER_DELETE_SUCCESS", "User deleted successfully"),
            Op::List => ("API_USER_LIST_SUCCESS", "Users retrieved successfully"),
        }
    }

    fn failure(self) -> (&'static str, &'static str) {
        match self {
            Op::Create => ("API_USER_CREATE_ERROR", "Failed to create user"),
            Op::Retrieve => ("API_USER_RETRIEVE_ERROR", "Failed to retrieve user."),
            Op::Update => ("API_USER_UPDATE_ERROR", "Failed to update user"),
            Op::Delete => ("API_USER_DELETE_ERROR", "Failed to delete user."),
            Op::List => ("API_USER_LIST_ERROR", "Failed to retrieve users."),
        }
    }

    fn not_found(self) -> ApiResponse {
        let (code, message) = match self {
            Op::Update => ("API_USER_NOT_FOUND", "User does not exist."),
            Op::Retrieve => ("API_USER_RETRIEVE_ERROR", "User not found"),
            Op::Delete => ("API_USER_DELETE_ERROR", "User not found"),
            Op::Create | Op::List => ("API_USER_NOT_FOUND", "User not found"),
        };
        ApiResponse::status(StatusCode::NOT_FOUND, code, message)
    }
}

async fn create_user<S: UserService>(
    State(state): State<AppState<S>>,
    Extension(actor): Extension<AuthUser>,
    payload: Result<RequestPayload, PayloadRejection>,
) -> ApiResponse {
    let payload = match payload {
        Ok(payload) => payload,
        Err(rejection) => return rejected(Op::Create, &rejection),
    };
    match state.service.create(&payload.fields).await {
        Ok(user) => {
            tracing::info!(actor = %actor.username, user_id = %user.id, "user created via api");
            let (code, message) = Op::Create.success();
            ApiResponse::success(StatusCode::CREATED, code, message, "user", &user)
        }
        Err(e) => error_response(Op::Create, e),
    }
}

async fn list_users<S: UserService>(State(state): State<AppState<S>>) -> ApiResponse {
    match state.service.list().await {
        Ok(users) => {
            let (code, message) = Op::List.success();
            ApiResponse::success(StatusCode::OK, code, message, "users", &users)
        }
        Err(e) => error_response(Op::List, e),
    }
}

async fn get_user<S: UserService>(State(state): State<AppState<S>>, Path(id): Path<String>) -> ApiResponse {
    let Some(id) = parse_id(&id) else { return Op::Retrieve.not_found() };
    match state.service.get(id).await {
        Ok(user) => {
            let (code, message) = Op::Retrieve.success();
            ApiResponse::success(StatusCode::OK, code, message, "user", &user)
        }
        Err(e) => error_response(Op::Retrieve, e),
    }
}

async fn update_user<S: UserService>(
    State(state): State<AppState<S>>,
    Extension(actor): Extension<AuthUser>,
    Path(id): Path<String>,
    payload: Result<RequestPayload, PayloadRejection>,
) -> ApiResponse {
    change(&state.service, &actor, &id, payload, false).await
}

async fn partial_update_user<S: UserService>(
    State(state): State<AppState<S>>,
    Extension(actor): Extension<AuthUser>,
    Path(id): Path<String>,
    payload: Result<RequestPayload, PayloadRejection>,
) -> ApiResponse {
    change(&state.service, &actor, &id, payload, true).await
}

async fn change<S: UserService>(
    service: &S,
    actor: &AuthUser,
    id: &str,
    payload: Result<RequestPayload, PayloadRejection>,
    partial: bool,
) -> ApiResponse {
    let Some(id) = parse_id(id) else { return Op::Update.not_found() };
    let payload = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            return match service.get(id).await {
                Ok(_) => rejected(Op::Update, &rejection),
                Err(e) => error_response(Op::Update, e),
            };
        }
    };
    let avatar = payload.avatar();
    let result = if partial {
        service.partial_update(id, &payload.fields, avatar).await
    } else {
        service.update(id, &payload.fields, avatar).await
    };
    match result {
        Ok(user) => {
            tracing::info!(actor = %actor.username, user_id = %user.id, "user updated via api");
            let (code, message) = Op::Update.success();
            ApiResponse::success(StatusCode::OK, code, message, "user", &user)
        }
        Err(e) => error_response(Op::Update, e),
    }
}

async fn delete_user<S: UserService>(
    State(state): State<AppState<S>>,
    Extension(actor): Extension<AuthUser>,
    Path(id): Path<String>,
) -> ApiResponse {
    let Some(id) = parse_id(&id) else { return Op::Delete.not_found() };
    match state.service.delete(id).await {
        Ok(()) => {
            tracing::info!(actor = %actor.username, user_id = %id, "user deleted via api");
            ApiResponse::no_content()
        }
        Err(e) => error_response(Op::Delete, e),
    }
}

fn parse_id(raw: &str) -> Option<UserId> { raw.parse().ok() }

fn rejected(op: Op, rejection: &PayloadRejection) -> ApiResponse {
    let (code, message) = op.failure();
    rejection.to_response(code, message)
}

fn error_response(op: Op, err: UserError) -> ApiResponse {
    let (code, message) = op.failure();
    match err {
        UserError::Validation(errors) => ApiResponse::invalid(code, message, &errors),
        UserError::NotFound => op.not_found(),
        UserError::EmailTaken => {
            ApiResponse::invalid("API_USER_ALREADY_EXISTS", EMAIL_IN_USE, &FieldErrors::single("email", EMAIL_IN_USE))
        }
        UserError::GroupNotFound(_) => {
            ApiResponse::invalid("API_GROUP_NOT_FOUND", GROUP_MISSING, &FieldErrors::single("groups", GROUP_MISSING))
        }
        UserError::AvatarTooLarge { .. } => ApiResponse::status(
            StatusCode::BAD_REQUEST,
            "API_VIDEO_AVATAR_SIZE_ERROR",
            "The file size must be equal to or less than 2 MB.",
        ),
        e @ (UserError::Hash(_) | UserError::Store(_)) => {
            tracing::error!(error = %e, ?op, "user operation failed");
            ApiResponse::failure(StatusCode::INTERNAL_SERVER_ERROR, code, message, e)
        }
    }
}
