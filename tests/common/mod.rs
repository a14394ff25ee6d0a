#![allow(dead_code)]

use axum::body::{to_bytes, Body};
use axum::http::{Method, Request};
use axum::Router;
use serde_json::Value;
use tower::ServiceExt;

use task_api::application::credentials::PasswordHasher;
use task_api::application::task_service::TaskServiceImpl;
use task_api::application::user_service::{UserService, UserServiceImpl};
use task_api::domain::repository::{TaskRepository, UserRepository};
use task_api::domain::validation::Payload;
use task_api::http::routes::{tasks, users};
use task_api::http::routing;
use task_api::infrastructure::{sqlite, sqlite_task_repo::SqliteTaskRepository, sqlite_user_repo::SqliteUserRepository};

pub struct TestApp {
    pub router: Router,
    pub user_service: UserServiceImpl<SqliteUserRepository>,
    /// Token of a seeded active admin.
    pub token: String,
}

pub async fn spawn_app() -> TestApp {
    let pool = sqlite::connect("sqlite::memory:").await.unwrap();
    let task_repo = SqliteTaskRepository::new(pool.clone());
    task_repo.init().await.unwrap();
    let user_repo = SqliteUserRepository::new(pool);
    user_repo.init().await.unwrap();

    let user_service = UserServiceImpl::new(user_repo, PasswordHasher::new(64, 1, 1).unwrap());
    let admin = user_service
        .create(&object(serde_json::json!({ "username": "admin", "email": "admin@example.com", "password": "admin" })))
        .await
        .unwrap();
    let token = user_service.repository().token_for(admin.id).await.unwrap().unwrap();

    let router = routing::app(
        tasks::router(tasks::AppState { service: TaskServiceImpl::new(task_repo) }),
        users::router(users::AppState { service: user_service.clone() }),
    );
    TestApp { router, user_service, token }
}

pub fn object(value: Value) -> Payload {
    match value {
        Value::Object(map) => map,
        other => panic!("expected a JSON object, got {other}"),
    }
}

pub struct Reply {
    pub status: u16,
    pub body: Value,
}

pub async fn request(app: &Router, method: &str, path: &str, body: Option<Value>, token: Option<&str>) -> Reply {
    let req = Request::builder().method(Method::from_bytes(method.as_bytes()).unwrap()).uri(path);
    let req = match token {
        Some(token) => req.header("authorization", format!("Token {token}")),
        None => req,
    };
    let req = match body {
        Some(json) => req.header("content-type", "application/json").body(Body::from(json.to_string())).unwrap(),
        None => req.body(Body::empty()).unwrap(),
    };
    send(app, req).await
}

pub async fn send(app: &Router, req: Request<Body>) -> Reply {
    let res = app.clone().oneshot(req).await.unwrap();
    let status = res.status().as_u16();
    let bytes = to_bytes(res.into_body(), 16 * 1024 * 1024).await.unwrap();
    let body = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap_or(Value::Null) };
    Reply { status, body }
}

/// A multipart body with text `fields` and one file part per `(field, size)`.
pub fn multipart(boundary: &str, fields: &[(&str, &str)], files: &[(&str, usize)]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(format!("--{boundary}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n").as_bytes());
    }
    for (name, size) in files {
        body.extend_from_slice(
            format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{name}.png\"\r\nContent-Type: image/png\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend(std::iter::repeat(0u8).take(*size));
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
    body
}
