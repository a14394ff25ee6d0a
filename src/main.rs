use task_api::application::credentials::PasswordHasher;
use task_api::application::task_service::TaskServiceImpl;
use task_api::application::user_service::UserServiceImpl;
use task_api::config::{self, Config};
use task_api::domain::repository::{TaskRepository, UserRepository};
use task_api::http::routes::{tasks, users};
use task_api::http::routing;
use task_api::infrastructure::{sqlite, sqlite_task_repo::SqliteTaskRepository, sqlite_user_repo::SqliteUserRepository};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    config::init_tracing("info");

    let pool = sqlite::connect(&config.database_url).await?;
    let task_repo = SqliteTaskRepository::new(pool.clone());
    task_repo.init().await?;
    let user_repo = SqliteUserRepository::new(pool);
    user_repo.init().await?;

    let tasks_router = tasks::router(tasks::AppState { service: TaskServiceImpl::new(task_repo) });
    let users_router = users::router(users::AppState { service: UserServiceImpl::new(user_repo, PasswordHasher::default()) });
    let router = routing::app(tasks_router, users_router);

    tracing::info!(addr = %config.bind_addr, "listening");
    axum::serve(tokio::net::TcpListener::bind(config.bind_addr).await?, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    use tokio::signal::ctrl_c;
    let _ = ctrl_c().await;
    tracing::info!("shutdown");
}
