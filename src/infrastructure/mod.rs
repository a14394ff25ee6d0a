pub mod sqlite;
pub mod sqlite_task_repo;
pub mod sqlite_user_repo;
