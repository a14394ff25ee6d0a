use async_trait::async_trait;
use chrono::Utc;
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};

use crate::domain::{
    repository::{StoreError, StoreResult, TaskRepository},
    task::{NewTask, Task, TaskChanges, TaskId, TaskStatus},
};

use super::sqlite;

const SELECT_TASK: &str = "SELECT id, title, description, status, created_at, updated_at FROM tasks";

#[derive(Clone)]
pub struct SqliteTaskRepository {
    pool: SqlitePool,
}

impl SqliteTaskRepository {
    pub fn new(pool: SqlitePool) -> Self { Self { pool } }

    pub async fn connect(database_url: &str) -> StoreResult<Self> {
        Ok(Self::new(sqlite::connect(database_url).await?))
    }
}

#[async_trait]
impl TaskRepository for SqliteTaskRepository {
    async fn init(&self) -> StoreResult<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS tasks (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                description TEXT NOT NULL,
                status TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn create(&self, input: NewTask) -> StoreResult<Task> {
        let now = Utc::now();
        let task = Task {
            id: TaskId::default(),
            title: input.title,
            description: input.description,
            status: input.status,
            created_at: now,
            updated_at: now,
        };
        sqlx::query(
            "INSERT INTO tasks (id, title, description, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(task.id.to_string())
        .bind(&task.title)
        .bind(&task.description)
        .bind(task.status.as_str())
        .bind(task.created_at)
        .bind(task.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(task)
    }

    async fn get(&self, id: TaskId) -> StoreResult<Option<Task>> {
        let row = sqlx::query(&format!("{SELECT_TASK} WHERE id = ?1"))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_task).transpose()
    }

    async fn list(&self) -> StoreResult<Vec<Task>> {
        let rows = sqlx::query(&format!("{SELECT_TASK} ORDER BY created_at, id"))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_task).collect()
    }

    async fn update(&self, id: TaskId, changes: TaskChanges) -> StoreResult<Option<Task>> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query(&format!("{SELECT_TASK} WHERE id = ?1"))
            .bind(id.to_string())
            .fetch_optional(&mut *tx)
            .await?;
        let Some(row) = row else { return Ok(None) };
        let mut task = row_to_task(&row)?;

        changes.apply(&mut task);
        task.updated_at = Utc::now();

        sqlx::query("UPDATE tasks SET title = ?2, description = ?3, status = ?4, updated_at = ?5 WHERE id = ?1")
            .bind(task.id.to_string())
            .bind(&task.title)
            .bind(&task.description)
            .bind(task.status.as_str())
            .bind(task.updated_at)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(Some(task))
    }

    async fn delete(&self, id: TaskId) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query("DELETE FROM tasks WHERE id = ?1")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }
}

fn row_to_task(row: &SqliteRow) -> StoreResult<Task> {
    let id: String = row.try_get("id")?;
    let status: String = row.try_get("status")?;
    Ok(Task {
        id: id.parse().map_err(|e| StoreError::Corrupt(format!("task id {id:?}: {e}")))?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        status: TaskStatus::parse(&status).ok_or_else(|| StoreError::Corrupt(format!("task status {status:?}")))?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn repo() -> SqliteTaskRepository {
        let repo = SqliteTaskRepository::connect("sqlite::memory:").await.unwrap();
        repo.init().await.unwrap();
        repo
    }

    fn new_task(title: &str) -> NewTask {
        NewTask { title: title.into(), description: "d".into(), status: TaskStatus::Pending }
    }

    #[tokio::test]
    async fn create_then_get_round_trips_timestamps() {
        let repo = repo().await;
        let created = repo.create(new_task("a")).await.unwrap();
        let fetched = repo.get(created.id).await.unwrap().unwrap();
        assert_eq!(fetched, created);
    }

    #[tokio::test]
    async fn update_advances_updated_at_only() {
        let repo = repo().await;
        let created = repo.create(new_task("a")).await.unwrap();
        let changes = TaskChanges { status: Some(TaskStatus::Done), ..Default::default() };
        let updated = repo.update(created.id, changes).await.unwrap().unwrap();
        assert_eq!(updated.status, TaskStatus::Done);
        assert_eq!(updated.created_at, created.created_at);
        assert!(updated.updated_at > created.updated_at);
    }

    #[tokio::test]
    async fn update_and_delete_missing_task() {
        let repo = repo().await;
        assert!(repo.update(TaskId::default(), TaskChanges::default()).await.unwrap().is_none());
        assert!(!repo.delete(TaskId::default()).await.unwrap());
    }
}
