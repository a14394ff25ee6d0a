use async_trait::async_trait;
use thiserror::Error;

use crate::domain::repository::{StoreError, TaskRepository};
use crate::domain::task::{NewTask, Task, TaskChanges, TaskId};
use crate::domain::validation::{FieldErrors, Payload, UpdateMode};

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("invalid task payload")]
    Validation(FieldErrors),
    #[error("task not found")]
    NotFound,
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[async_trait]
pub trait TaskService: Send + Sync + 'static {
    async fn create(&self, payload: &Payload) -> Result<Task, TaskError>;
    async fn get(&self, id: TaskId) -> Result<Task, TaskError>;
    async fn list(&self) -> Result<Vec<Task>, TaskError>;
    async fn update(&self, id: TaskId, payload: &Payload) -> Result<Task, TaskError>;
    async fn partial_update(&self, id: TaskId, payload: &Payload) -> Result<Task, TaskError>;
    async fn delete(&self, id: TaskId) -> Result<(), TaskError>;
}

#[derive(Clone)]
pub struct TaskServiceImpl<R: TaskRepository> {
    repo: R,
}

impl<R: TaskRepository> TaskServiceImpl<R> {
    pub fn new(repo: R) -> Self { Self { repo } }

    async fn change(&self, id: TaskId, payload: &Payload, mode: UpdateMode) -> Result<Task, TaskError> {
        if self.repo.get(id).await?.is_none() {
            return Err(TaskError::NotFound);
        }
        let changes = TaskChanges::from_payload(payload, mode).map_err(TaskError::Validation)?;
        let task = self.repo.update(id, changes).await?.ok_or(TaskError::NotFound)?;
        tracing::info!(task_id = %task.id, ?mode, "task updated");
        Ok(task)
    }
}

#[async_trait]
impl<R: TaskRepository> TaskService for TaskServiceImpl<R> {
    async fn create(&self, payload: &Payload) -> Result<Task, TaskError> {
        let input = NewTask::from_payload(payload).map_err(TaskError::Validation)?;
        let task = self.repo.create(input).await?;
        tracing::info!(task_id = %task.id, "task created");
        Ok(task)
    }

    async fn get(&self, id: TaskId) -> Result<Task, TaskError> {
        self.repo.get(id).await?.ok_or(TaskError::NotFound)
    }

    async fn list(&self) -> Result<Vec<Task>, TaskError> { Ok(self.repo.list().await?) }

    async fn update(&self, id: TaskId, payload: &Payload) -> Result<Task, TaskError> {
        self.change(id, payload, UpdateMode::Full).await
    }

    async fn partial_update(&self, id: TaskId, payload: &Payload) -> Result<Task, TaskError> {
        self.change(id, payload, UpdateMode::Partial).await
    }

    async fn delete(&self, id: TaskId) -> Result<(), TaskError> {
        if !self.repo.delete(id).await? {
            return Err(TaskError::NotFound);
        }
        tracing::info!(task_id = %id, "task deleted");
        Ok(())
    }
}
