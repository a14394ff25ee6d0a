use async_trait::async_trait;
use thiserror::Error;

use super::task::{NewTask, Task, TaskChanges, TaskId};
use super::user::{Group, GroupId, NewUser, PasswordHash, User, UserChanges, UserId};

/// Failures reported by a store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A unique index rejected the write; carries the offending column.
    #[error("unique constraint violated on {0}")]
    Conflict(String),
    /// Some referenced groups do not exist. Nothing was written.
    #[error("unknown group ids: {0:?}")]
    MissingGroups(Vec<GroupId>),
    #[error("corrupt row: {0}")]
    Corrupt(String),
    #[error("database error: {0}")]
    Database(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait TaskRepository: Send + Sync + 'static {
    async fn init(&self) -> StoreResult<()>;
    async fn create(&self, input: NewTask) -> StoreResult<Task>;
    async fn get(&self, id: TaskId) -> StoreResult<Option<Task>>;
    async fn list(&self) -> StoreResult<Vec<Task>>;
    /// Applies `changes` atomically; `None` when the task no longer exists.
    async fn update(&self, id: TaskId, changes: TaskChanges) -> StoreResult<Option<Task>>;
    async fn delete(&self, id: TaskId) -> StoreResult<bool>;
}

#[async_trait]
pub trait UserRepository: Send + Sync + 'static {
    async fn init(&self) -> StoreResult<()>;
    /// Inserts the user, its group memberships and its token in one transaction.
    async fn create(&self, input: NewUser, password: PasswordHash, token: String) -> StoreResult<User>;
    async fn get(&self, id: UserId) -> StoreResult<Option<User>>;
    async fn list(&self) -> StoreResult<Vec<User>>;
    async fn email_exists(&self, email: &str) -> StoreResult<bool>;
    /// Applies `changes` and replaces the group set in one transaction.
    async fn update(&self, id: UserId, changes: UserChanges, password: Option<PasswordHash>) -> StoreResult<Option<User>>;
    async fn delete(&self, id: UserId) -> StoreResult<bool>;
    async fn find_by_token(&self, key: &str) -> StoreResult<Option<User>>;
    async fn token_for(&self, id: UserId) -> StoreResult<Option<String>>;
    /// Returns the group with `name`, creating it when absent.
    async fn ensure_group(&self, name: &str) -> StoreResult<Group>;
}
