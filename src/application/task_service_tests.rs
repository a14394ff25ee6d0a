#[cfg(test)]
mod tests {
    use super::super::task_service::{TaskError, TaskService, TaskServiceImpl};
    use crate::domain::{
        repository::{StoreResult, TaskRepository},
        task::{NewTask, Task, TaskChanges, TaskId, TaskStatus},
        validation::Payload,
    };
    use async_trait::async_trait;
    use chrono::Utc;
    use serde_json::json;

    #[derive(Clone, Default)]
    struct InMemoryRepo {
        items: std::sync::Arc<std::sync::Mutex<std::collections::HashMap<TaskId, Task>>>,
    }

    #[async_trait]
    impl TaskRepository for InMemoryRepo {
        async fn init(&self) -> StoreResult<()> { Ok(()) }
        async fn create(&self, input: NewTask) -> StoreResult<Task> {
            let now = Utc::now();
            let task = Task { id: TaskId::default(), title: input.title, description: input.description, status: input.status, created_at: now, updated_at: now };
            self.items.lock().unwrap().insert(task.id, task.clone());
            Ok(task)
        }
        async fn get(&self, id: TaskId) -> StoreResult<Option<Task>> { Ok(self.items.lock().unwrap().get(&id).cloned()) }
        async fn list(&self) -> StoreResult<Vec<Task>> { Ok(self.items.lock().unwrap().values().cloned().collect()) }
        async fn update(&self, id: TaskId, changes: TaskChanges) -> StoreResult<Option<Task>> {
            let mut map = self.items.lock().unwrap();
            let Some(mut task) = map.get(&id).cloned() else { return Ok(None) };
            changes.apply(&mut task);
            task.updated_at = Utc::now();
            map.insert(id, task.clone());
            Ok(Some(task))
        }
        async fn delete(&self, id: TaskId) -> StoreResult<bool> { Ok(self.items.lock().unwrap().remove(&id).is_some()) }
    }

    fn payload(value: serde_json::Value) -> Payload {
        match value { serde_json::Value::Object(map) => map, _ => unreachable!() }
    }

    #[tokio::test]
    async fn unit_create_and_get() {
        let service = TaskServiceImpl::new(InMemoryRepo::default());
        let created = service.create(&payload(json!({ "title": "X", "description": "Y" }))).await.unwrap();
        assert_eq!(created.title, "X");
        assert_eq!(created.status, TaskStatus::Pending);
        let got = service.get(created.id).await.unwrap();
        assert_eq!(got.id, created.id);
    }

    #[tokio::test]
    async fn unit_invalid_create_stores_nothing() {
        let repo = InMemoryRepo::default();
        let service = TaskServiceImpl::new(repo.clone());
        let err = service.create(&payload(json!({ "description": "Y" }))).await.unwrap_err();
        assert!(matches!(err, TaskError::Validation(ref errors) if errors.get("title").is_some()));
        assert!(repo.items.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unit_update_missing_task_skips_validation() {
        let service = TaskServiceImpl::new(InMemoryRepo::default());
        // An invalid payload still reports not-found first.
        let err = service.update(TaskId::default(), &payload(json!({ "status": "NOPE" }))).await.unwrap_err();
        assert!(matches!(err, TaskError::NotFound));
    }

    #[tokio::test]
    async fn unit_partial_update_keeps_other_fields() {
        let service = TaskServiceImpl::new(InMemoryRepo::default());
        let created = service.create(&payload(json!({ "title": "X", "description": "Y" }))).await.unwrap();
        let updated = service.partial_update(created.id, &payload(json!({ "status": "DONE" }))).await.unwrap();
        assert_eq!(updated.status, TaskStatus::Done);
        assert_eq!(updated.title, "X");
        assert!(updated.updated_at >= created.updated_at);

        let err = service.update(created.id, &payload(json!({ "status": "DONE" }))).await.unwrap_err();
        assert!(matches!(err, TaskError::Validation(_)));
    }

    #[tokio::test]
    async fn unit_delete_twice() {
        let service = TaskServiceImpl::new(InMemoryRepo::default());
        let created = service.create(&payload(json!({ "title": "X", "description": "Y" }))).await.unwrap();
        service.delete(created.id).await.unwrap();
        assert!(matches!(service.delete(created.id).await, Err(TaskError::NotFound)));
        assert!(service.list().await.unwrap().is_empty());
    }
}
