use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::validation::{self, FieldErrors, Payload, TextRules, UpdateMode};

pub const TITLE_MAX_LENGTH: usize = 255;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct TaskId(pub Uuid);

impl Default for TaskId {
    fn default() -> Self { Self(Uuid::new_v4()) }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { self.0.fmt(f) }
}

impl FromStr for TaskId {
    type Err = uuid::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> { Uuid::parse_str(s).map(Self) }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Done,
    InProgress,
    #[default]
    Pending,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Done => "DONE",
            TaskStatus::InProgress => "IN_PROGRESS",
            TaskStatus::Pending => "PENDING",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "DONE" => Some(TaskStatus::Done),
            "IN_PROGRESS" => Some(TaskStatus::InProgress),
            "PENDING" => Some(TaskStatus::Pending),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    pub description: String,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTask {
    pub title: String,
    pub description: String,
    pub status: TaskStatus,
}

/// Validated changes to an existing task. `None` leaves the stored value alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
}

impl NewTask {
    pub fn from_payload(payload: &Payload) -> Result<Self, FieldErrors> {
        let mut errors = FieldErrors::new();
        let title = validation::text(payload, "title", TextRules::required(Some(TITLE_MAX_LENGTH)), true, &mut errors);
        let description = validation::text(payload, "description", TextRules::required(None), true, &mut errors);
        let status = status(payload, &mut errors);
        match (title, description) {
            (Some(title), Some(description)) if errors.is_empty() => {
                Ok(NewTask { title, description, status: status.unwrap_or_default() })
            }
            _ => Err(errors),
        }
    }
}

impl TaskChanges {
    pub fn from_payload(payload: &Payload, mode: UpdateMode) -> Result<Self, FieldErrors> {
        let required = !mode.is_partial();
        let mut errors = FieldErrors::new();
        let changes = TaskChanges {
            title: validation::text(payload, "title", TextRules::required(Some(TITLE_MAX_LENGTH)), required, &mut errors),
            description: validation::text(payload, "description", TextRules::required(None), required, &mut errors),
            status: status(payload, &mut errors),
        };
        errors.finish(changes)
    }

    pub fn apply(self, task: &mut Task) {
        if let Some(t) = self.title { task.title = t; }
        if let Some(d) = self.description { task.description = d; }
        if let Some(s) = self.status { task.status = s; }
    }
}

/// Choices are matched exactly; surrounding whitespace is not stripped.
fn status(payload: &Payload, errors: &mut FieldErrors) -> Option<TaskStatus> {
    let raw = match payload.get("status")? {
        Value::Null => {
            errors.add("status", validation::NOT_NULL);
            return None;
        }
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    let parsed = TaskStatus::parse(&raw);
    if parsed.is_none() { errors.add("status", format!("\"{raw}\" is not a valid choice.")); }
    parsed
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(value: serde_json::Value) -> Payload {
        match value { serde_json::Value::Object(map) => map, _ => unreachable!() }
    }

    #[test]
    fn new_task_defaults_to_pending() {
        let task = NewTask::from_payload(&payload(json!({ "title": "Write", "description": "docs" }))).unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.title, "Write");
    }

    #[test]
    fn new_task_collects_every_field_error() {
        let errors = NewTask::from_payload(&payload(json!({ "description": "", "status": "LATER" }))).unwrap_err();
        assert_eq!(errors.get("title").unwrap()[0], validation::REQUIRED);
        assert_eq!(errors.get("description").unwrap()[0], validation::NOT_BLANK);
        assert_eq!(errors.get("status").unwrap()[0], "\"LATER\" is not a valid choice.");
    }

    #[test]
    fn full_update_requires_title_and_description() {
        let errors = TaskChanges::from_payload(&payload(json!({ "status": "DONE" })), UpdateMode::Full).unwrap_err();
        assert!(errors.get("title").is_some());
        assert!(errors.get("description").is_some());
    }

    #[test]
    fn partial_update_merges_only_supplied_fields() {
        let changes = TaskChanges::from_payload(&payload(json!({ "status": "IN_PROGRESS", "id": "ignored" })), UpdateMode::Partial).unwrap();
        let now = Utc::now();
        let mut task = Task { id: TaskId::default(), title: "t".into(), description: "d".into(), status: TaskStatus::Pending, created_at: now, updated_at: now };
        changes.apply(&mut task);
        assert_eq!(task.status, TaskStatus::InProgress);
        assert_eq!(task.title, "t");
    }

    #[test]
    fn status_choice_is_not_trimmed() {
        let errors = TaskChanges::from_payload(&payload(json!({ "status": " DONE " })), UpdateMode::Partial).unwrap_err();
        assert_eq!(errors.get("status").unwrap()[0], "\" DONE \" is not a valid choice.");
        let errors = TaskChanges::from_payload(&payload(json!({ "status": null })), UpdateMode::Partial).unwrap_err();
        assert_eq!(errors.get("status").unwrap()[0], validation::NOT_NULL);
    }

    #[test]
    fn status_serializes_screaming_case() {
        assert_eq!(serde_json::to_value(TaskStatus::InProgress).unwrap(), json!("IN_PROGRESS"));
    }
}
