//! Task records for asynchronous operations.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Entity a task operates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum TaskTarget {
    /// Resource discovery for a source.
    Source(Uuid),
    /// Index build for a context.
    Context(Uuid),
}

impl TaskTarget {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Source(_) => "source",
            Self::Context(_) => "context",
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            Self::Source(id) | Self::Context(id) => *id,
        }
    }

    /// Rebuild a target from its stored kind and id.
    pub fn from_parts(kind: &str, id: Uuid) -> Option<Self> {
        match kind {
            "source" => Some(Self::Source(id)),
            "context" => Some(Self::Context(id)),
            _ => None,
        }
    }
}

impl fmt::Display for TaskTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind(), self.id())
    }
}

/// Record of one asynchronous operation.
///
/// `success` is tri-state: `None` while running, `Some(true)` or `Some(false)`
/// once terminal. A target has at most one running task at any time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub target: TaskTarget,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    pub start_date: DateTime<Utc>,
    pub stop_date: Option<DateTime<Utc>>,
    pub success: Option<bool>,
    pub description: String,
}

impl Task {
    /// Create a running task started now.
    pub fn start(target: TaskTarget, user: Option<String>, description: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            target,
            user,
            start_date: Utc::now(),
            stop_date: None,
            success: None,
            description: description.into(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.success.is_none()
    }

    /// Path of the read projection for this task.
    pub fn location(&self) -> String {
        task_location(&self.target, self.id)
    }
}

/// Path under which a task is exposed, e.g. `/contexts/{id}/tasks/{task_id}`.
pub fn task_location(target: &TaskTarget, task_id: Uuid) -> String {
    format!("/{}s/{}/tasks/{}", target.kind(), target.id(), task_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_started_task_is_running() {
        let target = TaskTarget::Context(Uuid::new_v4());
        let task = Task::start(target, Some("alice".to_string()), "building");
        assert!(task.is_running());
        assert!(task.stop_date.is_none());
        assert_eq!(
            task.location(),
            format!("/contexts/{}/tasks/{}", target.id(), task.id)
        );
    }

    #[test]
    fn test_target_round_trip_through_parts() {
        let id = Uuid::new_v4();
        let target = TaskTarget::Source(id);
        assert_eq!(TaskTarget::from_parts(target.kind(), id), Some(target));
        assert_eq!(TaskTarget::from_parts("resource", id), None);
    }

    #[test]
    fn test_target_serialization() {
        let id = Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap();
        let json = serde_json::to_value(TaskTarget::Context(id)).unwrap();
        assert_eq!(json["kind"], "context");
        assert_eq!(json["id"], "550e8400-e29b-41d4-a716-446655440000");
    }
}
