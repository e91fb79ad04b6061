// Record shapes of the three searchable workspace collections
//
// Only the fields search reads are modelled; everything else a page stores
// alongside them is ignored on read.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Task from the task board (`myTasksV5`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub remark: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

/// Note from the notebook (`myNotes`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteRecord {
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tags: Option<Tags>,
}

/// Quick to-do item (`myQuickTodos`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TodoRecord {
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub status: Option<String>,
}

/// Note tags are stored either as one comma-separated string or as a list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Tags {
    One(String),
    Many(Vec<String>),
}

impl Tags {
    /// Display form; `None` when there are no tags to show
    pub fn label(&self) -> Option<String> {
        let label = match self {
            Tags::One(s) => s.clone(),
            Tags::Many(list) => list.join(", "),
        };
        (!label.is_empty()).then_some(label)
    }
}

/// Pages generate ids both as strings and as bare numbers
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Null => Ok(String::new()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {}",
            other
        ))),
    }
}

/// Helper function to get current timestamp in milliseconds
pub fn now_ms() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_now_ms() {
        let ts = now_ms();
        // Should be reasonable timestamp (after year 2020)
        assert!(ts > 1_600_000_000_000);
    }

    #[test]
    fn test_task_ignores_unknown_fields_and_missing_options() {
        let task: TaskRecord = serde_json::from_value(json!({
            "id": "task_17000000001234",
            "title": "Deploy",
            "priority": "high",
            "due": "2026-02-09"
        }))
        .unwrap();

        assert_eq!(task.id, "task_17000000001234");
        assert_eq!(task.title, "Deploy");
        assert!(task.remark.is_none());
        assert!(task.status.is_none());
    }

    #[test]
    fn test_numeric_and_missing_ids() {
        let todo: TodoRecord = serde_json::from_value(json!({"id": 1707000000123_i64, "title": "Call"})).unwrap();
        assert_eq!(todo.id, "1707000000123");

        let todo: TodoRecord = serde_json::from_value(json!({"title": "No id"})).unwrap();
        assert_eq!(todo.id, "");

        assert!(serde_json::from_value::<TodoRecord>(json!({"id": [1], "title": "x"})).is_err());
    }

    #[test]
    fn test_title_is_required() {
        assert!(serde_json::from_value::<NoteRecord>(json!({"id": "n1", "content": "body"})).is_err());
    }

    #[test]
    fn test_tags_label() {
        let note: NoteRecord = serde_json::from_value(json!({"id": "n1", "title": "t", "tags": "infra"})).unwrap();
        assert_eq!(note.tags.and_then(|t| t.label()).as_deref(), Some("infra"));

        let note: NoteRecord =
            serde_json::from_value(json!({"id": "n1", "title": "t", "tags": ["infra", "ops"]})).unwrap();
        assert_eq!(note.tags.and_then(|t| t.label()).as_deref(), Some("infra, ops"));

        assert_eq!(Tags::One(String::new()).label(), None);
        assert_eq!(Tags::Many(vec![]).label(), None);
    }
}
