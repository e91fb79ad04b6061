// Searchable collection trait and its implementations for tasks, notes and todos

use crate::models::{NoteRecord, TaskRecord, TodoRecord};
use crate::search::{ResultKind, SearchResult};
use serde::de::DeserializeOwned;

/// Subtitle used for notes without tags
pub const DEFAULT_NOTE_LABEL: &str = "General";

/// A record type stored as a JSON array under one well-known key
pub trait CollectionRecord: DeserializeOwned {
    /// Storage key holding the whole collection
    fn storage_key() -> &'static str
    where
        Self: Sized;

    fn kind() -> ResultKind
    where
        Self: Sized;

    /// Page that shows this collection
    fn link() -> &'static str
    where
        Self: Sized;

    fn id(&self) -> &str;

    fn title(&self) -> &str;

    /// Fields matched against a query; absent optional fields are left out
    fn searchable_fields(&self) -> Vec<&str>;

    fn subtitle(&self) -> String;

    /// Case-insensitive substring match. `term` must already be lowercase.
    fn matches(&self, term: &str) -> bool {
        self.searchable_fields()
            .iter()
            .any(|field| field.to_lowercase().contains(term))
    }

    fn to_result(&self) -> SearchResult
    where
        Self: Sized,
    {
        SearchResult {
            kind: Self::kind(),
            title: self.title().to_string(),
            subtitle: self.subtitle(),
            link: Self::link().to_string(),
            id: self.id().to_string(),
        }
    }
}

impl CollectionRecord for TaskRecord {
    fn storage_key() -> &'static str {
        "myTasksV5"
    }

    fn kind() -> ResultKind {
        ResultKind::Task
    }

    fn link() -> &'static str {
        "tasks.html"
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn title(&self) -> &str {
        &self.title
    }

    fn searchable_fields(&self) -> Vec<&str> {
        let mut fields = vec![self.title.as_str()];
        fields.extend(self.remark.as_deref());
        fields
    }

    fn subtitle(&self) -> String {
        self.status.clone().unwrap_or_default()
    }
}

impl CollectionRecord for NoteRecord {
    fn storage_key() -> &'static str {
        "myNotes"
    }

    fn kind() -> ResultKind {
        ResultKind::Note
    }

    fn link() -> &'static str {
        "notes.html"
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn title(&self) -> &str {
        &self.title
    }

    fn searchable_fields(&self) -> Vec<&str> {
        let mut fields = vec![self.title.as_str()];
        fields.extend(self.content.as_deref());
        fields
    }

    fn subtitle(&self) -> String {
        self.tags
            .as_ref()
            .and_then(|tags| tags.label())
            .unwrap_or_else(|| DEFAULT_NOTE_LABEL.to_string())
    }
}

impl CollectionRecord for TodoRecord {
    fn storage_key() -> &'static str {
        "myQuickTodos"
    }

    fn kind() -> ResultKind {
        ResultKind::Todo
    }

    fn link() -> &'static str {
        "todo.html"
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn title(&self) -> &str {
        &self.title
    }

    fn searchable_fields(&self) -> Vec<&str> {
        vec![self.title.as_str()]
    }

    fn subtitle(&self) -> String {
        self.status.clone().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Tags;

    fn task(title: &str, remark: Option<&str>) -> TaskRecord {
        TaskRecord {
            id: "t1".to_string(),
            title: title.to_string(),
            remark: remark.map(str::to_string),
            status: Some("In Progress".to_string()),
        }
    }

    #[test]
    fn test_task_matches_title_or_remark() {
        assert!(task("Deploy API", None).matches("deploy"));
        assert!(task("Deploy API", Some("waiting on DNS")).matches("dns"));
        assert!(!task("Deploy API", None).matches("dns"));
    }

    #[test]
    fn test_todo_matches_title_only() {
        let todo = TodoRecord {
            id: "q1".to_string(),
            title: "Buy coffee".to_string(),
            status: Some("pending".to_string()),
        };
        assert!(todo.matches("coffee"));
        assert!(!todo.matches("pending"));
    }

    #[test]
    fn test_projection() {
        let result = task("Deploy API", None).to_result();
        assert_eq!(result.kind, ResultKind::Task);
        assert_eq!(result.title, "Deploy API");
        assert_eq!(result.subtitle, "In Progress");
        assert_eq!(result.link, "tasks.html");
        assert_eq!(result.id, "t1");
    }

    #[test]
    fn test_note_subtitle_defaults() {
        let mut note = NoteRecord {
            id: "n1".to_string(),
            title: "Retro".to_string(),
            content: None,
            tags: None,
        };
        assert_eq!(note.subtitle(), DEFAULT_NOTE_LABEL);
        assert!(note.matches("retro"));
        assert!(!note.matches("body"));

        note.tags = Some(Tags::One("team".to_string()));
        assert_eq!(note.subtitle(), "team");
    }

    #[test]
    fn test_storage_keys() {
        assert_eq!(TaskRecord::storage_key(), "myTasksV5");
        assert_eq!(NoteRecord::storage_key(), "myNotes");
        assert_eq!(TodoRecord::storage_key(), "myQuickTodos");
    }
}
