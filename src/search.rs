// Federated search over the task, note and todo collections

use crate::kv::KeyValueStore;
use crate::models::{NoteRecord, TaskRecord, TodoRecord};
use crate::record::CollectionRecord;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use tracing::{info, warn};

/// Which collection a hit came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResultKind {
    Task,
    Note,
    #[serde(rename = "To-Do")]
    Todo,
}

impl fmt::Display for ResultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResultKind::Task => write!(f, "Task"),
            ResultKind::Note => write!(f, "Note"),
            ResultKind::Todo => write!(f, "To-Do"),
        }
    }
}

/// One search hit, in the same shape whatever collection it came from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    #[serde(rename = "type")]
    pub kind: ResultKind,
    pub title: String,
    pub subtitle: String,
    pub link: String,
    pub id: String,
}

/// Stateless search that reads the collections fresh on every query.
///
/// Results come tasks first, then notes, then todos, each in storage order.
/// There is no ranking.
#[derive(Clone)]
pub struct SearchIndex {
    store: KeyValueStore,
}

impl SearchIndex {
    pub fn new(store: KeyValueStore) -> Self {
        Self { store }
    }

    pub fn execute(&self, query: &str) -> Vec<SearchResult> {
        if query.is_empty() {
            return Vec::new();
        }

        let term = query.to_lowercase();
        info!(query, "Searching");

        let mut results = Vec::new();
        self.search_collection::<TaskRecord>(&term, &mut results);
        self.search_collection::<NoteRecord>(&term, &mut results);
        self.search_collection::<TodoRecord>(&term, &mut results);

        info!(query, count = results.len(), "Search complete");
        results
    }

    fn search_collection<T: CollectionRecord>(&self, term: &str, results: &mut Vec<SearchResult>) {
        let collection = T::storage_key();
        let records: Vec<Value> = self.store.get(collection, Vec::new());

        for (index, raw) in records.into_iter().enumerate() {
            let record: T = match serde_json::from_value(raw) {
                Ok(r) => r,
                Err(e) => {
                    warn!(collection, index, error = %e, "Skipping record that doesn't match type");
                    continue;
                }
            };

            if record.matches(term) {
                results.push(record.to_result());
            }
        }
    }
}
