//! Append-only per-model transcript and the pure merge operation.
//!
//! The collection is ordered by first arrival of each model, never
//! alphabetically, and holds at most one record per model. `merge` is pure:
//! it returns a fresh collection and leaves its input untouched, so the
//! presentation layer can diff old against new snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One model's running response within a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub model: String,
    pub content: String,
    pub updated_at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(model: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            content: content.into(),
            updated_at: Utc::now(),
        }
    }
}

/// Merge a content delta into the collection.
///
/// An existing record for `model` gets `delta` appended to its content (and
/// its timestamp refreshed); an unseen model gets a fresh record appended at
/// the end of the collection. Content only ever grows. An empty delta leaves
/// an existing record deep-equal to its previous state.
pub fn merge(messages: &[ChatMessage], model: &str, delta: &str) -> Vec<ChatMessage> {
    let mut next = messages.to_vec();
    match next.iter_mut().find(|m| m.model == model) {
        Some(existing) => {
            if !delta.is_empty() {
                existing.content.push_str(delta);
                existing.updated_at = Utc::now();
            }
        }
        None => next.push(ChatMessage::new(model, delta)),
    }
    next
}
