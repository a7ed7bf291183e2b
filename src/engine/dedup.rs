//! Question memo for redirection expansion.
//!
//! Expansion follows answers that point at other questions. Without a memo,
//! `A -> B -> A` would loop forever and two answers pointing at the same
//! question would fetch it twice. [`QuestionMap`] records every normalised
//! question already resolved during one resolve call; a reference whose key is
//! present is skipped.
//!
//! ## What counts as "the same question"
//!
//! The key is the `parsed` form from the question stripper, so the
//! punctuation and case variants of a question collapse to one entry.
//!
//! ## Lifetime
//!
//! One map per resolve call, owned by that call and dropped with it. Nothing
//! is shared between concurrent searches.

use crate::{Dialogue, DialogueId};
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct QuestionMap {
    resolved: HashMap<String, Vec<DialogueId>>,
}

impl QuestionMap {
    /// A map seeded with the root question, so the root is never re-expanded.
    pub fn seeded(question: Option<&str>, roots: &[Dialogue]) -> Self {
        let mut map = QuestionMap::default();
        if let Some(question) = question {
            map.insert(question.to_string(), roots);
        }
        map
    }

    pub fn contains(&self, key: &str) -> bool {
        self.resolved.contains_key(key)
    }

    /// Record `key` as resolved to `dialogues`. Returns false if it already was.
    pub fn insert(&mut self, key: String, dialogues: &[Dialogue]) -> bool {
        if self.resolved.contains_key(&key) {
            return false;
        }
        self.resolved.insert(key, dialogues.iter().map(|d| d.id).collect());
        true
    }

    pub fn get(&self, key: &str) -> Option<&[DialogueId]> {
        self.resolved.get(key).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.resolved.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolved.is_empty()
    }
}
