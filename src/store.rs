//! Storage collaborator.
//!
//! The pipeline only ever talks to a [`DialogueStore`]; physical storage is the
//! implementor's business. [`MemoryStore`] is the reference implementation: it
//! evaluates [`Query`] with its own reference semantics and backs the CLI and
//! the tests.

use crate::engine::Query;
use crate::error::StorageError;
use crate::{Dialogue, DialogueId};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// Corpus size as reported by `qa.status`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DialogueStats {
    /// Distinct question texts.
    pub questions: usize,
    /// Stored dialogues.
    pub dialogues: usize,
}

#[async_trait]
pub trait DialogueStore: Send + Sync {
    /// All dialogues matching `query`, ordered by id.
    async fn get(&self, query: &Query) -> Result<Vec<Dialogue>, StorageError>;

    /// Dialogues with the given ids, ordered by id. Unknown ids are left out.
    async fn get_by_ids(&self, ids: &[DialogueId]) -> Result<Vec<Dialogue>, StorageError>;

    /// Store a new dialogue and return it with its assigned id.
    async fn create(&self, dialogue: Dialogue) -> Result<Dialogue, StorageError>;

    /// Overwrite existing dialogues, matched by id.
    async fn update(&self, dialogues: &[Dialogue]) -> Result<(), StorageError>;

    async fn stats(&self) -> Result<DialogueStats, StorageError>;
}

#[derive(Debug, Deserialize)]
struct Corpus {
    #[serde(default, rename = "dialogue")]
    dialogues: Vec<Dialogue>,
}

#[derive(Debug, Default)]
struct Inner {
    dialogues: BTreeMap<DialogueId, Dialogue>,
    next_id: DialogueId,
}

/// In-memory store guarded by a read/write lock.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store pre-filled with `dialogues`. Records with id 0 get fresh ids and
    /// records without an `original` display the question.
    pub fn with_dialogues(dialogues: impl IntoIterator<Item = Dialogue>) -> Self {
        let store = MemoryStore::new();
        {
            let mut inner = store.inner.write();
            for dialogue in dialogues {
                inner.insert(dialogue);
            }
        }
        store
    }

    /// Parse a TOML corpus made of `[[dialogue]]` tables.
    pub fn from_toml_str(source: &str) -> Result<Self, StorageError> {
        let corpus: Corpus = toml::from_str(source)
            .map_err(|err| StorageError::Load { path: "<inline>".into(), reason: err.to_string() })?;
        Self::from_corpus(corpus, Path::new("<inline>"))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|err| StorageError::Load { path: path.to_path_buf(), reason: err.to_string() })?;
        let corpus: Corpus = toml::from_str(&source)
            .map_err(|err| StorageError::Load { path: path.to_path_buf(), reason: err.to_string() })?;
        tracing::info!(path = %path.display(), dialogues = corpus.dialogues.len(), "loaded dialogue corpus");
        Self::from_corpus(corpus, path)
    }

    /// Explicit ids must be unique within a corpus file.
    fn from_corpus(corpus: Corpus, path: &Path) -> Result<Self, StorageError> {
        let mut seen = BTreeSet::new();
        for dialogue in corpus.dialogues.iter().filter(|d| d.id != 0) {
            if !seen.insert(dialogue.id) {
                return Err(StorageError::Load {
                    path: path.to_path_buf(),
                    reason: format!("dialogue id {} appears more than once", dialogue.id),
                });
            }
        }
        Ok(Self::with_dialogues(corpus.dialogues))
    }

    pub fn len(&self) -> usize {
        self.inner.read().dialogues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().dialogues.is_empty()
    }
}

impl Inner {
    fn insert(&mut self, mut dialogue: Dialogue) -> Dialogue {
        if dialogue.id == 0 {
            dialogue.id = self.next_id.max(1);
        }
        if dialogue.original.is_empty() {
            dialogue.original = dialogue.question.clone();
        }
        dialogue.redirections = None;
        if self.dialogues.contains_key(&dialogue.id) {
            tracing::warn!(id = dialogue.id, "replacing dialogue with a duplicate id");
        }
        self.next_id = self.next_id.max(dialogue.id + 1);
        self.dialogues.insert(dialogue.id, dialogue.clone());
        dialogue
    }
}

#[async_trait]
impl DialogueStore for MemoryStore {
    async fn get(&self, query: &Query) -> Result<Vec<Dialogue>, StorageError> {
        let inner = self.inner.read();
        Ok(inner.dialogues.values().filter(|d| query.matches(d)).cloned().collect())
    }

    async fn get_by_ids(&self, ids: &[DialogueId]) -> Result<Vec<Dialogue>, StorageError> {
        let wanted: BTreeSet<DialogueId> = ids.iter().copied().collect();
        let inner = self.inner.read();
        Ok(wanted.iter().filter_map(|id| inner.dialogues.get(id).cloned()).collect())
    }

    async fn create(&self, mut dialogue: Dialogue) -> Result<Dialogue, StorageError> {
        dialogue.id = 0;
        Ok(self.inner.write().insert(dialogue))
    }

    async fn update(&self, dialogues: &[Dialogue]) -> Result<(), StorageError> {
        let mut inner = self.inner.write();
        if let Some(missing) = dialogues.iter().find(|d| !inner.dialogues.contains_key(&d.id)) {
            return Err(StorageError::Backend { message: format!("dialogue {} does not exist", missing.id) });
        }
        for dialogue in dialogues {
            let mut stored = dialogue.clone();
            stored.redirections = None;
            inner.dialogues.insert(stored.id, stored);
        }
        Ok(())
    }

    async fn stats(&self) -> Result<DialogueStats, StorageError> {
        let inner = self.inner.read();
        let questions: BTreeSet<&str> = inner.dialogues.values().map(|d| d.question.as_str()).collect();
        Ok(DialogueStats { questions: questions.len(), dialogues: inner.dialogues.len() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Clause, Field};

    const CORPUS: &str = r#"
[[dialogue]]
id = 1
question = "你好"
answer = "你好呀"

[[dialogue]]
id = 5
question = "hi"
original = "Hi!"
answer = "%{dialogue 你好}"
flag = 1

[[dialogue]]
question = "你好"
answer = "hello"
"#;

    #[tokio::test]
    async fn loads_corpus_and_assigns_ids() {
        let store = MemoryStore::from_toml_str(CORPUS).unwrap();
        assert_eq!(store.len(), 3);

        let all = store.get(&Query::default()).await.unwrap();
        let ids: Vec<u64> = all.iter().map(|d| d.id).collect();
        assert_eq!(ids, vec![1, 5, 6]);
        assert_eq!(all[0].original, "你好");
        assert_eq!(all[1].original, "Hi!");
        assert_eq!(all[1].flag, 1);
    }

    #[tokio::test]
    async fn stats_count_distinct_questions() {
        let store = MemoryStore::from_toml_str(CORPUS).unwrap();
        let stats = store.stats().await.unwrap();
        assert_eq!(stats, DialogueStats { questions: 2, dialogues: 3 });

        let empty = MemoryStore::new().stats().await.unwrap();
        assert_eq!(empty, DialogueStats { questions: 0, dialogues: 0 });
    }

    #[tokio::test]
    async fn create_update_and_lookup() {
        let store = MemoryStore::new();
        let created = store.create(Dialogue::new("q", "a")).await.unwrap();
        assert_eq!(created.id, 1);
        let second = store.create(Dialogue::new("q2", "a2")).await.unwrap();
        assert_eq!(second.id, 2);

        let mut changed = created.clone();
        changed.answer = "b".into();
        store.update(&[changed]).await.unwrap();

        let mut query = Query::default();
        query.push(Clause::equals(Field::Answer, "b"));
        assert_eq!(store.get(&query).await.unwrap().len(), 1);

        let found = store.get_by_ids(&[2, 1, 9, 2]).await.unwrap();
        assert_eq!(found.iter().map(|d| d.id).collect::<Vec<_>>(), vec![1, 2]);

        let mut ghost = Dialogue::new("x", "y");
        ghost.id = 42;
        assert!(matches!(store.update(&[ghost]).await, Err(StorageError::Backend { .. })));
    }

    #[test]
    fn repeated_corpus_id_is_a_load_error() {
        let corpus = r#"
[[dialogue]]
id = 3
question = "a"
answer = "1"

[[dialogue]]
id = 3
question = "b"
answer = "2"
"#;
        let err = MemoryStore::from_toml_str(corpus).unwrap_err();
        assert!(matches!(err, StorageError::Load { ref reason, .. } if reason.contains("id 3")));
    }

    #[test]
    fn malformed_corpus_is_a_load_error() {
        let err = MemoryStore::from_toml_str("[[dialogue]]\nid = \"x\"").unwrap_err();
        assert!(matches!(err, StorageError::Load { .. }));
    }
}
