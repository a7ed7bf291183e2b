//! Redirection resolution.
//!
//! A stored answer of the form `%{dialogue <question>}` means "answer with
//! whatever `<question>` would get". Searching therefore has two phases:
//!
//! ```text
//! test ── compile ── store.get ──▶ root set
//!                                  │
//!              ┌───────────────────┘
//!              v
//!   queue (breadth-first, one entry per dialogue)
//!     - answer is a reference?           no  -> next
//!     - strip referenced question -> key
//!     - key in QuestionMap?              yes -> skip (cycle / duplicate)
//!     - fetch key, record it, attach as `redirections`, enqueue children
//! ```
//!
//! Termination: every fetch adds a distinct key to the [`QuestionMap`] and the
//! corpus is finite, so each distinct question is fetched at most once per call.

use super::compiler::TestCompiler;
use super::dedup::QuestionMap;
use super::metrics::{Resolution, ResolveMetrics};
use super::strip::QuestionStripper;
use crate::error::QaResult;
use crate::store::DialogueStore;
use crate::{Dialogue, DialogueTest};
use std::collections::{BTreeMap, VecDeque};
use std::time::Instant;

pub const DIRECTIVE_PREFIX: &str = "%{dialogue ";
pub const DIRECTIVE_SUFFIX: &str = "}";

/// Referenced question of an answer, if the answer is a reference directive.
///
/// Anything without both the prefix and the suffix, or with nothing between
/// them, is ordinary text.
pub fn extract_reference(answer: &str) -> Option<&str> {
    let inner = answer.strip_prefix(DIRECTIVE_PREFIX)?.strip_suffix(DIRECTIVE_SUFFIX)?.trim();
    if inner.is_empty() { None } else { Some(inner) }
}

/// Expands root matches into redirection trees.
pub struct RedirectionResolver<'a> {
    compiler: &'a TestCompiler,
    stripper: &'a QuestionStripper,
    store: &'a dyn DialogueStore,
}

impl<'a> RedirectionResolver<'a> {
    pub fn new(compiler: &'a TestCompiler, stripper: &'a QuestionStripper, store: &'a dyn DialogueStore) -> Self {
        RedirectionResolver { compiler, stripper, store }
    }

    /// Fetch the root set for `test` and attach every reachable redirection.
    ///
    /// Validation errors from compiling `test` and storage errors propagate
    /// unchanged. A reference that cannot be compiled into a query is treated
    /// as plain text. Redirect lookups inherit only the flag requirements of
    /// `test`; its answer, `regexp` mode and search scope are not carried over.
    pub async fn resolve(&self, test: &DialogueTest) -> QaResult<Resolution> {
        let started = Instant::now();
        let query = self.compiler.compile(test)?;
        let roots = self.store.get(&query).await?;

        // Keyed like the references it is checked against.
        let root_key = test.question.as_deref().map(|q| self.stripper.strip(q).parsed);
        let memo = QuestionMap::seeded(root_key.as_deref(), &roots);
        let metrics = ResolveMetrics { queries: 1, ..Default::default() };
        self.expand_with(roots, memo, &test.flags, metrics, started).await
    }

    /// Attach redirections to dialogues that were fetched some other way,
    /// e.g. by id.
    pub async fn expand(&self, roots: Vec<Dialogue>) -> QaResult<Resolution> {
        self.expand_with(roots, QuestionMap::default(), &BTreeMap::new(), ResolveMetrics::default(), Instant::now())
            .await
    }

    async fn expand_with(
        &self,
        mut roots: Vec<Dialogue>,
        mut memo: QuestionMap,
        flags: &BTreeMap<String, bool>,
        mut metrics: ResolveMetrics,
        started: Instant,
    ) -> QaResult<Resolution> {
        let mut queue: VecDeque<Vec<usize>> = (0..roots.len()).map(|i| vec![i]).collect();

        while let Some(path) = queue.pop_front() {
            let Some(dialogue) = node_at(&mut roots, &path) else { continue };
            let Some(reference) = extract_reference(&dialogue.answer) else { continue };
            let stripped = self.stripper.strip(reference);
            if memo.contains(&stripped.parsed) {
                tracing::debug!(question = %stripped.parsed, "redirection already resolved, skipping");
                metrics.skipped.push(stripped.parsed);
                continue;
            }

            let redirect = DialogueTest {
                question: Some(stripped.parsed.clone()),
                original: Some(stripped.original.clone()),
                answer: None,
                regexp: None,
                flags: flags.clone(),
                search_question_answer: false,
            };
            let query = match self.compiler.compile(&redirect) {
                Ok(query) => query,
                Err(err) => {
                    tracing::debug!(question = %stripped.parsed, %err, "redirection target not compilable");
                    metrics.unresolved.push(stripped.parsed);
                    continue;
                }
            };

            let found = self.store.get(&query).await?;
            metrics.queries += 1;
            metrics.depth = metrics.depth.max(path.len());
            tracing::debug!(question = %stripped.parsed, found = found.len(), depth = path.len(), "followed redirection");

            memo.insert(stripped.parsed.clone(), &found);
            metrics.fetched.push(stripped.parsed);

            let children = found.len();
            if let Some(dialogue) = node_at(&mut roots, &path) {
                if dialogue.redirections.is_none() {
                    dialogue.redirections = Some(found);
                    queue.extend((0..children).map(|i| child_path(&path, i)));
                }
            }
        }

        metrics.total = started.elapsed();
        Ok(Resolution { dialogues: roots, metrics })
    }
}

fn node_at<'d>(roots: &'d mut [Dialogue], path: &[usize]) -> Option<&'d mut Dialogue> {
    let (last, parents) = path.split_last()?;
    let mut level = roots;
    for &index in parents {
        let current = level;
        level = current.get_mut(index)?.redirections.as_deref_mut()?;
    }
    level.get_mut(*last)
}

fn child_path(parent: &[usize], index: usize) -> Vec<usize> {
    let mut path = Vec::with_capacity(parent.len() + 1);
    path.extend_from_slice(parent);
    path.push(index);
    path
}
