//! Search engine: test compilation and redirection resolution.
//!
//! ## How the parts work together
//!
//! ```text
//! QaOptions ── TestCompiler::prepare ──▶ DialogueTest      (compiler.rs)
//!                                           │
//!                       TestCompiler::compile (contributors, in order)
//!                                           v
//!                                         Query            (query.rs)
//!                                           │
//!                         RedirectionResolver::resolve     (resolve.rs)
//!                           - root fetch
//!                           - follow `%{dialogue ...}` answers
//!                           - QuestionStripper keys        (strip.rs)
//!                           - QuestionMap memo             (dedup.rs)
//!                                           v
//!                        Resolution { dialogues, metrics } (metrics.rs)
//! ```
//!
//! ## Responsibilities by module
//!
//! - `query.rs`: the clause language and its reference evaluation.
//! - `compiler.rs`: the ordered contributor list and the built-in base clauses.
//! - `strip.rs`: question normalisation shared by authoring and redirection.
//! - `dedup.rs`: per-call memo that keeps expansion finite.
//! - `resolve.rs`: breadth-first expansion of answer references.
//! - `metrics.rs`: fetch/skip bookkeeping for reports and tests.
//!
//! ## Adding a criterion
//!
//! Register a [`Contributor`](crate::Contributor) on the [`TestCompiler`]. It
//! runs after everything registered before it and only sees the test and the
//! query under construction.

#[path = "engine/compiler.rs"]
mod compiler;
#[path = "engine/dedup.rs"]
mod dedup;
#[path = "engine/metrics.rs"]
mod metrics;
#[path = "engine/query.rs"]
mod query;
#[path = "engine/resolve.rs"]
mod resolve;
#[path = "engine/strip.rs"]
mod strip;


pub use compiler::TestCompiler;
pub use dedup::QuestionMap;
pub use metrics::{Resolution, ResolveMetrics};
pub use query::{Clause, Field, Query};
pub use resolve::{DIRECTIVE_PREFIX, DIRECTIVE_SUFFIX, RedirectionResolver, extract_reference};
pub use strip::{QuestionStripper, StrippedQuestion};
