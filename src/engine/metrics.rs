//! Resolver run metrics.
//!
//! Collected on every resolve call. The CLI's `--tree` report prints them, and
//! tests use them to check that no question is fetched twice.

use std::time::Duration;

#[derive(Debug, Default, Clone)]
pub struct ResolveMetrics {
    /// Total elapsed time for the resolve call.
    pub total: Duration,
    /// Normalised questions fetched, in fetch order. The root fetch is not listed.
    pub fetched: Vec<String>,
    /// References skipped because their question was already resolved.
    pub skipped: Vec<String>,
    /// References whose question could not be compiled into a query.
    pub unresolved: Vec<String>,
    /// Number of storage queries issued, root fetch included.
    pub queries: usize,
    /// Deepest expansion level reached (0 = root set only).
    pub depth: usize,
}

/// Root dialogues with their redirections attached, plus metrics.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub dialogues: Vec<crate::Dialogue>,
    pub metrics: ResolveMetrics,
}
