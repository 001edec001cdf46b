//! Tag compatibility between nodes and jobs.
//!
//! A job is eligible for a node when the job requires nothing, or when the
//! node provides every capability the job requires. The Postgres store
//! evaluates the same predicate inside the poll query with the `&&` and `<@`
//! array operators; this pure form is what the in-memory store and the unit
//! tests use.

/// `true` when a job with `job_tags` may run on a node providing `node_tags`.
///
/// `None` and the empty set both mean "untagged": such jobs run anywhere,
/// including on nodes with no tags at all.
pub fn job_eligible(node_tags: &[String], job_tags: Option<&[String]>) -> bool {
    let required = match job_tags {
        None => return true,
        Some([]) => return true,
        Some(required) => required,
    };

    let overlaps = required.iter().any(|t| node_tags.contains(t));
    let subset = required.iter().all(|t| node_tags.contains(t));

    overlaps && subset
}
