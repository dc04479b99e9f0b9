//! The 2PC manager's failure taxonomy (§7, §8 scenario S6).
//!
//! `Doomed` is the compound failure `pysyphe.transactions.TransactionsManager`
//! raises as `WeAreDoomedException` from inside its `begin()` context
//! manager: it fires only when a rollback was already attempted before the
//! unwind, or when the rollback itself fails, and it carries every formatted
//! trace collected along the way rather than just the last one, since by
//! that point none of them can be recovered from.

use thiserror::Error;

/// The error type a [`crate::TransactionHandler`] method may fail with.
///
/// Boxed rather than an associated type because a handler's failure
/// genuinely originates in arbitrary user/application code (a database
/// driver, an HTTP client, a nested [`capstan_pipeline::ActionPipeline`]) —
/// the manager only needs to observe, record, and re-raise it, never to
/// match on its variants.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Failures raised by [`crate::TransactionsManager`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TransactionError {
    /// `add`/`set_mutex` called after `begin` has already run.
    #[error("transaction handlers cannot be added once transactions have begun")]
    AlreadyBegun,

    /// `execute`/`rollback`/`commit` called outside an active `begin` scope.
    #[error("transactions have not begun")]
    NotBegun,

    /// A handler raised and the manager could not recover: either a
    /// rollback had already been attempted before this unwind, or the
    /// rollback attempted in response to it also failed. Carries every
    /// formatted trace collected during this `begin` scope, in the order
    /// encountered.
    #[error("{message}")]
    Doomed {
        /// Human-readable summary of which doomed path was taken.
        message: String,
        /// Formatted traces of every exception encountered this scope, in
        /// encounter order.
        traces: Vec<String>,
    },

    /// A handler's `begin`/`execute`/`rollback`/`prepare_commit`/`commit`
    /// raised and the manager successfully recovered (or the failure is
    /// simply being propagated to the caller of `rollback`/`commit`
    /// directly, outside a `begin` scope body) — §7's "generic transaction
    /// misuse" bucket, carrying the handler's own error as its source.
    #[error("transaction handler failed: {0}")]
    HandlerFailed(#[source] HandlerError),
}

impl TransactionError {
    /// Format `err` (and its `source()` chain) into one multi-line trace
    /// string, the closest synchronous analogue to Python's
    /// `traceback.format_exc()` available without capturing a real
    /// backtrace at every handler call site.
    pub(crate) fn format_trace(err: &HandlerError) -> String {
        let mut out = err.to_string();
        let mut source = err.source();
        while let Some(s) = source {
            out.push_str("\ncaused by: ");
            out.push_str(&s.to_string());
            source = s.source();
        }
        out
    }
}
