//! [`TransactionHandler`]: the participant interface the 2PC manager drives
//! (§4.6), and [`PipelineTransactionHandler`], the adapter from an
//! [`ActionPipeline`](capstan_pipeline::ActionPipeline) to one (§4.7).
//!
//! Grounded on `pysyphe/transactions.py::TransactionHandler`, whose six
//! methods are all no-ops on the base class, and
//! `pysyphe/transactions.py::PipelineTransactionHandler`, which aliases
//! `execute`/`rollback` straight to the pipeline's `do`/`undo` "to reduce
//! stack trace deepness" — the Rust port keeps that delegation but cannot
//! reassign methods at construction time, so it just forwards in the trait
//! impl instead.

use capstan_core::ActionLike;
use capstan_pipeline::ActionPipeline;

use crate::error::HandlerError;

/// A participant in the two-phase-commit protocol a [`TransactionsManager`]
/// coordinates.
///
/// Every method is a no-op by default: a handler only overrides the phases
/// it actually participates in. `begin` is expected to acquire whatever
/// locks or resources the transaction needs; `execute` performs the actual
/// work; `rollback` undoes it and **must tolerate being called even if
/// `begin`/`execute` were never called** (the manager's own `rollback` path
/// invokes every registered handler unconditionally — see §4.6, §4.8).
///
/// [`TransactionsManager`]: crate::TransactionsManager
pub trait TransactionHandler {
    /// Acquire resources/locks for this transaction.
    ///
    /// # Errors
    ///
    /// Returns whatever failure acquiring this handler's resources produced.
    fn begin(&self) -> Result<(), HandlerError> {
        Ok(())
    }

    /// Perform this handler's work. A failure here aborts the whole
    /// transaction (the manager rolls every handler back).
    ///
    /// # Errors
    ///
    /// Returns whatever failure this handler's work produced.
    fn execute(&self) -> Result<(), HandlerError> {
        Ok(())
    }

    /// Undo everything done in `execute` and release any resources acquired
    /// in `begin`. Must be safe to call even if neither ran.
    ///
    /// # Errors
    ///
    /// Returns whatever failure undoing this handler's work produced.
    fn rollback(&self) -> Result<(), HandlerError> {
        Ok(())
    }

    /// Declare whether this handler supports the prepare phase of 2PC.
    /// Handlers that return `false` are committed first, before any
    /// preparable handler's (supposedly infallible) commit begins (§4.8).
    fn can_prepare_commit(&self) -> bool {
        false
    }

    /// First phase of 2PC: report whether this handler is ready to commit.
    /// Only called on handlers whose `can_prepare_commit` returned `true`.
    ///
    /// # Errors
    ///
    /// Returns whatever failure checking readiness produced.
    fn prepare_commit(&self) -> Result<bool, HandlerError> {
        Ok(true)
    }

    /// Second phase of 2PC: make this handler's work durable. By the time
    /// this runs on a preparable handler, `prepare_commit` already reported
    /// readiness — per §4.8's rationale, this phase is expected not to fail
    /// for those handlers, though the trait cannot enforce that.
    ///
    /// # Errors
    ///
    /// Returns whatever failure committing this handler's work produced.
    fn commit(&self) -> Result<(), HandlerError> {
        Ok(())
    }
}

/// Adapts an [`ActionPipeline`] to the [`TransactionHandler`] interface.
///
/// A pipeline commits nothing of its own — its "work" is already durable
/// the moment `execute` returns, since each step mutates its target
/// directly — so [`can_prepare_commit`](Self::can_prepare_commit) and
/// [`prepare_commit`](Self::prepare_commit) are unconditionally `true`: the
/// commit phase is vacuous and cannot fail (§4.7).
pub struct PipelineTransactionHandler {
    pipeline: ActionPipeline,
}

impl PipelineTransactionHandler {
    /// Wrap `pipeline` for use as a 2PC participant.
    #[must_use]
    pub fn new(pipeline: ActionPipeline) -> Self {
        Self { pipeline }
    }

    /// The wrapped pipeline's display name (read-only; set via
    /// `ActionPipeline::named` before wrapping).
    #[must_use]
    pub fn pipeline_name(&self) -> String {
        self.pipeline.name(capstan_core::Side::Action)
    }
}

impl TransactionHandler for PipelineTransactionHandler {
    fn execute(&self) -> Result<(), HandlerError> {
        self.pipeline.execute().map_err(|e| Box::new(e) as HandlerError)
    }

    fn rollback(&self) -> Result<(), HandlerError> {
        self.pipeline.undo().map_err(|e| Box::new(e) as HandlerError)
    }

    fn can_prepare_commit(&self) -> bool {
        true
    }

    fn prepare_commit(&self) -> Result<bool, HandlerError> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use capstan_action::Action;
    use std::rc::Rc;

    #[test]
    fn base_handler_methods_are_all_harmless_defaults() {
        struct Base;
        impl TransactionHandler for Base {}
        let h = Base;
        h.begin().unwrap();
        h.execute().unwrap();
        h.rollback().unwrap();
        assert!(!h.can_prepare_commit());
        assert!(h.prepare_commit().unwrap());
        h.commit().unwrap();
    }

    #[test]
    fn pipeline_handler_delegates_execute_and_rollback() {
        let pipeline = ActionPipeline::new(false).named("my-pipeline");
        pipeline.append(Rc::new(
            Action::new()
                .with_forward("f", || Ok(()))
                .with_reverse("r", || Ok(())),
        ));
        let handler = PipelineTransactionHandler::new(pipeline);
        assert_eq!(handler.pipeline_name(), "my-pipeline");
        handler.execute().unwrap();
        handler.rollback().unwrap();
    }

    #[test]
    fn pipeline_handler_commit_phase_is_always_ready() {
        let handler = PipelineTransactionHandler::new(ActionPipeline::new(false));
        assert!(handler.can_prepare_commit());
        assert!(handler.prepare_commit().unwrap());
        handler.commit().unwrap();
    }
}
