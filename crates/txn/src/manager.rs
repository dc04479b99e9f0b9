//! [`TransactionsManager`]: the 2PC coordinator (§4.8).
//!
//! Grounded on `pysyphe/transactions.py::TransactionsManager`. The original
//! exposes `begin` as a `@contextmanager`, used as
//! `with trm.begin(): trm.execute(); trm.commit()`. Rust has no generator
//! based context managers, so [`TransactionsManager::begin`] instead takes
//! the scope's body as a closure — the same scoped-resource shape
//! `capstan_core::Hook` already uses for action hooks (enter, body, exit on
//! every path), just coordinating handlers instead of bracketing one call.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::error::{HandlerError, TransactionError};
use crate::handler::TransactionHandler;

/// Coordinates several [`TransactionHandler`]s under a two-phase-commit
/// protocol, with an optional mutex handler bracketing all the others
/// (begun first, rolled back/committed last).
///
/// One [`begin`](Self::begin) scope corresponds to one logical transaction;
/// after it exits, handler-related flags reset on the *next* `begin` call —
/// `exceptions_encountered` is readable in between for diagnostics.
pub struct TransactionsManager {
    handlers: RefCell<Vec<Rc<dyn TransactionHandler>>>,
    mutex: RefCell<Option<Rc<dyn TransactionHandler>>>,
    begun: Cell<bool>,
    already_rolled_back: Cell<bool>,
    exceptions_encountered: RefCell<Vec<String>>,
}

impl Default for TransactionsManager {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionsManager {
    /// A manager with no handlers and no mutex handler registered.
    #[must_use]
    pub fn new() -> Self {
        Self {
            handlers: RefCell::new(Vec::new()),
            mutex: RefCell::new(None),
            begun: Cell::new(false),
            already_rolled_back: Cell::new(false),
            exceptions_encountered: RefCell::new(Vec::new()),
        }
    }

    /// Register `handler`, to be driven after every previously-added
    /// handler (§3.2 invariant 5: append order is preserved on `begin` and
    /// `execute`).
    ///
    /// # Errors
    ///
    /// Returns [`TransactionError::AlreadyBegun`] if a `begin` scope is
    /// currently active.
    pub fn add(&self, handler: Rc<dyn TransactionHandler>) -> Result<(), TransactionError> {
        if self.begun.get() {
            return Err(TransactionError::AlreadyBegun);
        }
        self.handlers.borrow_mut().push(handler);
        Ok(())
    }

    /// Register the mutex handler, begun first and committed/rolled back
    /// last, bracketing every handler added via [`add`](Self::add).
    ///
    /// # Errors
    ///
    /// Returns [`TransactionError::AlreadyBegun`] if a `begin` scope is
    /// currently active.
    pub fn set_mutex(&self, handler: Rc<dyn TransactionHandler>) -> Result<(), TransactionError> {
        if self.begun.get() {
            return Err(TransactionError::AlreadyBegun);
        }
        *self.mutex.borrow_mut() = Some(handler);
        Ok(())
    }

    /// Every formatted trace recorded so far this scope (or since the last
    /// `begin`), in encounter order.
    #[must_use]
    pub fn exceptions_encountered(&self) -> Vec<String> {
        self.exceptions_encountered.borrow().clone()
    }

    fn record(&self, err: &HandlerError) {
        self.exceptions_encountered
            .borrow_mut()
            .push(TransactionError::format_trace(err));
    }

    /// Run one logical transaction scope: resets per-scope bookkeeping,
    /// begins the mutex handler then every handler in append order, runs
    /// `body`, and on a `body` failure attempts recovery exactly as §4.8
    /// describes.
    ///
    /// # Errors
    ///
    /// Propagates a handler's `begin` failure immediately (before `body`
    /// ever runs) as [`TransactionError::HandlerFailed`]. If `body` fails:
    /// re-raises the failure as `HandlerFailed` once rollback succeeds;
    /// raises [`TransactionError::Doomed`] if rollback had already been
    /// attempted earlier in this scope, or if the rollback attempted here
    /// itself fails.
    pub fn begin<F>(&self, body: F) -> Result<(), TransactionError>
    where
        F: FnOnce() -> Result<(), HandlerError>,
    {
        self.already_rolled_back.set(false);
        self.exceptions_encountered.borrow_mut().clear();
        self.begun.set(true);

        if let Some(mutex) = self.mutex.borrow().as_ref() {
            tracing::debug!("beginning mutex handler");
            mutex.begin().map_err(TransactionError::HandlerFailed)?;
        }
        for handler in self.handlers.borrow().iter() {
            handler.begin().map_err(TransactionError::HandlerFailed)?;
        }

        match body() {
            Ok(()) => Ok(()),
            Err(body_err) => {
                self.record(&body_err);
                if self.already_rolled_back.get() {
                    tracing::error!("transaction body failed after an earlier manual rollback; doomed");
                    Err(TransactionError::Doomed {
                        message: "Transactions already rollbacked".into(),
                        traces: self.exceptions_encountered(),
                    })
                } else {
                    match self.rollback() {
                        Ok(()) => Err(TransactionError::HandlerFailed(body_err)),
                        Err(_rollback_failure) => {
                            tracing::error!("rollback after transaction body failure also failed; doomed");
                            Err(TransactionError::Doomed {
                                message: "Transactions rollbacking failed".into(),
                                traces: self.exceptions_encountered(),
                            })
                        }
                    }
                }
            }
        }
    }

    /// Call `execute` on every handler in append order (the mutex handler
    /// has no execute phase of its own — it only brackets begin/rollback/
    /// commit, per §2's "Mutex handler" glossary entry).
    ///
    /// # Errors
    ///
    /// Returns [`TransactionError::NotBegun`] if no `begin` scope is active,
    /// or the first handler failure encountered, as `HandlerFailed`.
    pub fn execute(&self) -> Result<(), TransactionError> {
        if !self.begun.get() {
            return Err(TransactionError::NotBegun);
        }
        for handler in self.handlers.borrow().iter() {
            handler.execute().map_err(TransactionError::HandlerFailed)?;
        }
        Ok(())
    }

    /// Roll back every handler in append order, then the mutex handler.
    /// Every handler is invoked regardless of earlier failures — each
    /// failure is recorded into [`exceptions_encountered`](Self::exceptions_encountered),
    /// and the most recently encountered one is re-raised once all handlers
    /// have been given a chance to roll back (§4.8, §3.2 invariant 5).
    ///
    /// # Errors
    ///
    /// Returns [`TransactionError::NotBegun`] if no `begin` scope is active,
    /// or [`TransactionError::HandlerFailed`] wrapping the last handler (or
    /// mutex) rollback failure, if any occurred.
    pub fn rollback(&self) -> Result<(), TransactionError> {
        if !self.begun.get() {
            return Err(TransactionError::NotBegun);
        }
        self.already_rolled_back.set(true);
        let mut last_failure = None;
        for handler in self.handlers.borrow().iter() {
            if let Err(err) = handler.rollback() {
                self.record(&err);
                last_failure = Some(err);
            }
        }
        if let Some(mutex) = self.mutex.borrow().as_ref() {
            if let Err(err) = mutex.rollback() {
                self.record(&err);
                last_failure = Some(err);
            }
        }
        match last_failure {
            Some(err) => Err(TransactionError::HandlerFailed(err)),
            None => Ok(()),
        }
    }

    /// Run the commit phase of 2PC (§4.8):
    ///
    /// 1. Partition handlers by [`TransactionHandler::can_prepare_commit`].
    /// 2. Call `prepare_commit` on every preparable handler; if any reports
    ///    not-ready (or fails), roll back and return `Ok(())` — this is a
    ///    graceful abort, not an error.
    /// 3. Commit the unpreparable handlers first, then the preparable ones,
    ///    then the mutex handler last — unpreparable commits carry the
    ///    highest failure probability, so they run while rollback is still
    ///    meaningfully recoverable from the caller's perspective.
    ///
    /// # Errors
    ///
    /// Returns [`TransactionError::NotBegun`] if no `begin` scope is active,
    /// or [`TransactionError::HandlerFailed`] if a `prepare_commit`
    /// call errors, or if any `commit` call fails (commit failures are not
    /// recovered from here — §4.8's rationale is that a rollback triggered
    /// by a `body` error at the `begin` scope still picks this up).
    pub fn commit(&self) -> Result<(), TransactionError> {
        if !self.begun.get() {
            return Err(TransactionError::NotBegun);
        }
        let handlers = self.handlers.borrow().clone();
        let (preparable, unpreparable): (Vec<_>, Vec<_>) =
            handlers.into_iter().partition(|h| h.can_prepare_commit());

        let mut all_ready = true;
        for handler in &preparable {
            match handler.prepare_commit() {
                Ok(true) => {}
                Ok(false) => {
                    all_ready = false;
                    break;
                }
                Err(err) => return Err(TransactionError::HandlerFailed(err)),
            }
        }
        if !all_ready {
            tracing::debug!("a handler declined prepare_commit; rolling back instead of committing");
            self.rollback()?;
            return Ok(());
        }

        for handler in &unpreparable {
            handler.commit().map_err(TransactionError::HandlerFailed)?;
        }
        for handler in &preparable {
            handler.commit().map_err(TransactionError::HandlerFailed)?;
        }
        if let Some(mutex) = self.mutex.borrow().as_ref() {
            mutex.commit().map_err(TransactionError::HandlerFailed)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::cell::RefCell as StdRefCell;

    #[derive(Default)]
    struct Recording {
        log: Rc<StdRefCell<Vec<&'static str>>>,
        fail_execute: bool,
        fail_rollback: bool,
        label: &'static str,
    }

    impl TransactionHandler for Recording {
        fn begin(&self) -> Result<(), HandlerError> {
            self.log.borrow_mut().push("begin");
            Ok(())
        }
        fn execute(&self) -> Result<(), HandlerError> {
            self.log.borrow_mut().push("execute");
            if self.fail_execute {
                return Err(format!("{} execute failed", self.label).into());
            }
            Ok(())
        }
        fn rollback(&self) -> Result<(), HandlerError> {
            self.log.borrow_mut().push("rollback");
            if self.fail_rollback {
                return Err(format!("{} rollback failed", self.label).into());
            }
            Ok(())
        }
    }

    #[test]
    fn add_after_begin_fails() {
        let mgr = TransactionsManager::new();
        mgr.begin(|| Ok(())).unwrap();
        let err = mgr.add(Rc::new(Recording::default())).unwrap_err();
        assert!(matches!(err, TransactionError::AlreadyBegun));
    }

    #[test]
    fn execute_rollback_commit_require_begun() {
        let mgr = TransactionsManager::new();
        assert!(matches!(mgr.execute().unwrap_err(), TransactionError::NotBegun));
        assert!(matches!(mgr.rollback().unwrap_err(), TransactionError::NotBegun));
        assert!(matches!(mgr.commit().unwrap_err(), TransactionError::NotBegun));
    }

    #[test]
    fn handlers_begin_in_append_order_and_mutex_begins_first() {
        let log = Rc::new(StdRefCell::new(Vec::new()));
        struct Tagging(Rc<StdRefCell<Vec<&'static str>>>, &'static str);
        impl TransactionHandler for Tagging {
            fn begin(&self) -> Result<(), HandlerError> {
                self.0.borrow_mut().push(self.1);
                Ok(())
            }
        }
        let mgr = TransactionsManager::new();
        mgr.set_mutex(Rc::new(Tagging(log.clone(), "mutex"))).unwrap();
        mgr.add(Rc::new(Tagging(log.clone(), "a"))).unwrap();
        mgr.add(Rc::new(Tagging(log.clone(), "b"))).unwrap();
        mgr.begin(|| Ok(())).unwrap();
        assert_eq!(*log.borrow(), vec!["mutex", "a", "b"]);
    }

    #[test]
    fn body_failure_triggers_rollback_and_re_raises_it() {
        let mgr = TransactionsManager::new();
        let log = Rc::new(StdRefCell::new(Vec::new()));
        mgr.add(Rc::new(Recording {
            log: log.clone(),
            label: "h",
            ..Default::default()
        }))
        .unwrap();
        let err = mgr
            .begin(|| Err("body exploded".into()))
            .unwrap_err();
        assert!(matches!(err, TransactionError::HandlerFailed(e) if e.to_string() == "body exploded"));
        assert!(log.borrow().contains(&"rollback"));
    }

    #[test]
    fn s6_doomed_when_rollback_itself_fails() {
        // spec.md §8 S6: one handler whose rollback throws; body throws;
        // begin() exits raising Doomed carrying both traces.
        let mgr = TransactionsManager::new();
        mgr.add(Rc::new(Recording {
            fail_rollback: true,
            label: "h",
            ..Default::default()
        }))
        .unwrap();
        let err = mgr.begin(|| Err("body exploded".into())).unwrap_err();
        match err {
            TransactionError::Doomed { message, traces } => {
                assert_eq!(message, "Transactions rollbacking failed");
                assert_eq!(traces.len(), 2);
                assert!(traces[0].contains("body exploded"));
                assert!(traces[1].contains("h rollback failed"));
            }
            other => panic!("expected Doomed, got {other:?}"),
        }
    }

    #[test]
    fn doomed_when_a_manual_rollback_already_happened_this_scope() {
        let mgr = TransactionsManager::new();
        mgr.add(Rc::new(Recording::default())).unwrap();
        let err = mgr
            .begin(|| {
                mgr.rollback().unwrap();
                Err("late failure".into())
            })
            .unwrap_err();
        match err {
            TransactionError::Doomed { message, .. } => {
                assert_eq!(message, "Transactions already rollbacked");
            }
            other => panic!("expected Doomed, got {other:?}"),
        }
    }

    #[test]
    fn rollback_invokes_every_handler_even_if_one_fails() {
        let mgr = TransactionsManager::new();
        let log = Rc::new(StdRefCell::new(Vec::new()));
        mgr.add(Rc::new(Recording {
            log: log.clone(),
            fail_rollback: true,
            label: "a",
            ..Default::default()
        }))
        .unwrap();
        mgr.add(Rc::new(Recording {
            log: log.clone(),
            label: "b",
            ..Default::default()
        }))
        .unwrap();
        mgr.begin(|| Ok(())).unwrap();
        let err = mgr.rollback().unwrap_err();
        assert!(matches!(err, TransactionError::HandlerFailed(_)));
        assert_eq!(log.borrow().iter().filter(|s| **s == "rollback").count(), 2);
    }

    struct PrepareCommit {
        ready: bool,
        committed: Rc<Cell<bool>>,
    }
    impl TransactionHandler for PrepareCommit {
        fn can_prepare_commit(&self) -> bool {
            true
        }
        fn prepare_commit(&self) -> Result<bool, HandlerError> {
            Ok(self.ready)
        }
        fn commit(&self) -> Result<(), HandlerError> {
            self.committed.set(true);
            Ok(())
        }
    }

    #[test]
    fn commit_rolls_back_gracefully_when_a_handler_declines_prepare() {
        let mgr = TransactionsManager::new();
        let committed = Rc::new(Cell::new(false));
        mgr.add(Rc::new(PrepareCommit {
            ready: false,
            committed: committed.clone(),
        }))
        .unwrap();
        mgr.begin(|| Ok(())).unwrap();
        mgr.commit().unwrap();
        assert!(!committed.get());
    }

    #[test]
    fn commit_order_is_unpreparable_then_preparable_then_mutex() {
        let log = Rc::new(StdRefCell::new(Vec::new()));
        struct Tagging {
            log: Rc<StdRefCell<Vec<&'static str>>>,
            label: &'static str,
            preparable: bool,
        }
        impl TransactionHandler for Tagging {
            fn can_prepare_commit(&self) -> bool {
                self.preparable
            }
            fn prepare_commit(&self) -> Result<bool, HandlerError> {
                Ok(true)
            }
            fn commit(&self) -> Result<(), HandlerError> {
                self.log.borrow_mut().push(self.label);
                Ok(())
            }
        }
        let mgr = TransactionsManager::new();
        mgr.set_mutex(Rc::new(Tagging {
            log: log.clone(),
            label: "mutex",
            preparable: true,
        }))
        .unwrap();
        mgr.add(Rc::new(Tagging {
            log: log.clone(),
            label: "preparable",
            preparable: true,
        }))
        .unwrap();
        mgr.add(Rc::new(Tagging {
            log: log.clone(),
            label: "unpreparable",
            preparable: false,
        }))
        .unwrap();
        mgr.begin(|| Ok(())).unwrap();
        mgr.commit().unwrap();
        assert_eq!(*log.borrow(), vec!["unpreparable", "preparable", "mutex"]);
    }
}
