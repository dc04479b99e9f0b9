//! [`UnitAction`]: a [`StatefulAction`] whose rollback is gated on having
//! actually completed a forward run at least once (§4.4).
//!
//! Grounded on `pysyphe/actions.py::UnitAction`, whose `get_prepared_action`
//! starts the prepared instance's `undo` out as `lambda: None` and only
//! swaps in the real reverse once `_enables_rollback` observes a successful
//! forward call. This port keeps the real reverse always bound and instead
//! gates `undo()` on a `done` flag flipped by the same hook — equivalent
//! behaviour, one fewer moving part.

use std::cell::Cell;
use std::rc::Rc;

use capstan_core::{ActionLike, Error, Hook, HookResult, InfoStreamer, ReferenceMap, Side, StateValue};

use crate::stateful::StatefulAction;

struct EnableReverse {
    done: Rc<Cell<bool>>,
}

impl Hook for EnableReverse {
    fn call(&self, next: &mut dyn FnMut() -> HookResult) -> HookResult {
        // No try/finally equivalent here, mirroring `_enables_rollback`: a
        // failed forward call leaves the gate closed.
        next()?;
        self.done.set(true);
        Ok(())
    }
}

/// A [`StatefulAction`] that refuses to roll back until its forward side has
/// run at least once successfully (Invariant 6: "∀ `UnitAction` before its
/// first successful forward call: `undo()` is a silent no-op").
///
/// Unlike `StatefulAction`, a reverse callable is mandatory — there is no
/// reverseless `UnitAction`, since the entire point of the type is the
/// atomicity gate on rollback.
pub struct UnitAction {
    inner: Rc<StatefulAction>,
    done: Rc<Cell<bool>>,
}

impl UnitAction {
    /// Build an unprepared `UnitAction` template. Both `forward` and
    /// `reverse` are required up front — the Rust translation of `pysyphe`
    /// raising `NoReverseDefined` at preparation time if `rollback_action`
    /// was never called on a `UnitAction` template.
    pub fn new<F, R, FK, RK>(
        name: impl Into<String>,
        reverse_name: impl Into<String>,
        forward: F,
        reverse: R,
        required_forward_keys: impl IntoIterator<Item = FK>,
        required_reverse_keys: impl IntoIterator<Item = RK>,
    ) -> Self
    where
        F: Fn(&ReferenceMap) -> Result<(), Error> + 'static,
        R: Fn(&ReferenceMap) -> Result<(), Error> + 'static,
        FK: Into<String>,
        RK: Into<String>,
    {
        let template = StatefulAction::new(name, reverse_name, forward, required_forward_keys, required_reverse_keys)
            .with_reverse(reverse);
        Self {
            inner: Rc::new(template),
            done: Rc::new(Cell::new(false)),
        }
    }

    /// Register a hook on the template, carried onto every prepared copy.
    ///
    /// # Panics
    ///
    /// Panics if called after this template has already produced prepared
    /// copies that are still alive (an internal misuse, never reachable
    /// through the public construction order).
    pub fn add_hook(&mut self, side: Side, hook: Rc<dyn Hook>, inner: bool) {
        Rc::get_mut(&mut self.inner)
            .expect("add_hook called on a UnitAction template with outstanding clones")
            .add_hook(side, hook, inner);
    }

    /// `true` once this instance's forward side has completed successfully
    /// at least once.
    #[must_use]
    pub fn is_enabled_for_rollback(&self) -> bool {
        self.done.get()
    }

    /// Bind `kwargs` to a fresh, independent, atomicity-gated instance.
    ///
    /// # Errors
    ///
    /// See [`StatefulAction::prepare`].
    pub fn prepare<K, V, I>(&self, kwargs: I) -> Result<Rc<UnitAction>, Error>
    where
        K: Into<String>,
        V: Into<StateValue>,
        I: IntoIterator<Item = (K, V)>,
    {
        let prepared_inner = self.inner.prepare(kwargs)?;
        let done = Rc::new(Cell::new(false));
        prepared_inner.add_prepared_hook(Side::Action, Rc::new(EnableReverse { done: done.clone() }), true)?;
        Ok(Rc::new(UnitAction {
            inner: prepared_inner,
            done,
        }))
    }

    /// The bound internal state of a prepared instance, for cross-action
    /// linking. See [`StatefulAction::state`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotPrepared`] if this instance has not been
    /// prepared.
    pub fn state(&self) -> Result<ReferenceMap, Error> {
        self.inner.state()
    }
}

impl ActionLike for UnitAction {
    fn name(&self, side: Side) -> String {
        self.inner.name(side)
    }

    fn execute(&self) -> Result<(), Error> {
        self.inner.execute()
    }

    fn undo(&self) -> Result<(), Error> {
        if !self.inner.is_prepared() {
            return self.inner.undo();
        }
        if !self.done.get() {
            return Ok(());
        }
        self.inner.undo()
    }

    fn set_streamer(&self, streamer: Rc<dyn InfoStreamer>) {
        self.inner.set_streamer(streamer);
    }

    fn simulate(
        &self,
        side: Side,
        after_state: serde_json::Map<String, serde_json::Value>,
    ) -> Result<(), Error> {
        match side {
            Side::Action => self.done.set(true),
            // Not observed in the original: `UnitAction.simulate` only
            // overrides the forward side. Resetting here too keeps a
            // replayed rollback log consistent with a live run, where a
            // completed rollback leaves nothing left to roll back again.
            Side::Rollback => self.done.set(false),
        }
        self.inner.simulate(side, after_state)
    }
}
