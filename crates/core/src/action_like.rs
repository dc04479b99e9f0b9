//! The `ActionLike` contract pipelines are built against, and the hook-chain
//! composition mechanism (§4.2, §4.4).
//!
//! `pysyphe` implements hooks as nested Python context managers: entering a
//! scope pushes onto a call stack, and `reversed(self._context_managers[side])`
//! unwinds it so the hook registered last is entered last but exited first.
//! Because each side (`"action"`/`"rollback"`) keeps its own list in
//! `pysyphe`, a `Hook` here wraps a single side's call and is registered into
//! one of two independent chains — it never needs to know which side it is
//! bracketing. `HookChain::run` models one nested `with` block the same way
//! `contextlib.nested` does: a function taking "the rest of the chain" as a
//! callback, composing exactly like nested `with` statements without a stack
//! of guard objects.

use std::rc::Rc;

use crate::error::Error;

/// Which side of an action is executing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    /// The forward direction.
    Action,
    /// The reverse/compensating direction.
    Rollback,
}

impl Side {
    /// The opposite side.
    #[must_use]
    pub fn flip(self) -> Self {
        match self {
            Self::Action => Self::Rollback,
            Self::Rollback => Self::Action,
        }
    }

    /// The string label used in [`Error::WrongSide`] and event records.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Action => "action",
            Self::Rollback => "rollback",
        }
    }
}

/// Anything that can run forward and backward and accept an
/// [`InfoStreamer`](crate::streamer::InfoStreamer).
///
/// This is the minimal contract `capstan-pipeline::ActionPipeline` requires
/// of an appended value (§4.1's "`NotAnAction`" error fires when a value
/// does not satisfy it) — satisfied by `capstan-action`'s `Action`,
/// `StatefulAction`, and `UnitAction`, and by `ActionPipeline` itself so
/// pipelines can nest. Neither side takes an external state parameter: a
/// prepared `StatefulAction` already owns the `ReferenceMap` it runs
/// against (§3.1) — there is nothing for a caller to pass in.
pub trait ActionLike {
    /// The name used for this action on `side`, for logging and
    /// `simulate_until` matching.
    fn name(&self, side: Side) -> String;

    /// Run the forward direction.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoForwardDefined`] if no forward callable is bound,
    /// [`Error::NotPrepared`] if this is a `StatefulAction` template that was
    /// never prepared, or propagates whatever the callable itself returns.
    fn execute(&self) -> Result<(), Error>;

    /// Run the reverse direction.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoReverseDefined`] if no reverse callable is bound,
    /// or propagates whatever the callable itself returns.
    fn undo(&self) -> Result<(), Error>;

    /// Install (or replace) the streamer events are reported to.
    fn set_streamer(&self, streamer: Rc<dyn crate::streamer::InfoStreamer>);

    /// Advance internal state as if `side` had run, without invoking the
    /// callable or any hook (§4.3.2). The base implementation is a no-op —
    /// a bare `Action` has no intrinsic state to advance.
    ///
    /// # Errors
    ///
    /// Implementations that require preparation return
    /// [`Error::NotPrepared`] when called on an unprepared instance.
    fn simulate(
        &self,
        side: Side,
        after_state: serde_json::Map<String, serde_json::Value>,
    ) -> Result<(), Error> {
        let _ = (side, after_state);
        Ok(())
    }
}

/// Result type a [`Hook`] and the call it wraps both use.
pub type HookResult = Result<(), Error>;

/// One link in a hook chain bracketing a single side's call, modelling a
/// Python context manager: `call` runs setup, invokes `next` for everything
/// the hook wraps (including inner hooks and the action itself), then runs
/// teardown — and may short-circuit by not calling `next` at all.
pub trait Hook {
    /// Wrap one call. Implementations that want the call to actually run
    /// **must** invoke `next()` and propagate its result.
    fn call(&self, next: &mut dyn FnMut() -> HookResult) -> HookResult;
}

/// An ordered composition of [`Hook`]s bracketing a single side's call.
///
/// Registration order controls nesting: [`HookChain::add_outer`] makes a
/// hook wrap everything registered so far (entered first, exited last);
/// [`HookChain::add_inner`] makes a hook the innermost wrapper, closest to
/// the actual call (entered last, exited first). `rollback_prereq_check`
/// and `enable_reverse` (§4.2, §4.3) are always registered with
/// `add_inner` so user-supplied hooks still wrap around them.
#[derive(Clone, Default)]
pub struct HookChain {
    hooks: Vec<Rc<dyn Hook>>,
}

impl HookChain {
    /// An empty chain.
    #[must_use]
    pub fn new() -> Self {
        Self { hooks: Vec::new() }
    }

    /// Register `hook` as the new outermost wrapper.
    pub fn add_outer(&mut self, hook: Rc<dyn Hook>) {
        self.hooks.insert(0, hook);
    }

    /// Register `hook` as the new innermost wrapper, closest to the call.
    pub fn add_inner(&mut self, hook: Rc<dyn Hook>) {
        self.hooks.push(hook);
    }

    /// Run `core` wrapped by every registered hook, outermost first.
    pub fn run(&self, core: &mut dyn FnMut() -> HookResult) -> HookResult {
        self.run_from(0, core)
    }

    fn run_from(&self, idx: usize, core: &mut dyn FnMut() -> HookResult) -> HookResult {
        match self.hooks.get(idx) {
            None => core(),
            Some(hook) => hook.call(&mut || self.run_from(idx + 1, core)),
        }
    }
}
