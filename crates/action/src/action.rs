//! [`Action`]: a bare, reversible unit of work — a forward callable, an
//! optional reverse callable, and the hook machinery that brackets either
//! side (§4.2).
//!
//! Grounded on `pysyphe/actions.py::Action`, whose `_action_fct`/
//! `_rollback_fct` take no arguments (any state they need is already bound
//! by the time they're called) and whose `do`/`undo` dispatch through a
//! stack of registered context managers. `StatefulAction` builds on this by
//! binding its user-supplied, state-taking callable into one of these
//! zero-argument closures at preparation time (§4.3 step 5).
//!
//! A bare `Action` has no intrinsic state (§3.1), so its events carry no
//! state snapshot; `StatefulAction`'s `prepare` attaches one via
//! [`Action::with_event_state`].

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};

use capstan_core::{
    ActionLike, Error, Event, Hook, HookChain, InfoStreamer, NullStreamer, ReferenceMap, Side, Step,
};

/// A forward or reverse callable, already bound to whatever state it needs.
pub type Callable = Rc<dyn Fn() -> Result<(), Error>>;

static UNNAMED_COUNTER: AtomicUsize = AtomicUsize::new(0);

fn unnamed_label() -> String {
    format!(
        "<unnamed action #{}>",
        UNNAMED_COUNTER.fetch_add(1, Ordering::Relaxed)
    )
}

/// A bare action: a named forward callable, an optional named reverse
/// callable, and two chains of hooks bracketing each side (§3.1: "two
/// ordered lists of scope hooks, one per side").
///
/// Calling [`Action::execute`] (via [`ActionLike`]) with no forward callable
/// bound returns [`Error::NoForwardDefined`]; calling [`Action::undo`] with
/// no reverse bound returns [`Error::NoReverseDefined`] — the precondition
/// `StatefulAction` and `UnitAction` build their own guarantees on top of.
pub struct Action {
    name: RefCell<Option<String>>,
    reverse_name: RefCell<Option<String>>,
    forward: Option<Callable>,
    reverse: Option<Callable>,
    streamer: RefCell<Rc<dyn InfoStreamer>>,
    action_hooks: RefCell<HookChain>,
    rollback_hooks: RefCell<HookChain>,
    /// A reverse side that exists only to make `undo()` legal, but should
    /// not be reported to the streamer (§4.3 step 7: "a reverseless action
    /// is legal; `undo` must be a silent no-op").
    silent_reverse: std::cell::Cell<bool>,
    /// The `ReferenceMap` to snapshot into events, if this action has one.
    /// `None` for a bare `Action`; set by `StatefulAction::prepare`.
    event_state: Option<ReferenceMap>,
}

impl Default for Action {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for Action {
    /// §4.2 `copy()`: a value-copy with the hook lists duplicated. Shares
    /// the forward/reverse closures and any attached state (a bare `Action`
    /// has none; `StatefulAction` replaces `event_state` on its own copies).
    fn clone(&self) -> Self {
        Self {
            name: RefCell::new(self.name.borrow().clone()),
            reverse_name: RefCell::new(self.reverse_name.borrow().clone()),
            forward: self.forward.clone(),
            reverse: self.reverse.clone(),
            streamer: RefCell::new(self.streamer.borrow().clone()),
            action_hooks: RefCell::new(self.action_hooks.borrow().clone()),
            rollback_hooks: RefCell::new(self.rollback_hooks.borrow().clone()),
            silent_reverse: std::cell::Cell::new(self.silent_reverse.get()),
            event_state: self.event_state.clone(),
        }
    }
}

impl Action {
    /// An action with neither side bound yet.
    #[must_use]
    pub fn new() -> Self {
        Self {
            name: RefCell::new(None),
            reverse_name: RefCell::new(None),
            forward: None,
            reverse: None,
            streamer: RefCell::new(Rc::new(NullStreamer)),
            action_hooks: RefCell::new(HookChain::new()),
            rollback_hooks: RefCell::new(HookChain::new()),
            silent_reverse: std::cell::Cell::new(false),
            event_state: None,
        }
    }

    /// Bind the forward callable, named `name`.
    #[must_use]
    pub fn with_forward(mut self, name: impl Into<String>, f: impl Fn() -> Result<(), Error> + 'static) -> Self {
        self.name = RefCell::new(Some(name.into()));
        self.forward = Some(Rc::new(f));
        self
    }

    /// Bind the reverse callable, named `name`.
    #[must_use]
    pub fn with_reverse(mut self, name: impl Into<String>, f: impl Fn() -> Result<(), Error> + 'static) -> Self {
        self.reverse_name = RefCell::new(Some(name.into()));
        self.reverse = Some(Rc::new(f));
        self
    }

    /// Bind a reverse callable whose events are never reported — used for
    /// the synthetic no-op reverse a reverseless `StatefulAction` gets.
    #[must_use]
    pub fn with_silent_reverse(mut self, name: impl Into<String>, f: impl Fn() -> Result<(), Error> + 'static) -> Self {
        self.reverse_name = RefCell::new(Some(name.into()));
        self.reverse = Some(Rc::new(f));
        self.silent_reverse.set(true);
        self
    }

    /// Attach the `ReferenceMap` whose snapshot should ride along on every
    /// emitted event. Bare actions have none; `StatefulAction::prepare`
    /// calls this with its freshly bound internal state.
    #[must_use]
    pub fn with_event_state(mut self, state: ReferenceMap) -> Self {
        self.event_state = Some(state);
        self
    }

    /// `true` if a forward callable is bound.
    #[must_use]
    pub fn has_forward(&self) -> bool {
        self.forward.is_some()
    }

    /// `true` if a reverse callable is bound.
    #[must_use]
    pub fn has_reverse(&self) -> bool {
        self.reverse.is_some()
    }

    /// Register a hook on `side`. `inner = true` makes it the innermost
    /// wrapper (closest to the actual call); otherwise it becomes the new
    /// outermost wrapper on that side's chain. See [`HookChain`].
    pub fn add_hook(&self, side: Side, hook: Rc<dyn Hook>, inner: bool) {
        let mut chain = match side {
            Side::Action => self.action_hooks.borrow_mut(),
            Side::Rollback => self.rollback_hooks.borrow_mut(),
        };
        if inner {
            chain.add_inner(hook);
        } else {
            chain.add_outer(hook);
        }
    }

    /// Register `hook` as an outer wrapper on the forward side, and hand
    /// `hook` back unchanged. A thin convenience over
    /// [`Action::add_hook`](Action::add_hook) for the common case of a
    /// single scoped-resource hook that the caller also wants to keep a
    /// handle to (e.g. to register the same hook on another action).
    pub fn action_hook(&self, hook: Rc<dyn Hook>) -> Rc<dyn Hook> {
        self.add_hook(Side::Action, hook.clone(), false);
        hook
    }

    /// Register `hook` as an outer wrapper on the reverse side, and hand
    /// `hook` back unchanged. See [`Action::action_hook`].
    pub fn rollback_hook(&self, hook: Rc<dyn Hook>) -> Rc<dyn Hook> {
        self.add_hook(Side::Rollback, hook.clone(), false);
        hook
    }

    /// Replace a side's entire hook chain (used by `StatefulAction::prepare`
    /// to carry a template's user-registered hooks onto the prepared copy
    /// before adding its own innermost ones).
    pub(crate) fn set_hooks(&self, side: Side, chain: HookChain) {
        match side {
            Side::Action => *self.action_hooks.borrow_mut() = chain,
            Side::Rollback => *self.rollback_hooks.borrow_mut() = chain,
        }
    }

    pub(crate) fn hooks(&self, side: Side) -> HookChain {
        match side {
            Side::Action => self.action_hooks.borrow().clone(),
            Side::Rollback => self.rollback_hooks.borrow().clone(),
        }
    }

    /// Emit a [`Step::Simulated`] event for `side`, bypassing hooks and the
    /// callable entirely — used by `StatefulAction::simulate`.
    pub(crate) fn report_simulated(&self, side: Side) {
        let name = self.resolved_name(side);
        let rollback_of = (side == Side::Rollback).then(|| self.resolved_name(Side::Action));
        let streamer = self.streamer.borrow().clone();
        streamer.receive(&Event {
            action_name: name,
            side,
            step: Step::Simulated,
            state: self.event_state.as_ref().map(ReferenceMap::snapshot),
            rollback_of,
            exception: None,
        });
    }

    fn resolved_name(&self, side: Side) -> String {
        let cell = match side {
            Side::Action => &self.name,
            Side::Rollback => &self.reverse_name,
        };
        if let Some(existing) = cell.borrow().as_ref() {
            return existing.clone();
        }
        let generated = unnamed_label();
        *cell.borrow_mut() = Some(generated.clone());
        generated
    }

    fn run(&self, side: Side) -> Result<(), Error> {
        let callable = match side {
            Side::Action => self.forward.clone(),
            Side::Rollback => self.reverse.clone(),
        };
        let name = self.resolved_name(side);
        let Some(callable) = callable else {
            return Err(match side {
                Side::Action => Error::NoForwardDefined { action: name },
                Side::Rollback => Error::NoReverseDefined { action: name },
            });
        };

        let silent = side == Side::Rollback && self.silent_reverse.get();
        let streamer = self.streamer.borrow().clone();
        let snapshot = || self.event_state.as_ref().map(ReferenceMap::snapshot);
        // §6: a reverse-side event carries `rollback_of = forward_name` so a
        // streamer can correlate it with the forward run it is undoing.
        let rollback_of = (side == Side::Rollback).then(|| self.resolved_name(Side::Action));

        tracing::debug!(action = %name, side = side.label(), "starting");
        if !silent {
            streamer.receive(&Event {
                action_name: name.clone(),
                side,
                step: Step::Starting,
                state: snapshot(),
                rollback_of: rollback_of.clone(),
                exception: None,
            });
        }

        let hooks = match side {
            Side::Action => self.action_hooks.borrow(),
            Side::Rollback => self.rollback_hooks.borrow(),
        };
        let result = hooks.run(&mut || callable());

        if !silent {
            match &result {
                Ok(()) => {
                    tracing::debug!(action = %name, side = side.label(), "succeeded");
                    streamer.receive(&Event {
                        action_name: name.clone(),
                        side,
                        step: Step::Succeeded,
                        state: snapshot(),
                        rollback_of: rollback_of.clone(),
                        exception: None,
                    });
                }
                Err(err) => {
                    tracing::debug!(action = %name, side = side.label(), error = %err, "failed");
                    streamer.receive(&Event {
                        action_name: name,
                        side,
                        step: Step::Failed,
                        state: snapshot(),
                        rollback_of,
                        exception: Some(err.to_string()),
                    });
                }
            }
        }
        result
    }
}

impl ActionLike for Action {
    fn name(&self, side: Side) -> String {
        self.resolved_name(side)
    }

    fn execute(&self) -> Result<(), Error> {
        self.run(Side::Action)
    }

    fn undo(&self) -> Result<(), Error> {
        self.run(Side::Rollback)
    }

    fn set_streamer(&self, streamer: Rc<dyn InfoStreamer>) {
        *self.streamer.borrow_mut() = streamer;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn executes_bound_forward() {
        let ran = Rc::new(Cell::new(false));
        let flag = ran.clone();
        let action = Action::new().with_forward("set_flag", move || {
            flag.set(true);
            Ok(())
        });
        action.execute().unwrap();
        assert!(ran.get());
    }

    #[test]
    fn missing_forward_errors() {
        let action = Action::new();
        let err = action.execute().unwrap_err();
        assert!(matches!(err, Error::NoForwardDefined { .. }));
    }

    #[test]
    fn missing_reverse_errors() {
        let action = Action::new().with_forward("noop", || Ok(()));
        let err = action.undo().unwrap_err();
        assert!(matches!(err, Error::NoReverseDefined { .. }));
    }

    #[test]
    fn unnamed_action_gets_a_stable_generated_label() {
        let action = Action::new().with_reverse("undo_only", || Ok(()));
        let first = action.name(Side::Action);
        let second = action.name(Side::Action);
        assert_eq!(first, second);
        assert!(first.starts_with("<unnamed action"));
    }

    #[test]
    fn propagates_forward_error() {
        let action = Action::new().with_forward("boom", || {
            Err(Error::NotPrepared {
                action: "boom".into(),
            })
        });
        assert!(action.execute().is_err());
    }

    #[test]
    fn rollback_events_carry_the_forward_name_they_undo() {
        use capstan_core::{InfoStreamer, Step};
        use std::cell::RefCell;

        #[derive(Default)]
        struct Collector(RefCell<Vec<capstan_core::Event>>);
        impl InfoStreamer for Collector {
            fn receive(&self, event: &capstan_core::Event) {
                self.0.borrow_mut().push(event.clone());
            }
        }

        let action = Action::new()
            .with_forward("create_file", || Ok(()))
            .with_reverse("delete_file", || Ok(()));
        let collector = Rc::new(Collector::default());
        action.set_streamer(collector.clone());
        action.execute().unwrap();
        action.undo().unwrap();

        let events = collector.0.borrow();
        let forward_events: Vec<_> = events.iter().filter(|e| e.side == Side::Action).collect();
        let reverse_events: Vec<_> = events.iter().filter(|e| e.side == Side::Rollback).collect();
        assert!(forward_events.iter().all(|e| e.rollback_of.is_none()));
        assert!(reverse_events
            .iter()
            .all(|e| e.rollback_of.as_deref() == Some("create_file")));
        assert!(reverse_events.iter().any(|e| e.step == Step::Succeeded));
    }

    #[test]
    fn hooks_are_independent_per_side() {
        let log = Rc::new(RefCell::new(Vec::new()));
        struct Recorder(Rc<RefCell<Vec<&'static str>>>, &'static str);
        impl Hook for Recorder {
            fn call(&self, next: &mut dyn FnMut() -> Result<(), Error>) -> Result<(), Error> {
                self.0.borrow_mut().push(self.1);
                next()
            }
        }
        let action = Action::new()
            .with_forward("f", || Ok(()))
            .with_reverse("r", || Ok(()));
        action.add_hook(Side::Action, Rc::new(Recorder(log.clone(), "action-hook")), false);
        action.add_hook(Side::Rollback, Rc::new(Recorder(log.clone(), "rollback-hook")), false);
        action.execute().unwrap();
        action.undo().unwrap();
        assert_eq!(*log.borrow(), vec!["action-hook", "rollback-hook"]);
    }

    #[test]
    fn action_hook_and_rollback_hook_register_and_return_the_same_hook() {
        let log = Rc::new(RefCell::new(Vec::new()));
        struct Recorder(Rc<RefCell<Vec<&'static str>>>, &'static str);
        impl Hook for Recorder {
            fn call(&self, next: &mut dyn FnMut() -> Result<(), Error>) -> Result<(), Error> {
                self.0.borrow_mut().push(self.1);
                next()
            }
        }
        let action = Action::new()
            .with_forward("f", || Ok(()))
            .with_reverse("r", || Ok(()));
        let hook: Rc<dyn Hook> = Rc::new(Recorder(log.clone(), "shared"));
        let returned = action.action_hook(hook.clone());
        assert!(Rc::ptr_eq(&returned, &hook));
        action.rollback_hook(hook);
        action.execute().unwrap();
        action.undo().unwrap();
        assert_eq!(*log.borrow(), vec!["shared", "shared"]);
    }
}
