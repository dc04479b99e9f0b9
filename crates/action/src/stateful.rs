//! [`StatefulAction`]: an action that must be bound to concrete parameters
//! via [`StatefulAction::prepare`] before it can run, and that checks its
//! own rollback prerequisites after a successful forward run (§4.3).
//!
//! Grounded on `pysyphe/actions.py::StatefullAction`, whose
//! `get_prepared_action(**kwargs)` validates the supplied keyword arguments
//! against a declared set, returns a *copy* of the template with a fresh
//! `ReferencesDict` bound as `self._state`, and partially-applies the
//! user's state-taking callable against that state so `do()`/`undo()` can
//! call it with no arguments. The template itself is untouched and may be
//! prepared again (§3.2 invariant 1).

use std::collections::HashSet;
use std::rc::Rc;

use capstan_core::{ActionLike, Error, Hook, HookResult, InfoStreamer, ReferenceMap, Side, StateValue};

use crate::action::Action;

/// The user-supplied forward/reverse callable: takes the action's own bound
/// state explicitly, the shape `pysyphe` requires of `action_fct`/
/// `rollback_fct` before they are partially applied (§4.3 "Callable
/// contract").
pub type StateFn = Rc<dyn Fn(&ReferenceMap) -> Result<(), Error>>;

struct RollbackPrereqCheck {
    action_name: String,
    state: ReferenceMap,
    required_reverse_keys: Vec<String>,
}

impl Hook for RollbackPrereqCheck {
    fn call(&self, next: &mut dyn FnMut() -> HookResult) -> HookResult {
        match next() {
            Ok(()) => {
                let missing: Vec<String> = self
                    .required_reverse_keys
                    .iter()
                    .filter(|key| !self.state.contains_key(key))
                    .cloned()
                    .collect();
                if missing.is_empty() {
                    Ok(())
                } else {
                    Err(Error::RollbackPrereqMissing {
                        action: self.action_name.clone(),
                        missing,
                    })
                }
            }
            Err(err) => {
                // §4.3.1: no key-completeness check on failure — the
                // rollback function is expected to handle partial state.
                self.state.set("action_failed", true);
                Err(err)
            }
        }
    }
}

/// An action that requires preparation before it can execute.
///
/// In template mode (no `prepare` call yet) a `StatefulAction` has no bound
/// state: it may be invoked directly as a plain function via
/// [`StatefulAction::call_as_function`], or prepared — any number of times,
/// since each `prepare` call returns an independent instance (§3.2
/// invariant 1) rather than mutating the template.
pub struct StatefulAction {
    name: String,
    reverse_name: String,
    forward: Option<StateFn>,
    reverse: Option<StateFn>,
    required_forward_keys: Vec<String>,
    required_reverse_keys: Vec<String>,
    template_action_hooks: capstan_core::HookChain,
    template_rollback_hooks: capstan_core::HookChain,
    prepared: std::cell::RefCell<Option<Prepared>>,
}

struct Prepared {
    state: ReferenceMap,
    inner: Action,
}

impl StatefulAction {
    /// Build an unprepared `StatefulAction` template. `required_forward_keys`
    /// is the exact set of keyword arguments [`prepare`](Self::prepare) must
    /// receive; `required_reverse_keys` is the set of keys that must exist in
    /// the state after a successful forward run for rollback to be possible.
    pub fn new<F, FK, RK>(
        name: impl Into<String>,
        reverse_name: impl Into<String>,
        forward: F,
        required_forward_keys: impl IntoIterator<Item = FK>,
        required_reverse_keys: impl IntoIterator<Item = RK>,
    ) -> Self
    where
        F: Fn(&ReferenceMap) -> Result<(), Error> + 'static,
        FK: Into<String>,
        RK: Into<String>,
    {
        Self {
            name: name.into(),
            reverse_name: reverse_name.into(),
            forward: Some(Rc::new(forward)),
            reverse: None,
            required_forward_keys: required_forward_keys.into_iter().map(Into::into).collect(),
            required_reverse_keys: required_reverse_keys.into_iter().map(Into::into).collect(),
            template_action_hooks: capstan_core::HookChain::new(),
            template_rollback_hooks: capstan_core::HookChain::new(),
            prepared: std::cell::RefCell::new(None),
        }
    }

    /// Attach a reverse callable. Mirrors `StatefullAction.rollback_action`;
    /// fails at construction time in this port rather than at registration,
    /// since `StatefulAction::new` already takes the forward callable.
    #[must_use]
    pub fn with_reverse(mut self, reverse: impl Fn(&ReferenceMap) -> Result<(), Error> + 'static) -> Self {
        self.reverse = Some(Rc::new(reverse));
        self
    }

    /// Register a hook on the template, carried onto every future prepared
    /// copy (innermost hooks added during `prepare` still end up closer to
    /// the call than these).
    pub fn add_hook(&mut self, side: Side, hook: Rc<dyn Hook>, inner: bool) {
        let chain = match side {
            Side::Action => &mut self.template_action_hooks,
            Side::Rollback => &mut self.template_rollback_hooks,
        };
        if inner {
            chain.add_inner(hook);
        } else {
            chain.add_outer(hook);
        }
    }

    /// Register `hook` as an outer wrapper on the template's forward side,
    /// and hand `hook` back unchanged. See `Action::action_hook`.
    pub fn action_hook(&mut self, hook: Rc<dyn Hook>) -> Rc<dyn Hook> {
        self.add_hook(Side::Action, hook.clone(), false);
        hook
    }

    /// Register `hook` as an outer wrapper on the template's reverse side,
    /// and hand `hook` back unchanged. See `Action::action_hook`.
    pub fn rollback_hook(&mut self, hook: Rc<dyn Hook>) -> Rc<dyn Hook> {
        self.add_hook(Side::Rollback, hook.clone(), false);
        hook
    }

    /// The keys `prepare` must be supplied, exactly.
    #[must_use]
    pub fn required_forward_keys(&self) -> &[String] {
        &self.required_forward_keys
    }

    /// The keys that must exist in the state after a successful forward run.
    #[must_use]
    pub fn required_reverse_keys(&self) -> &[String] {
        &self.required_reverse_keys
    }

    /// `true` once this particular instance has been prepared (always
    /// `false` for a template, even after `prepare` has been called on it —
    /// `prepare` returns a distinct, independent instance).
    #[must_use]
    pub fn is_prepared(&self) -> bool {
        self.prepared.borrow().is_some()
    }

    /// The bound internal `ReferenceMap` of a prepared instance, for linking
    /// another action's preparation to this one's output
    /// (`other.prepare([("x", this.state().unwrap().ref_to("y"))])`, §4.1).
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotPrepared`] if this instance has not been
    /// prepared.
    pub fn state(&self) -> Result<ReferenceMap, Error> {
        self.prepared
            .borrow()
            .as_ref()
            .map(|p| p.state.clone())
            .ok_or_else(|| Error::NotPrepared {
                action: self.name.clone(),
            })
    }

    /// Invoke the forward callable directly against `external_state`,
    /// bypassing preparation, hooks, and the streamer entirely — the
    /// template-mode `__call__` of §3.1. Only legal on an unprepared
    /// instance.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyPrepared`] if this instance has already been
    /// prepared.
    pub fn call_as_function(&self, external_state: &ReferenceMap) -> Result<(), Error> {
        if self.prepared.borrow().is_some() {
            return Err(Error::AlreadyPrepared {
                action: self.name.clone(),
            });
        }
        let Some(forward) = &self.forward else {
            return Err(Error::NoForwardDefined {
                action: self.name.clone(),
            });
        };
        forward(external_state)
    }

    /// Bind `kwargs` to a fresh, independent instance of this action.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoForwardDefined`] if no forward callable is bound,
    /// [`Error::AlreadyPrepared`] if called on an instance that is itself
    /// already prepared, or [`Error::MissingKwargs`] if the supplied keys do
    /// not exactly match [`required_forward_keys`](Self::required_forward_keys).
    pub fn prepare<K, V, I>(&self, kwargs: I) -> Result<Rc<StatefulAction>, Error>
    where
        K: Into<String>,
        V: Into<StateValue>,
        I: IntoIterator<Item = (K, V)>,
    {
        let Some(forward) = self.forward.clone() else {
            return Err(Error::NoForwardDefined {
                action: self.name.clone(),
            });
        };
        if self.prepared.borrow().is_some() {
            return Err(Error::AlreadyPrepared {
                action: self.name.clone(),
            });
        }

        let entries: Vec<(String, StateValue)> = kwargs.into_iter().map(|(k, v)| (k.into(), v.into())).collect();

        let supplied: HashSet<&str> = entries.iter().map(|(k, _)| k.as_str()).collect();
        let required: HashSet<&str> = self.required_forward_keys.iter().map(String::as_str).collect();

        let missing: Vec<String> = required.difference(&supplied).map(|s| (*s).to_string()).collect();
        let superfluous: Vec<String> = supplied.difference(&required).map(|s| (*s).to_string()).collect();

        if !missing.is_empty() || !superfluous.is_empty() {
            return Err(Error::MissingKwargs {
                action: self.name.clone(),
                missing,
                superfluous,
            });
        }

        let state = ReferenceMap::from_entries(entries);

        let bound_forward = {
            let forward = forward.clone();
            let state = state.clone();
            move || forward(&state)
        };
        let mut inner = Action::new().with_forward(self.name.clone(), bound_forward);
        inner.set_hooks(Side::Action, self.template_action_hooks.clone());

        if let Some(reverse) = self.reverse.clone() {
            let bound_reverse = {
                let state = state.clone();
                move || reverse(&state)
            };
            inner = inner.with_reverse(self.reverse_name.clone(), bound_reverse);
            inner.set_hooks(Side::Rollback, self.template_rollback_hooks.clone());
        } else {
            // §4.3 step 7: a reverseless action is legal; undo is a silent
            // no-op rather than NoReverseDefined.
            inner = inner.with_silent_reverse(self.reverse_name.clone(), || Ok(()));
        }
        inner = inner.with_event_state(state.clone());

        // Innermost forward hook so outer, user-registered hooks never
        // observe the state between `action_failed` being stamped and their
        // own exit phase running (§4.3.1).
        inner.add_hook(
            Side::Action,
            Rc::new(RollbackPrereqCheck {
                action_name: self.name.clone(),
                state: state.clone(),
                required_reverse_keys: self.required_reverse_keys.clone(),
            }),
            true,
        );

        Ok(Rc::new(StatefulAction {
            name: self.name.clone(),
            reverse_name: self.reverse_name.clone(),
            forward: Some(forward),
            reverse: self.reverse.clone(),
            required_forward_keys: self.required_forward_keys.clone(),
            required_reverse_keys: self.required_reverse_keys.clone(),
            template_action_hooks: self.template_action_hooks.clone(),
            template_rollback_hooks: self.template_rollback_hooks.clone(),
            prepared: std::cell::RefCell::new(Some(Prepared { state, inner })),
        }))
    }

    /// Register a hook on a prepared instance's inner `Action` — used by
    /// `UnitAction` to add `enable_reverse` after preparation completes.
    pub(crate) fn add_prepared_hook(&self, side: Side, hook: Rc<dyn Hook>, inner: bool) -> Result<(), Error> {
        let prepared = self.prepared.borrow();
        let Some(p) = prepared.as_ref() else {
            return Err(Error::NotPrepared {
                action: self.name.clone(),
            });
        };
        p.inner.add_hook(side, hook, inner);
        Ok(())
    }
}

impl ActionLike for StatefulAction {
    fn name(&self, side: Side) -> String {
        match side {
            Side::Action => self.name.clone(),
            Side::Rollback => self.reverse_name.clone(),
        }
    }

    fn execute(&self) -> Result<(), Error> {
        let prepared = self.prepared.borrow();
        let Some(p) = prepared.as_ref() else {
            return Err(Error::NotPrepared {
                action: self.name.clone(),
            });
        };
        p.inner.execute()
    }

    fn undo(&self) -> Result<(), Error> {
        let prepared = self.prepared.borrow();
        let Some(p) = prepared.as_ref() else {
            return Err(Error::NotPrepared {
                action: self.name.clone(),
            });
        };
        p.inner.undo()
    }

    fn set_streamer(&self, streamer: Rc<dyn InfoStreamer>) {
        if let Some(p) = self.prepared.borrow().as_ref() {
            p.inner.set_streamer(streamer);
        }
    }

    fn simulate(
        &self,
        side: Side,
        after_state: serde_json::Map<String, serde_json::Value>,
    ) -> Result<(), Error> {
        let prepared = self.prepared.borrow();
        let Some(p) = prepared.as_ref() else {
            return Err(Error::NotPrepared {
                action: self.name.clone(),
            });
        };
        p.state.merge_in_place(after_state);
        p.inner.report_simulated(side);
        Ok(())
    }
}
