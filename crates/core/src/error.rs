//! Shared error taxonomy.
//!
//! `spec.md` §7 describes these as "kind tags, not types" — several Python
//! exception classes distilled into one Rust enum per crate. `KeyMissing`
//! and everything under the `ActionError` umbrella live here because both
//! `capstan-action` and `capstan-pipeline` raise them and neither is a
//! dependency of the other.

use thiserror::Error;

/// Errors raised by [`crate::ReferenceMap`], action preparation, hook
/// registration, and pipeline replay.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// A `ReferenceMap` lookup (or a dereferenced `Ref`) targeted a key that
    /// does not exist, or a `Ref` chain exceeded the cycle-detection bound.
    #[error("key `{key}` is missing from the reference map (cycle detected: {cycle})")]
    KeyMissing {
        /// The key that was looked up.
        key: String,
        /// `true` if the lookup was abandoned because it exceeded the
        /// bounded traversal depth rather than because the key is absent.
        cycle: bool,
    },

    /// `execute()` called on an action with no forward callable.
    #[error("no forward callable defined for action `{action}`")]
    NoForwardDefined {
        /// Name of the action.
        action: String,
    },

    /// `undo()` called on an action with no reverse callable, or a
    /// `UnitAction` was prepared without one.
    #[error("no reverse callable defined for action `{action}`")]
    NoReverseDefined {
        /// Name of the action.
        action: String,
    },

    /// `prepare` called on an action whose state is already bound.
    #[error("action `{action}` is already prepared")]
    AlreadyPrepared {
        /// Name of the action.
        action: String,
    },

    /// An operation that requires a prepared state was called on a template.
    #[error("action `{action}` has not been prepared")]
    NotPrepared {
        /// Name of the action.
        action: String,
    },

    /// After a successful forward execution, one or more
    /// `required_reverse_keys` were not present in the state.
    #[error("rollback prerequisites missing for action `{action}`: {missing:?}")]
    RollbackPrereqMissing {
        /// Name of the action.
        action: String,
        /// The required reverse keys that were not found.
        missing: Vec<String>,
    },

    /// A value appended to a pipeline does not satisfy the `ActionLike`
    /// contract.
    #[error("value does not implement the action contract (execute/undo/set_streamer)")]
    NotAnAction,

    /// A streamer was installed that does not implement `receive`.
    ///
    /// Unreachable in safe Rust once a value implements `InfoStreamer` —
    /// kept because `set_streamer` is specified to be fallible (§4.2) and a
    /// dynamically-loaded streamer (e.g. from a plugin boundary) could still
    /// fail this check in principle.
    #[error("streamer does not implement a usable receive() method")]
    NoSinkMethod,

    /// `get_name`/`set_name` (or an internal lookup) used a side label other
    /// than `action` or `rollback`.
    #[error("wrong action side `{side}`; available: action, rollback")]
    WrongSide {
        /// The invalid side label that was supplied.
        side: String,
    },

    /// A forward/reverse callable was registered with an arity other than
    /// exactly one (the state).
    #[error("callable for action `{action}` must take exactly one argument (the state), found {found}")]
    InvalidArity {
        /// Name of the action the callable was registered on.
        action: String,
        /// The arity that was actually supplied.
        found: usize,
    },

    /// `prepare(kwargs)` keys did not exactly match `required_forward_keys`.
    #[error(
        "preparation of `{action}` failed: missing keys {missing:?}, superfluous keys {superfluous:?}"
    )]
    MissingKwargs {
        /// Name of the action.
        action: String,
        /// Required keys that were not supplied.
        missing: Vec<String>,
        /// Supplied keys that are not required.
        superfluous: Vec<String>,
    },

    /// `simulate_until` walked the pipeline and the log entry did not match
    /// the expected forward or reverse name.
    #[error("simulate_until mismatch on `{action}`: expected `{expected}`, found `{found}`")]
    SimulateMismatch {
        /// Name of the action being matched against.
        action: String,
        /// The name `simulate_until` expected.
        expected: String,
        /// The name actually present in the log.
        found: String,
    },

    /// `simulate_until` finished walking the pipeline with log entries left
    /// unmatched.
    #[error("simulate_until left {remaining} log entries unmatched")]
    SimulateIncomplete {
        /// Count of trailing, unmatched log entries.
        remaining: usize,
    },
}

/// Convenience alias used throughout the workspace.
pub type Result<T, E = Error> = std::result::Result<T, E>;
