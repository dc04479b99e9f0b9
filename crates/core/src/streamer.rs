//! The `InfoStreamer` port: a pluggable observer for action and pipeline
//! execution (§6). Grounded on `nebula-log::observability::events` —
//! a trait with a `name`/`data` pair of accessors on the event, and a sink
//! the caller owns, rather than a global logger.

use std::fmt;

use crate::action_like::Side;

/// A single reported occurrence, passed to [`InfoStreamer::receive`].
///
/// Mirrors `pysyphe/streamers.py`'s call signature
/// (`action, side, step, exception`) plus a state snapshot, flattened into
/// one record so a streamer implementation can pattern-match on it or just
/// format it.
#[derive(Debug, Clone)]
pub struct Event {
    /// Name of the action or pipeline step that produced this event.
    pub action_name: String,
    /// Which side of the action ran.
    pub side: Side,
    /// What stage of execution this event reports.
    pub step: Step,
    /// A snapshot of the relevant `ReferenceMap` at the time of the event,
    /// or `None` when no state is meaningfully attached (e.g. `Starting`).
    pub state: Option<serde_json::Map<String, serde_json::Value>>,
    /// Set when this event reports the *reverse* of a named forward action
    /// running as part of rollback (so a streamer can correlate the two).
    pub rollback_of: Option<String>,
    /// Present on [`Step::Failed`]: the error message of the exception that
    /// aborted execution.
    pub exception: Option<String>,
}

/// What stage of an action's lifecycle an [`Event`] reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// The callable is about to run.
    Starting,
    /// The callable returned successfully.
    Succeeded,
    /// The callable raised; [`Event::exception`] carries the message.
    Failed,
    /// `simulate()` advanced state without invoking the callable (§4.3.2).
    Simulated,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Starting => "starting",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Simulated => "simulated",
        };
        f.write_str(s)
    }
}

/// Receives structured [`Event`]s as actions and pipelines execute.
///
/// Implementations are not expected to be fallible in the common case —
/// `receive` has no return value, matching `pysyphe.streamers.InfoStreamer`,
/// whose base class methods are all no-ops. A streamer that wants to surface
/// its own failures (e.g. a network sink) should swallow and log them
/// internally rather than aborting the pipeline it is observing.
pub trait InfoStreamer {
    /// Handle one reported event.
    fn receive(&self, event: &Event);
}

/// A streamer that discards every event. The default for actions and
/// pipelines that have not had `set_streamer` called on them.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullStreamer;

impl InfoStreamer for NullStreamer {
    fn receive(&self, _event: &Event) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[derive(Default)]
    struct Collector(RefCell<Vec<Event>>);

    impl InfoStreamer for Collector {
        fn receive(&self, event: &Event) {
            self.0.borrow_mut().push(event.clone());
        }
    }

    #[test]
    fn null_streamer_discards() {
        let s = NullStreamer;
        s.receive(&Event {
            action_name: "a".into(),
            side: Side::Action,
            step: Step::Starting,
            state: None,
            rollback_of: None,
            exception: None,
        });
    }

    #[test]
    fn collector_records_events() {
        let c = Collector::default();
        c.receive(&Event {
            action_name: "a".into(),
            side: Side::Rollback,
            step: Step::Failed,
            state: None,
            rollback_of: Some("a".into()),
            exception: Some("boom".into()),
        });
        let recorded = c.0.borrow();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].step, Step::Failed);
        assert_eq!(recorded[0].rollback_of.as_deref(), Some("a"));
    }
}
