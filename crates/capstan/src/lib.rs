//! # Capstan
//!
//! A library for composing reversible, stateful operations into pipelines,
//! and for coordinating several such pipelines (or other transactional
//! resources) under a two-phase-commit protocol.
//!
//! Capstan itself re-exports the four lower crates that do the actual work:
//!
//! - [`capstan_core`] — [`ReferenceMap`], the [`InfoStreamer`] port, and the
//!   [`ActionLike`]/[`Hook`] contracts everything else is built on.
//! - [`capstan_action`] — [`Action`], [`StatefulAction`], [`UnitAction`]:
//!   reversible units of work with per-instance state.
//! - [`capstan_pipeline`] — [`ActionPipeline`]: ordered sequencing, partial
//!   rollback, and crash-resume simulation.
//! - [`capstan_txn`] — [`TransactionHandler`], [`PipelineTransactionHandler`],
//!   [`TransactionsManager`]: the 2PC coordinator.
//!
//! ## Example
//!
//! ```
//! use capstan::prelude::*;
//!
//! let reverse_text = StatefulAction::new(
//!     "reverse_text",
//!     "noop",
//!     |state: &ReferenceMap| {
//!         let text = state.get("text")?.as_str().unwrap().to_string();
//!         state.set("reverse_text", text.chars().rev().collect::<String>());
//!         Ok(())
//!     },
//!     vec!["text"],
//!     Vec::<&str>::new(),
//! );
//!
//! let prepared = reverse_text.prepare(vec![("text", StateValue::from("YOLO"))]).unwrap();
//! let pipeline = ActionPipeline::new(false);
//! pipeline.append(prepared.clone());
//! pipeline.execute().unwrap();
//! assert_eq!(prepared.state().unwrap().get("reverse_text").unwrap(), serde_json::json!("OLOY"));
//! pipeline.undo().unwrap();
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub use capstan_action::{Action, Callable, StatefulAction, UnitAction};
pub use capstan_core::{
    ActionLike, Error as CoreError, Event, Hook, HookChain, HookResult, InfoStreamer, NullStreamer,
    ReferenceMap, Result as CoreResult, Side, StateValue, Step,
};
pub use capstan_pipeline::{ActionPipeline, LogEntry, ReversibleCursor, StepOutcome};
pub use capstan_txn::{
    HandlerError, PipelineTransactionHandler, TransactionError, TransactionHandler,
    TransactionsManager,
};

/// The types and traits most applications reach for. `use capstan::prelude::*;`
/// pulls in everything needed to build and run a pipeline under 2PC without
/// naming each lower crate individually.
pub mod prelude {
    pub use crate::{
        Action, ActionLike, ActionPipeline, CoreError, CoreResult, Event, Hook, HookChain,
        InfoStreamer, LogEntry, NullStreamer, PipelineTransactionHandler, ReferenceMap, Side,
        StatefulAction, StateValue, Step, TransactionError, TransactionHandler,
        TransactionsManager, UnitAction,
    };
}
