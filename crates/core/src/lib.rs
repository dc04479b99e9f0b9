//! Shared foundations for Capstan: reference maps, the `InfoStreamer` port,
//! the `ActionLike`/`Hook` contracts, and the error taxonomy they all raise.
//!
//! This crate has no notion of "forward" and "reverse" callables or of
//! pipelines and transactions — those live in `capstan-action`,
//! `capstan-pipeline`, and `capstan-txn` respectively. What lives here is
//! only what those three crates need from each other without depending on
//! one another directly.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod action_like;
mod error;
mod reference_map;
mod streamer;

pub use action_like::{ActionLike, Hook, HookChain, HookResult, Side};
pub use error::{Error, Result};
pub use reference_map::{ReferenceMap, StateValue};
pub use streamer::{Event, InfoStreamer, NullStreamer, Step};
