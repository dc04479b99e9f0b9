//! [`ActionPipeline`](pipeline::ActionPipeline): ordered sequencing of
//! [`capstan_core::ActionLike`] steps, forward execution, partial rollback,
//! and crash-resume simulation (§4.5).
//!
//! The reversible [`cursor::ReversibleCursor`] that backs the pipeline's
//! walk is kept in its own module since `simulate_until` drives it directly
//! by position rather than only through `advance`/`retreat`.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod cursor;
mod pipeline;

pub use cursor::{ReversibleCursor, StepOutcome};
pub use pipeline::{ActionPipeline, LogEntry};
