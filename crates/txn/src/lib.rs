//! Two-phase-commit coordination of heterogeneous transaction handlers,
//! one of which is typically a [`capstan_pipeline::ActionPipeline`] wrapped
//! in a [`PipelineTransactionHandler`] (§4.6, §4.7, §4.8).

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod handler;
mod manager;

pub use error::{HandlerError, TransactionError};
pub use handler::{PipelineTransactionHandler, TransactionHandler};
pub use manager::TransactionsManager;
