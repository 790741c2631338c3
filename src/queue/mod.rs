//! Delivery queue: state machine, storage contract, dispatch worker.

pub mod state;
pub mod store;
pub mod worker;

pub use state::{RetryPolicy, Transition, TransitionError, is_claimable};
pub use store::{JobFilter, JobStore, MemoryJobStore, MemoryTemplateStore};
pub use worker::{DispatchWorker, PassSummary};
