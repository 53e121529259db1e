//! Batched persistence with cooperative cancellation.

pub mod batch;
pub mod probe;

pub use batch::{element_id, BatchFailure, BatchPersister, BatchReport, ItemError};
pub use probe::{CancelProbe, CancelReason};
