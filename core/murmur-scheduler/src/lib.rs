//! Load scheduling for the Murmur media pipeline.
//!
//! [`LoadScheduler`] is the only admission control in the client core: it
//! caps how many loads run at once and collapses concurrent requests for
//! the same key into one.

mod error;
mod scheduler;

pub use error::{SchedulerError, SchedulerResult};
pub use scheduler::LoadScheduler;
