//! Request/poll ("202 pattern") operations

pub mod backoff;
pub mod job;
pub mod poller;

pub use backoff::{Backoff, PollPolicy};
pub use job::JobHandle;
pub use poller::JobPoller;
