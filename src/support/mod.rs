//! Small, single-purpose containers used internally by [`Channel`](crate::Channel).
//!
//! Neither container synchronizes its own access; both are only ever touched while the owning
//! channel's lock is held.

mod fixed_queue;
mod list;

pub use fixed_queue::FixedQueue;
pub use list::List;
