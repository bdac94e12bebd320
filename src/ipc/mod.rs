//! Inter-task communication primitives.

pub mod channels;
pub mod event_group;
pub mod queue;
pub mod semaphore;

pub use channels::Channels;
pub use event_group::{EventBits, EventGroup};
pub use queue::Queue;
pub use semaphore::BinarySemaphore;
