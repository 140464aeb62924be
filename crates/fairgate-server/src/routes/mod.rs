mod admin;
mod health;
mod queue;

pub use admin::{dequeue, list_queues};
pub use health::{health, metrics};
pub use queue::enqueue;
