pub mod events;
pub mod queue;

pub use events::{ChatType, InboundMessage};
pub use queue::MessageBus;
