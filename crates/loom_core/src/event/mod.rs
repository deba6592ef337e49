mod queue;

pub use queue::{EventIter, EventQueue, ListenerResult, QueueStats, QueuedEvent, Subscription};
