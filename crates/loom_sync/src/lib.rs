//! Loom Sync - Cross-context coordination
//!
//! The only two ways execution contexts (threads) talk to each other:
//! - [`Mutex`] / [`Guarded`]: a lock over one shared memory word
//! - [`WorkerThread`] / [`channel`]: named messages routed to handlers
//!
//! Everything inside a single context (event queue, World) lives in
//! `loom_core` and is not synchronized.

pub mod channel;
mod error;
mod guarded;
pub mod mutex;
mod worker;

pub use channel::{Endpoint, Envelope, Handlers, HandlersBuilder, Outbox, HANDLER_PREFIX};
pub use error::{ChannelError, SyncError};
pub use guarded::{Guarded, GuardedRef};
pub use mutex::{MemorySharing, Mutex, MutexGuard, MutexMode, SharedWord};
pub use worker::WorkerThread;
