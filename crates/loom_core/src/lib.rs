//! Loom Engine Core
//!
//! Contains the single-context simulation substrate:
//! - Entity/component World with a System lifecycle scheduler
//! - Double-buffered event queue
//! - Ordered membership sets
//! - Deterministic simulation time
//!
//! Cross-context coordination (shared-word mutex, worker channels) lives in
//! `loom_sync`.

pub mod ecs;
pub mod event;
pub mod time;

pub use ecs::{
    ComponentSet, Entity, HookResult, HookSet, System, SystemDescriptor, SystemId, SystemState,
    TickReport, World, WorldContext, WorldError,
};
pub use event::{EventQueue, ListenerResult, Subscription};

/// Engine version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Best-effort text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "<non-string panic payload>"
    }
}
