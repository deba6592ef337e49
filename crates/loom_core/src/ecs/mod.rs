//! Entity/component world and the system lifecycle scheduler

pub mod component;
mod component_set;
mod context;
mod entity;
mod system;
mod system_descriptor;
mod system_error;
mod system_handle;
mod system_registration_error;
mod system_registry;
mod world;

pub use component::{Component, ComponentError, ComponentId, ComponentMeta};
pub use component_set::{ComponentSet, Iter as ComponentSetIter};
pub use context::WorldContext;
pub use entity::Entity;
pub use system::{HookResult, HookSet, System};
pub use system_descriptor::SystemDescriptor;
pub use system_error::{HookError, SystemError, WorldError};
pub use system_handle::SystemId;
pub use system_registration_error::SystemRegistrationError;
pub use system_registry::SystemState;
pub use world::{TickReport, World};
