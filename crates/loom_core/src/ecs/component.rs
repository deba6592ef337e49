// component.rs - Runtime component registration
//
// Components are identified by u32 IDs rather than Rust TypeIds so that the
// ids can travel in worker messages and membership notifications. The global
// registry rejects two different types claiming the same id.

use crate::ecs::Entity;
use once_cell::sync::Lazy;
use std::any::TypeId;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use thiserror::Error;

pub type ComponentId = u32;

/// Metadata describing a registered component type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ComponentMeta {
    pub id: ComponentId,
    pub name: &'static str,
    pub type_id: TypeId,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ComponentError {
    #[error("component id {id} is already claimed by '{existing}', cannot register '{requested}'")]
    IdConflict {
        id: ComponentId,
        existing: &'static str,
        requested: &'static str,
    },

    #[error("entity {entity} is not alive")]
    DeadEntity { entity: Entity },
}

/// Global registry shared by every World in the process.
static REGISTRY: Lazy<RwLock<HashMap<ComponentId, ComponentMeta>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Register a component's metadata. Re-registering the same type is a no-op.
pub fn register_component(meta: ComponentMeta) -> Result<(), ComponentError> {
    let mut map = REGISTRY.write().unwrap_or_else(PoisonError::into_inner);
    match map.entry(meta.id) {
        Entry::Occupied(existing) if existing.get().type_id != meta.type_id => {
            Err(ComponentError::IdConflict {
                id: meta.id,
                existing: existing.get().name,
                requested: meta.name,
            })
        }
        Entry::Occupied(_) => Ok(()),
        Entry::Vacant(slot) => {
            slot.insert(meta);
            Ok(())
        }
    }
}

/// Look up component metadata by ID.
pub fn meta_of(id: ComponentId) -> Option<ComponentMeta> {
    REGISTRY
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(&id)
        .cloned()
}

/// Human-readable name for diagnostics.
pub fn name_of(id: ComponentId) -> &'static str {
    meta_of(id).map_or("<unregistered>", |meta| meta.name)
}

/// Trait for component types stored in a World.
pub trait Component: 'static + Sized {
    /// Globally unique component ID.
    const ID: ComponentId;

    /// Human-readable name for debugging.
    const NAME: &'static str;

    /// Register this component with the global registry. The World calls
    /// this the first time it stores the type.
    fn ensure_registered() -> Result<(), ComponentError> {
        register_component(ComponentMeta {
            id: Self::ID,
            name: Self::NAME,
            type_id: TypeId::of::<Self>(),
        })
    }
}

/// Helper macro to implement Component trait.
///
/// # Example
/// ```ignore
/// struct Position { x: f32, y: f32 }
///
/// define_component!(Position, 1, "Position");
/// ```
#[macro_export]
macro_rules! define_component {
    ($ty:ty, $id:expr, $name:expr) => {
        impl $crate::ecs::Component for $ty {
            const ID: $crate::ecs::ComponentId = $id;
            const NAME: &'static str = $name;
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Heat(#[allow(dead_code)] f32);
    define_component!(Heat, 9_001, "Heat");

    struct Impostor;
    define_component!(Impostor, 9_001, "Impostor");

    #[test]
    fn test_registration_is_idempotent() {
        assert_eq!(Heat::ensure_registered(), Ok(()));
        assert_eq!(Heat::ensure_registered(), Ok(()));
        assert_eq!(name_of(Heat::ID), "Heat");
    }

    #[test]
    fn test_id_conflict_is_rejected() {
        Heat::ensure_registered().unwrap();
        let err = Impostor::ensure_registered().unwrap_err();
        assert_eq!(
            err,
            ComponentError::IdConflict {
                id: 9_001,
                existing: "Heat",
                requested: "Impostor",
            }
        );
    }

    #[test]
    fn test_unknown_id_has_placeholder_name() {
        assert_eq!(name_of(4_000_000_000), "<unregistered>");
    }
}
