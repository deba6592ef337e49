//! System lifecycle contract
//!
//! A system is a unit of simulation logic owned by a World. Every hook has a
//! default no-op body; a system overrides the ones it needs and declares them
//! in its [`SystemDescriptor`]. The World only ever calls declared hooks.

use crate::ecs::{ComponentId, Entity, HookError, SystemDescriptor, WorldContext};
use std::fmt;
use std::ops::BitOr;

/// Outcome of a single hook invocation.
pub type HookResult = Result<(), HookError>;

/// Bitset of the hooks a system implements.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Default)]
pub struct HookSet(u8);

impl HookSet {
    pub const NONE: Self = Self(0);
    pub const START: Self = Self(1 << 0);
    pub const UPDATE: Self = Self(1 << 1);
    pub const STOP: Self = Self(1 << 2);
    pub const ENTITY_ADDED: Self = Self(1 << 3);
    pub const ENTITY_REMOVED: Self = Self(1 << 4);
    pub const COMPONENT_ADDED: Self = Self(1 << 5);
    pub const COMPONENT_REMOVED: Self = Self(1 << 6);

    /// start + update + stop
    pub const LIFECYCLE: Self = Self(Self::START.0 | Self::UPDATE.0 | Self::STOP.0);
    pub const ALL: Self = Self(0x7f);

    const NAMES: [(Self, &'static str); 7] = [
        (Self::START, "start"),
        (Self::UPDATE, "update"),
        (Self::STOP, "stop"),
        (Self::ENTITY_ADDED, "entity_added"),
        (Self::ENTITY_REMOVED, "entity_removed"),
        (Self::COMPONENT_ADDED, "component_added"),
        (Self::COMPONENT_REMOVED, "component_removed"),
    ];

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for HookSet {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl fmt::Debug for HookSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = Self::NAMES
            .iter()
            .filter(|(hook, _)| self.contains(*hook))
            .map(|(_, name)| *name);
        f.debug_set().entries(names).finish()
    }
}

/// Simulation unit driven by a World.
///
/// Hooks receive the [`WorldContext`]; structural changes made through it are
/// announced to other systems once the running hook returns.
///
/// ```ignore
/// struct Gravity;
///
/// impl System for Gravity {
///     fn descriptor(&self) -> SystemDescriptor {
///         SystemDescriptor::new("gravity").with_hooks(HookSet::UPDATE)
///     }
///
///     fn on_update(&mut self, ctx: &mut WorldContext, delta: f64, _elapsed: f64) -> HookResult {
///         ctx.for_each_mut::<Velocity>(|_, v| v.y -= 9.8 * delta as f32);
///         Ok(())
///     }
/// }
/// ```
#[allow(unused_variables)]
pub trait System: 'static {
    /// Name, declared hooks and watched components. Read once at registration.
    fn descriptor(&self) -> SystemDescriptor;

    fn on_start(&mut self, ctx: &mut WorldContext) -> HookResult {
        Ok(())
    }

    /// Called once per tick while active. `delta` is the tick length and
    /// `elapsed` the total simulated time, both in seconds.
    fn on_update(&mut self, ctx: &mut WorldContext, delta: f64, elapsed: f64) -> HookResult {
        Ok(())
    }

    fn on_stop(&mut self, ctx: &mut WorldContext) -> HookResult {
        Ok(())
    }

    fn on_entity_added(&mut self, ctx: &mut WorldContext, entity: Entity) -> HookResult {
        Ok(())
    }

    fn on_entity_removed(&mut self, ctx: &mut WorldContext, entity: Entity) -> HookResult {
        Ok(())
    }

    fn on_component_added(
        &mut self,
        ctx: &mut WorldContext,
        entity: Entity,
        component: ComponentId,
    ) -> HookResult {
        Ok(())
    }

    fn on_component_removed(
        &mut self,
        ctx: &mut WorldContext,
        entity: Entity,
        component: ComponentId,
    ) -> HookResult {
        Ok(())
    }
}

/// A single pending hook invocation.
#[derive(Copy, Clone, Debug, PartialEq)]
pub(crate) enum HookCall {
    Start,
    Update { delta: f64, elapsed: f64 },
    Stop,
    EntityAdded(Entity),
    EntityRemoved(Entity),
    ComponentAdded(Entity, ComponentId),
    ComponentRemoved(Entity, ComponentId),
}

impl HookCall {
    pub fn hook(&self) -> HookSet {
        match self {
            HookCall::Start => HookSet::START,
            HookCall::Update { .. } => HookSet::UPDATE,
            HookCall::Stop => HookSet::STOP,
            HookCall::EntityAdded(_) => HookSet::ENTITY_ADDED,
            HookCall::EntityRemoved(_) => HookSet::ENTITY_REMOVED,
            HookCall::ComponentAdded(..) => HookSet::COMPONENT_ADDED,
            HookCall::ComponentRemoved(..) => HookSet::COMPONENT_REMOVED,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            HookCall::Start => "on_start",
            HookCall::Update { .. } => "on_update",
            HookCall::Stop => "on_stop",
            HookCall::EntityAdded(_) => "on_entity_added",
            HookCall::EntityRemoved(_) => "on_entity_removed",
            HookCall::ComponentAdded(..) => "on_component_added",
            HookCall::ComponentRemoved(..) => "on_component_removed",
        }
    }

    pub fn invoke(self, system: &mut dyn System, ctx: &mut WorldContext) -> HookResult {
        match self {
            HookCall::Start => system.on_start(ctx),
            HookCall::Update { delta, elapsed } => system.on_update(ctx, delta, elapsed),
            HookCall::Stop => system.on_stop(ctx),
            HookCall::EntityAdded(entity) => system.on_entity_added(ctx, entity),
            HookCall::EntityRemoved(entity) => system.on_entity_removed(ctx, entity),
            HookCall::ComponentAdded(entity, component) => {
                system.on_component_added(ctx, entity, component)
            }
            HookCall::ComponentRemoved(entity, component) => {
                system.on_component_removed(ctx, entity, component)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hook_set_algebra() {
        let hooks = HookSet::START | HookSet::ENTITY_ADDED;
        assert!(hooks.contains(HookSet::START));
        assert!(!hooks.contains(HookSet::UPDATE));
        assert!(HookSet::ALL.contains(HookSet::LIFECYCLE));
        assert!(HookSet::NONE.is_empty());
        assert_eq!(format!("{:?}", hooks), r#"{"start", "entity_added"}"#);
    }

    #[test]
    fn test_hook_call_maps_to_declared_bit() {
        let entity = Entity::new(0, 0);
        assert_eq!(HookCall::EntityRemoved(entity).hook(), HookSet::ENTITY_REMOVED);
        assert_eq!(
            HookCall::Update { delta: 0.1, elapsed: 0.1 }.hook(),
            HookSet::UPDATE
        );
        assert_eq!(HookCall::ComponentAdded(entity, 3).name(), "on_component_added");
    }
}
