//! World state visible to system hooks
//!
//! Everything a hook may touch lives here: entities, component columns,
//! resources, the event queue and the clock. Structural changes are recorded
//! as membership changes and announced by the World once the running hook has
//! returned. Lifecycle requests are likewise deferred.

use crate::ecs::component::{Component, ComponentError, ComponentId};
use crate::ecs::entity::EntityAllocator;
use crate::ecs::system::HookCall;
use crate::ecs::{ComponentSet, Entity, SystemId};
use crate::event::EventQueue;
use crate::time::SimulationClock;
use std::any::{Any, TypeId};
use std::collections::{BTreeMap, HashMap};

type Column = BTreeMap<Entity, Box<dyn Any>>;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum MembershipChange {
    EntityAdded(Entity),
    EntityRemoved(Entity),
    ComponentAdded(Entity, ComponentId),
    ComponentRemoved(Entity, ComponentId),
}

impl MembershipChange {
    pub fn component(&self) -> Option<ComponentId> {
        match self {
            MembershipChange::ComponentAdded(_, id) | MembershipChange::ComponentRemoved(_, id) => {
                Some(*id)
            }
            _ => None,
        }
    }

    pub fn hook_call(self) -> HookCall {
        match self {
            MembershipChange::EntityAdded(entity) => HookCall::EntityAdded(entity),
            MembershipChange::EntityRemoved(entity) => HookCall::EntityRemoved(entity),
            MembershipChange::ComponentAdded(entity, id) => HookCall::ComponentAdded(entity, id),
            MembershipChange::ComponentRemoved(entity, id) => {
                HookCall::ComponentRemoved(entity, id)
            }
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum LifecycleCommand {
    Start(SystemId),
    Stop(SystemId),
    Destroy(SystemId),
}

pub struct WorldContext {
    entities: EntityAllocator,
    live: ComponentSet<Entity>,
    components: BTreeMap<ComponentId, Column>,
    resources: HashMap<TypeId, Box<dyn Any>>,
    events: EventQueue,
    clock: SimulationClock,
    changes: Vec<MembershipChange>,
    commands: Vec<LifecycleCommand>,
    current: Option<SystemId>,
}

impl WorldContext {
    pub(crate) fn new() -> Self {
        Self {
            entities: EntityAllocator::new(),
            live: ComponentSet::new(),
            components: BTreeMap::new(),
            resources: HashMap::new(),
            events: EventQueue::new(),
            clock: SimulationClock::new(),
            changes: Vec::new(),
            commands: Vec::new(),
            current: None,
        }
    }

    // ------------------------------------------------------------------
    // Entities
    // ------------------------------------------------------------------

    pub fn spawn(&mut self) -> Entity {
        let entity = self.entities.allocate();
        self.live.add(entity);
        self.changes.push(MembershipChange::EntityAdded(entity));
        entity
    }

    /// Remove `entity` and all of its components. Component removals are
    /// announced before the entity removal, in component id order.
    pub fn despawn(&mut self, entity: Entity) -> bool {
        if !self.entities.is_alive(entity) {
            return false;
        }

        for (&id, column) in self.components.iter_mut() {
            if column.remove(&entity).is_some() {
                self.changes
                    .push(MembershipChange::ComponentRemoved(entity, id));
            }
        }

        self.live.delete(&entity);
        self.entities.free(entity);
        self.changes.push(MembershipChange::EntityRemoved(entity));
        true
    }

    pub fn is_alive(&self, entity: Entity) -> bool {
        self.entities.is_alive(entity)
    }

    /// Live entities, oldest first.
    pub fn entities(&self) -> impl Iterator<Item = Entity> + '_ {
        self.live.iter().copied()
    }

    pub fn entity_count(&self) -> usize {
        self.entities.live_count()
    }

    // ------------------------------------------------------------------
    // Components
    // ------------------------------------------------------------------

    /// Attach `value` to `entity`, returning the value it replaced. Only a
    /// first insert counts as a membership change.
    pub fn insert<C: Component>(
        &mut self,
        entity: Entity,
        value: C,
    ) -> Result<Option<C>, ComponentError> {
        if !self.entities.is_alive(entity) {
            return Err(ComponentError::DeadEntity { entity });
        }
        if !self.components.contains_key(&C::ID) {
            C::ensure_registered()?;
        }

        let column = self.components.entry(C::ID).or_default();
        match column.insert(entity, Box::new(value)) {
            Some(previous) => Ok(previous.downcast::<C>().ok().map(|boxed| *boxed)),
            None => {
                self.changes
                    .push(MembershipChange::ComponentAdded(entity, C::ID));
                Ok(None)
            }
        }
    }

    pub fn remove<C: Component>(&mut self, entity: Entity) -> Option<C> {
        let removed = self.components.get_mut(&C::ID)?.remove(&entity)?;
        self.changes
            .push(MembershipChange::ComponentRemoved(entity, C::ID));
        removed.downcast::<C>().ok().map(|boxed| *boxed)
    }

    pub fn get<C: Component>(&self, entity: Entity) -> Option<&C> {
        self.components
            .get(&C::ID)?
            .get(&entity)?
            .downcast_ref::<C>()
    }

    pub fn get_mut<C: Component>(&mut self, entity: Entity) -> Option<&mut C> {
        self.components
            .get_mut(&C::ID)?
            .get_mut(&entity)?
            .downcast_mut::<C>()
    }

    pub fn has<C: Component>(&self, entity: Entity) -> bool {
        self.has_component(entity, C::ID)
    }

    pub fn has_component(&self, entity: Entity, component: ComponentId) -> bool {
        self.components
            .get(&component)
            .is_some_and(|column| column.contains_key(&entity))
    }

    /// Component ids currently attached to `entity`, ascending.
    pub fn components_of(&self, entity: Entity) -> Vec<ComponentId> {
        self.components
            .iter()
            .filter(|(_, column)| column.contains_key(&entity))
            .map(|(&id, _)| id)
            .collect()
    }

    /// Entities holding `C`, in entity order.
    pub fn query<C: Component>(&self) -> impl Iterator<Item = (Entity, &C)> + '_ {
        self.components
            .get(&C::ID)
            .into_iter()
            .flat_map(|column| column.iter())
            .filter_map(|(&entity, value)| value.downcast_ref::<C>().map(|c| (entity, c)))
    }

    pub fn for_each_mut<C: Component>(&mut self, mut f: impl FnMut(Entity, &mut C)) {
        let Some(column) = self.components.get_mut(&C::ID) else {
            return;
        };
        for (&entity, value) in column.iter_mut() {
            if let Some(component) = value.downcast_mut::<C>() {
                f(entity, component);
            }
        }
    }

    // ------------------------------------------------------------------
    // Resources
    // ------------------------------------------------------------------

    pub fn insert_resource<R: 'static>(&mut self, resource: R) -> Option<R> {
        self.resources
            .insert(TypeId::of::<R>(), Box::new(resource))
            .and_then(|previous| previous.downcast::<R>().ok())
            .map(|boxed| *boxed)
    }

    pub fn remove_resource<R: 'static>(&mut self) -> Option<R> {
        self.resources
            .remove(&TypeId::of::<R>())
            .and_then(|previous| previous.downcast::<R>().ok())
            .map(|boxed| *boxed)
    }

    pub fn resource<R: 'static>(&self) -> Option<&R> {
        self.resources.get(&TypeId::of::<R>())?.downcast_ref::<R>()
    }

    pub fn resource_mut<R: 'static>(&mut self) -> Option<&mut R> {
        self.resources.get_mut(&TypeId::of::<R>())?.downcast_mut::<R>()
    }

    // ------------------------------------------------------------------
    // Events, time, lifecycle requests
    // ------------------------------------------------------------------

    /// The world's event queue, dispatched at the end of every tick.
    pub fn events(&self) -> &EventQueue {
        &self.events
    }

    pub fn clock(&self) -> &SimulationClock {
        &self.clock
    }

    /// The system whose hook is currently running.
    pub fn current_system(&self) -> Option<SystemId> {
        self.current
    }

    /// Request activation once the running hook returns.
    pub fn start_system(&mut self, id: SystemId) {
        self.commands.push(LifecycleCommand::Start(id));
    }

    /// Request deactivation once the running hook returns.
    pub fn stop_system(&mut self, id: SystemId) {
        self.commands.push(LifecycleCommand::Stop(id));
    }

    /// Request destruction once the running hook returns.
    pub fn destroy_system(&mut self, id: SystemId) {
        self.commands.push(LifecycleCommand::Destroy(id));
    }

    // ------------------------------------------------------------------
    // World plumbing
    // ------------------------------------------------------------------

    pub(crate) fn clock_mut(&mut self) -> &mut SimulationClock {
        &mut self.clock
    }

    pub(crate) fn take_changes(&mut self) -> Vec<MembershipChange> {
        std::mem::take(&mut self.changes)
    }

    pub(crate) fn take_commands(&mut self) -> Vec<LifecycleCommand> {
        std::mem::take(&mut self.commands)
    }

    pub(crate) fn set_current(&mut self, id: Option<SystemId>) -> Option<SystemId> {
        std::mem::replace(&mut self.current, id)
    }
}
