use crate::ecs::{ComponentSet, SystemDescriptor, SystemId, SystemRegistrationError, System};
use std::collections::HashMap;

/// Observable lifecycle state of a registered system.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum SystemState {
    Inactive,
    Active,
    /// Terminal. The hook object has been dropped.
    Destroyed,
}

impl SystemState {
    pub fn is_active(self) -> bool {
        self == SystemState::Active
    }

    pub fn is_destroyed(self) -> bool {
        self == SystemState::Destroyed
    }
}

pub(crate) struct SystemSlot {
    pub descriptor: SystemDescriptor,
    pub state: SystemState,
    /// `None` while a hook is running (taken out by the World) or once
    /// destroyed.
    pub system: Option<Box<dyn System>>,
}

pub(crate) struct SystemRegistry {
    slots: HashMap<SystemId, SystemSlot>,
    order: ComponentSet<SystemId>,
    name_lookup: HashMap<String, SystemId>,
}

impl SystemRegistry {
    pub fn new() -> Self {
        Self {
            slots: HashMap::new(),
            order: ComponentSet::new(),
            name_lookup: HashMap::new(),
        }
    }

    pub fn register(
        &mut self,
        system: Box<dyn System>,
    ) -> Result<SystemId, SystemRegistrationError> {
        let descriptor = system.descriptor();
        if descriptor.is_empty() {
            return Err(SystemRegistrationError::NoHooks {
                name: descriptor.name().to_string(),
            });
        }

        let name_key = descriptor.name().to_string();
        if self.name_lookup.contains_key(&name_key) {
            return Err(SystemRegistrationError::DuplicateName { name: name_key });
        }

        let id = SystemId::next();
        self.name_lookup.insert(name_key, id);
        self.order.add(id);
        self.slots.insert(
            id,
            SystemSlot {
                descriptor,
                state: SystemState::Inactive,
                system: Some(system),
            },
        );

        Ok(id)
    }

    /// Leave a tombstone behind: the state stays observable, the name is
    /// released and the hook object is returned for dropping.
    pub fn retire(&mut self, id: SystemId) -> Option<Box<dyn System>> {
        let slot = self.slots.get_mut(&id)?;
        slot.state = SystemState::Destroyed;
        self.order.delete(&id);
        self.name_lookup.remove(slot.descriptor.name());
        slot.system.take()
    }

    pub fn slot(&self, id: SystemId) -> Option<&SystemSlot> {
        self.slots.get(&id)
    }

    pub fn slot_mut(&mut self, id: SystemId) -> Option<&mut SystemSlot> {
        self.slots.get_mut(&id)
    }

    pub fn state(&self, id: SystemId) -> Option<SystemState> {
        self.slots.get(&id).map(|slot| slot.state)
    }

    pub fn descriptor(&self, id: SystemId) -> Option<&SystemDescriptor> {
        self.slots.get(&id).map(|slot| &slot.descriptor)
    }

    pub fn lookup(&self, name: &str) -> Option<SystemId> {
        self.name_lookup.get(name).copied()
    }

    /// Live (non-destroyed) systems in registration order.
    pub fn ordered(&self) -> impl Iterator<Item = SystemId> + '_ {
        self.order.iter().copied()
    }

    pub fn live_count(&self) -> usize {
        self.order.len()
    }
}
