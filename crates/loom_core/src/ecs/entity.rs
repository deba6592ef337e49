//! Entity handle with generational index
//!
//! Entities are lightweight handles (8 bytes) that key component data in the
//! World. The generation counter prevents a stale handle from aliasing a
//! recycled slot.

use std::fmt;

/// Entity handle (generation-indexed for safety)
///
/// Format: [32-bit index | 32-bit generation]
/// - Index: Slot in the World's entity table
/// - Generation: Incremented on despawn (prevents use-after-free)
///
/// Example:
/// ```ignore
/// let entity = world.spawn();
/// world.despawn(entity);
/// assert!(!world.is_alive(entity)); // generation mismatch
/// ```
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Entity {
    index: u32,
    generation: u32,
}

impl Entity {
    pub(crate) const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Serialize to 64-bit integer (for worker messages/save files)
    pub fn to_bits(&self) -> u64 {
        ((self.generation as u64) << 32) | (self.index as u64)
    }

    /// Deserialize from 64-bit integer
    pub fn from_bits(bits: u64) -> Self {
        Self {
            index: bits as u32,
            generation: (bits >> 32) as u32,
        }
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

/// Slot table handing out entity handles with free-list reuse.
#[derive(Debug, Default)]
pub(crate) struct EntityAllocator {
    generations: Vec<u32>,
    alive: Vec<bool>,
    free: Vec<u32>,
    live_count: usize,
}

impl EntityAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&mut self) -> Entity {
        self.live_count += 1;
        if let Some(index) = self.free.pop() {
            let slot = index as usize;
            self.alive[slot] = true;
            return Entity::new(index, self.generations[slot]);
        }

        let index = self.generations.len() as u32;
        self.generations.push(0);
        self.alive.push(true);
        Entity::new(index, 0)
    }

    /// Release `entity`; returns false for dead or stale handles.
    pub fn free(&mut self, entity: Entity) -> bool {
        if !self.is_alive(entity) {
            return false;
        }
        let slot = entity.index as usize;
        self.alive[slot] = false;
        self.generations[slot] = self.generations[slot].wrapping_add(1);
        self.free.push(entity.index);
        self.live_count -= 1;
        true
    }

    pub fn is_alive(&self, entity: Entity) -> bool {
        let slot = entity.index as usize;
        slot < self.alive.len()
            && self.alive[slot]
            && self.generations[slot] == entity.generation
    }

    pub fn live_count(&self) -> usize {
        self.live_count
    }
}
