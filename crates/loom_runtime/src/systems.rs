//! Demo simulation: particles that drift out of an arena and score points

use loom_core::define_component;
use loom_core::ecs::{
    Component, ComponentId, Entity, HookResult, HookSet, System, SystemDescriptor, WorldContext,
};
use std::cell::RefCell;
use std::rc::Rc;

pub const ARENA_HALF_EXTENT: f32 = 50.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}
define_component!(Position, 1, "Position");

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Velocity {
    pub dx: f32,
    pub dy: f32,
}
define_component!(Velocity, 2, "Velocity");

/// Emitted when a particle leaves the arena.
#[derive(Debug, Clone, Copy)]
pub struct LeftArena {
    pub entity: Entity,
    pub distance: f32,
}

/// Membership totals kept up to date by [`Census`].
#[derive(Debug, Default, Clone, Copy)]
pub struct CensusCounts {
    pub spawned: u64,
    pub despawned: u64,
    pub moving: u64,
}

/// Integrates velocity into position and reports escapes.
pub struct Movement;

impl System for Movement {
    fn descriptor(&self) -> SystemDescriptor {
        SystemDescriptor::new("movement").with_hooks(HookSet::UPDATE)
    }

    fn on_update(&mut self, ctx: &mut WorldContext, delta: f64, _elapsed: f64) -> HookResult {
        let delta = delta as f32;
        let velocities: Vec<(Entity, Velocity)> =
            ctx.query::<Velocity>().map(|(entity, v)| (entity, *v)).collect();

        for (entity, velocity) in velocities {
            let Some(position) = ctx.get_mut::<Position>(entity) else {
                continue;
            };
            position.x += velocity.dx * delta;
            position.y += velocity.dy * delta;

            let distance = position.x.abs().max(position.y.abs());
            if distance > ARENA_HALF_EXTENT {
                ctx.events().push(LeftArena { entity, distance });
            }
        }
        Ok(())
    }
}

/// Spawns a particle every `interval` ticks until `limit` are alive.
pub struct Spawner {
    interval: u64,
    limit: usize,
    seed: u32,
}

impl Spawner {
    pub fn new(interval: u64, limit: usize) -> Self {
        Self {
            interval: interval.max(1),
            limit,
            seed: 0x9e37_79b9,
        }
    }

    /// xorshift32; good enough for scattering demo particles.
    fn next_unit(&mut self) -> f32 {
        self.seed ^= self.seed << 13;
        self.seed ^= self.seed >> 17;
        self.seed ^= self.seed << 5;
        (self.seed as f32 / u32::MAX as f32) * 2.0 - 1.0
    }

    fn spawn_particle(&mut self, ctx: &mut WorldContext) -> HookResult {
        let entity = ctx.spawn();
        ctx.insert(entity, Position { x: 0.0, y: 0.0 })?;
        let velocity = Velocity {
            dx: self.next_unit() * 20.0,
            dy: self.next_unit() * 20.0,
        };
        ctx.insert(entity, velocity)?;
        Ok(())
    }
}

impl System for Spawner {
    fn descriptor(&self) -> SystemDescriptor {
        SystemDescriptor::new("spawner").with_hooks(HookSet::START | HookSet::UPDATE)
    }

    fn on_start(&mut self, ctx: &mut WorldContext) -> HookResult {
        self.spawn_particle(ctx)
    }

    fn on_update(&mut self, ctx: &mut WorldContext, _delta: f64, _elapsed: f64) -> HookResult {
        let tick = ctx.clock().tick_count();
        if tick % self.interval == 0 && ctx.entity_count() < self.limit {
            self.spawn_particle(ctx)?;
        }
        Ok(())
    }
}

/// Tracks entity membership in a [`CensusCounts`] resource.
pub struct Census;

impl System for Census {
    fn descriptor(&self) -> SystemDescriptor {
        SystemDescriptor::new("census")
            .with_hooks(
                HookSet::START
                    | HookSet::ENTITY_ADDED
                    | HookSet::ENTITY_REMOVED
                    | HookSet::COMPONENT_ADDED
                    | HookSet::COMPONENT_REMOVED,
            )
            .watching([Velocity::ID])
    }

    fn on_start(&mut self, ctx: &mut WorldContext) -> HookResult {
        ctx.insert_resource(CensusCounts::default());
        Ok(())
    }

    fn on_entity_added(&mut self, ctx: &mut WorldContext, _entity: Entity) -> HookResult {
        counts(ctx)?.spawned += 1;
        Ok(())
    }

    fn on_entity_removed(&mut self, ctx: &mut WorldContext, _entity: Entity) -> HookResult {
        counts(ctx)?.despawned += 1;
        Ok(())
    }

    fn on_component_added(
        &mut self,
        ctx: &mut WorldContext,
        _entity: Entity,
        _component: ComponentId,
    ) -> HookResult {
        counts(ctx)?.moving += 1;
        Ok(())
    }

    fn on_component_removed(
        &mut self,
        ctx: &mut WorldContext,
        _entity: Entity,
        _component: ComponentId,
    ) -> HookResult {
        let counts = counts(ctx)?;
        counts.moving = counts.moving.saturating_sub(1);
        Ok(())
    }
}

fn counts(ctx: &mut WorldContext) -> Result<&mut CensusCounts, &'static str> {
    ctx.resource_mut::<CensusCounts>()
        .ok_or("census resource missing")
}

/// Removes escaped particles on the next tick and awards points for each one
/// actually removed. A particle reported again before its removal scores once.
pub struct Scoring {
    score: Rc<RefCell<f64>>,
    escaped: Rc<RefCell<Vec<(Entity, f32)>>>,
}

impl Scoring {
    pub fn new(score: Rc<RefCell<f64>>) -> Self {
        Self {
            score,
            escaped: Rc::new(RefCell::new(Vec::new())),
        }
    }
}

impl System for Scoring {
    fn descriptor(&self) -> SystemDescriptor {
        SystemDescriptor::new("scoring").with_hooks(HookSet::START | HookSet::UPDATE)
    }

    fn on_start(&mut self, ctx: &mut WorldContext) -> HookResult {
        let escaped = Rc::clone(&self.escaped);
        ctx.events().subscribe(move |event: &LeftArena| {
            escaped.borrow_mut().push((event.entity, event.distance));
            Ok(())
        });
        Ok(())
    }

    fn on_update(&mut self, ctx: &mut WorldContext, _delta: f64, _elapsed: f64) -> HookResult {
        let escaped = std::mem::take(&mut *self.escaped.borrow_mut());
        for (entity, distance) in escaped {
            if ctx.despawn(entity) {
                *self.score.borrow_mut() +=
                    f64::from(distance - ARENA_HALF_EXTENT).max(0.0) + 1.0;
            }
        }
        Ok(())
    }
}
