//! World scheduler
//!
//! Owns the [`WorldContext`] and the system registry, drives the
//! start → update* → stop lifecycle and fans membership changes out to the
//! systems that declared interest. A failing or panicking hook is logged and
//! counted against its system; the rest of the tick carries on.

use crate::ecs::component::{Component, ComponentError};
use crate::ecs::context::{LifecycleCommand, MembershipChange};
use crate::ecs::system::HookCall;
use crate::ecs::system_registry::SystemRegistry;
use crate::ecs::{
    Entity, HookError, HookResult, HookSet, System, SystemDescriptor, SystemError, SystemId,
    SystemRegistrationError, SystemState, WorldContext, WorldError,
};
use crate::event::EventQueue;
use crate::time::SimulationClock;
use loom_metrics::{Counter, HookProfiler, Stopwatch};
use std::panic::{self, AssertUnwindSafe};

/// Upper bound on notification rounds per settle. Systems that keep reacting
/// to each other's changes beyond this are cut off until the next settle.
const MAX_SETTLE_ROUNDS: usize = 64;

/// Summary of one [`World::tick`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub tick: u64,
    /// Systems whose update hook ran.
    pub updated: usize,
    /// Of those, how many failed.
    pub failed: usize,
}

pub struct World {
    ctx: WorldContext,
    registry: SystemRegistry,
    profiler: HookProfiler,
    failures: Counter,
    hook_failures: u64,
    scratch: Vec<SystemId>,
}

impl World {
    pub fn new() -> Self {
        Self {
            ctx: WorldContext::new(),
            registry: SystemRegistry::new(),
            profiler: HookProfiler::new(),
            failures: Counter::new(),
            hook_failures: 0,
            scratch: Vec::new(),
        }
    }

    // ------------------------------------------------------------------
    // Systems
    // ------------------------------------------------------------------

    /// Register `system` in the inactive state.
    pub fn add_system<S: System>(
        &mut self,
        system: S,
    ) -> Result<SystemId, SystemRegistrationError> {
        self.add_boxed_system(Box::new(system))
    }

    pub fn add_boxed_system(
        &mut self,
        system: Box<dyn System>,
    ) -> Result<SystemId, SystemRegistrationError> {
        let id = self.registry.register(system)?;
        if let Some(descriptor) = self.registry.descriptor(id) {
            tracing::debug!(
                system = descriptor.name(),
                %id,
                hooks = ?descriptor.hooks(),
                "system added"
            );
        }
        Ok(id)
    }

    /// Register and immediately start `system`.
    pub fn spawn_system<S: System>(&mut self, system: S) -> Result<SystemId, WorldError> {
        let id = self.add_system(system)?;
        self.start_system(id)?;
        Ok(id)
    }

    /// Activate a system and run its start hook. Starting an active system is
    /// a no-op. If the start hook fails the system stays inactive.
    pub fn start_system(&mut self, id: SystemId) -> Result<(), SystemError> {
        let result = self.start_inner(id);
        self.settle();
        result
    }

    /// Deactivate a system and run its stop hook. Stopping an inactive system
    /// is a no-op.
    pub fn stop_system(&mut self, id: SystemId) -> Result<(), SystemError> {
        let result = self.stop_inner(id);
        self.settle();
        result
    }

    /// Stop (if active) and permanently retire a system. Returns `Ok(false)`
    /// if it was already destroyed.
    pub fn destroy_system(&mut self, id: SystemId) -> Result<bool, SystemError> {
        let result = self.destroy_inner(id);
        self.settle();
        result
    }

    /// Stop every active system, in registration order.
    pub fn stop_all(&mut self) {
        let ids: Vec<_> = self.registry.ordered().collect();
        for id in ids {
            if let Err(err) = self.stop_inner(id) {
                tracing::warn!(%id, error = %err, "failed to stop system");
            }
        }
        self.settle();
    }

    pub fn system_state(&self, id: SystemId) -> Option<SystemState> {
        self.registry.state(id)
    }

    pub fn system_id(&self, name: &str) -> Option<SystemId> {
        self.registry.lookup(name)
    }

    pub fn descriptor(&self, id: SystemId) -> Option<&SystemDescriptor> {
        self.registry.descriptor(id)
    }

    /// Registered systems that have not been destroyed.
    pub fn system_count(&self) -> usize {
        self.registry.live_count()
    }

    // ------------------------------------------------------------------
    // Tick
    // ------------------------------------------------------------------

    /// Advance the clock by `delta` seconds, update every active system in
    /// registration order, then dispatch and clear the event queue.
    pub fn tick(&mut self, delta: f64) -> TickReport {
        let elapsed = self.ctx.clock_mut().advance(delta);
        let mut report = TickReport {
            tick: self.ctx.clock().tick_count(),
            ..TickReport::default()
        };

        let mut order = std::mem::take(&mut self.scratch);
        order.clear();
        order.extend(self.registry.ordered());

        for &id in &order {
            let Some(slot) = self.registry.slot(id) else {
                continue;
            };
            if !slot.state.is_active() || !slot.descriptor.declares(HookSet::UPDATE) {
                continue;
            }

            let watch = Stopwatch::start();
            let outcome = self.invoke(id, HookCall::Update { delta, elapsed });
            if let Some(descriptor) = self.registry.descriptor(id) {
                self.profiler.record(descriptor.name(), watch.elapsed());
            }

            report.updated += 1;
            if outcome.is_err() {
                report.failed += 1;
            }
            self.settle();
        }

        self.scratch = order;
        self.ctx.events().dispatch_and_clear();
        report
    }

    // ------------------------------------------------------------------
    // Entities, components and resources
    // ------------------------------------------------------------------

    pub fn spawn(&mut self) -> Entity {
        let entity = self.ctx.spawn();
        self.settle();
        entity
    }

    pub fn despawn(&mut self, entity: Entity) -> bool {
        let removed = self.ctx.despawn(entity);
        self.settle();
        removed
    }

    pub fn insert<C: Component>(
        &mut self,
        entity: Entity,
        value: C,
    ) -> Result<Option<C>, ComponentError> {
        let previous = self.ctx.insert(entity, value)?;
        self.settle();
        Ok(previous)
    }

    pub fn remove<C: Component>(&mut self, entity: Entity) -> Option<C> {
        let removed = self.ctx.remove::<C>(entity);
        self.settle();
        removed
    }

    pub fn get<C: Component>(&self, entity: Entity) -> Option<&C> {
        self.ctx.get(entity)
    }

    pub fn get_mut<C: Component>(&mut self, entity: Entity) -> Option<&mut C> {
        self.ctx.get_mut(entity)
    }

    pub fn is_alive(&self, entity: Entity) -> bool {
        self.ctx.is_alive(entity)
    }

    pub fn entity_count(&self) -> usize {
        self.ctx.entity_count()
    }

    pub fn insert_resource<R: 'static>(&mut self, resource: R) -> Option<R> {
        self.ctx.insert_resource(resource)
    }

    pub fn resource<R: 'static>(&self) -> Option<&R> {
        self.ctx.resource()
    }

    pub fn resource_mut<R: 'static>(&mut self) -> Option<&mut R> {
        self.ctx.resource_mut()
    }

    pub fn events(&self) -> &EventQueue {
        self.ctx.events()
    }

    pub fn clock(&self) -> &SimulationClock {
        self.ctx.clock()
    }

    /// Read-only view of the state hooks see.
    pub fn context(&self) -> &WorldContext {
        &self.ctx
    }

    // ------------------------------------------------------------------
    // Diagnostics
    // ------------------------------------------------------------------

    /// Hook failures (errors and panics) since the world was created.
    pub fn hook_failures(&self) -> u64 {
        self.hook_failures
    }

    /// Per-system failure counts. Empty unless metrics are compiled in.
    pub fn failure_counter(&self) -> &Counter {
        &self.failures
    }

    /// Per-system update timings. Empty unless metrics are compiled in.
    pub fn profiler(&self) -> &HookProfiler {
        &self.profiler
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn start_inner(&mut self, id: SystemId) -> Result<(), SystemError> {
        match self.checked_state(id)? {
            SystemState::Active => return Ok(()),
            SystemState::Inactive => {}
            SystemState::Destroyed => return Err(SystemError::Destroyed { id }),
        }

        self.set_state(id, SystemState::Active);
        if let Err(source) = self.invoke(id, HookCall::Start) {
            if self.registry.state(id) == Some(SystemState::Active) {
                self.set_state(id, SystemState::Inactive);
            }
            let name = self.system_name(id);
            return Err(SystemError::StartFailed { name, source });
        }

        tracing::debug!(system = %self.system_name(id), %id, "system started");
        Ok(())
    }

    fn stop_inner(&mut self, id: SystemId) -> Result<(), SystemError> {
        match self.checked_state(id)? {
            SystemState::Active => {}
            SystemState::Inactive => return Ok(()),
            SystemState::Destroyed => return Err(SystemError::Destroyed { id }),
        }

        self.set_state(id, SystemState::Inactive);
        let _ = self.invoke(id, HookCall::Stop);
        tracing::debug!(system = %self.system_name(id), %id, "system stopped");
        Ok(())
    }

    fn destroy_inner(&mut self, id: SystemId) -> Result<bool, SystemError> {
        match self.checked_state(id)? {
            SystemState::Destroyed => return Ok(false),
            SystemState::Active => {
                self.set_state(id, SystemState::Inactive);
                let _ = self.invoke(id, HookCall::Stop);
            }
            SystemState::Inactive => {}
        }

        let name = self.system_name(id);
        drop(self.registry.retire(id));
        self.profiler.forget(&name);
        tracing::debug!(system = %name, %id, "system destroyed");
        Ok(true)
    }

    fn checked_state(&self, id: SystemId) -> Result<SystemState, SystemError> {
        self.registry
            .state(id)
            .ok_or(SystemError::Unknown { id })
    }

    fn set_state(&mut self, id: SystemId, state: SystemState) {
        if let Some(slot) = self.registry.slot_mut(id) {
            slot.state = state;
        }
    }

    fn system_name(&self, id: SystemId) -> String {
        self.registry
            .descriptor(id)
            .map(|descriptor| descriptor.name().to_string())
            .unwrap_or_else(|| format!("system {id}"))
    }

    /// Run one hook of one system with failure isolation. Undeclared hooks
    /// are skipped and count as success.
    fn invoke(&mut self, id: SystemId, call: HookCall) -> HookResult {
        let Some(slot) = self.registry.slot_mut(id) else {
            return Ok(());
        };
        if !slot.descriptor.declares(call.hook()) {
            return Ok(());
        }
        let Some(mut system) = slot.system.take() else {
            return Ok(());
        };

        let previous = self.ctx.set_current(Some(id));
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            call.invoke(system.as_mut(), &mut self.ctx)
        }));
        self.ctx.set_current(previous);

        if let Some(slot) = self.registry.slot_mut(id) {
            slot.system = Some(system);
        }

        let error: HookError = match outcome {
            Ok(Ok(())) => return Ok(()),
            Ok(Err(err)) => {
                tracing::warn!(
                    system = %self.system_name(id),
                    hook = call.name(),
                    error = %err,
                    "system hook failed"
                );
                err
            }
            Err(payload) => {
                let message = crate::panic_message(payload.as_ref()).to_string();
                tracing::error!(
                    system = %self.system_name(id),
                    hook = call.name(),
                    panic = %message,
                    "system hook panicked"
                );
                format!("hook panicked: {message}").into()
            }
        };

        self.hook_failures += 1;
        let name = self.system_name(id);
        self.failures.increment(&name, 1);
        Err(error)
    }

    /// Deliver queued membership changes and apply deferred lifecycle
    /// requests until both queues are empty.
    fn settle(&mut self) {
        for _ in 0..MAX_SETTLE_ROUNDS {
            let changes = self.ctx.take_changes();
            let commands = self.ctx.take_commands();
            if changes.is_empty() && commands.is_empty() {
                return;
            }

            for change in changes {
                self.notify(change);
            }
            for command in commands {
                self.apply(command);
            }
        }

        tracing::warn!(
            rounds = MAX_SETTLE_ROUNDS,
            "membership notifications did not settle; remaining changes are deferred"
        );
    }

    fn notify(&mut self, change: MembershipChange) {
        let call = change.hook_call();
        let hook = call.hook();
        let targets: Vec<SystemId> = self
            .registry
            .ordered()
            .filter(|&id| {
                self.registry.slot(id).is_some_and(|slot| {
                    slot.state.is_active()
                        && slot.descriptor.declares(hook)
                        && change
                            .component()
                            .map_or(true, |component| slot.descriptor.watches(component))
                })
            })
            .collect();

        for id in targets {
            let _ = self.invoke(id, call);
        }
    }

    fn apply(&mut self, command: LifecycleCommand) {
        let result = match command {
            LifecycleCommand::Start(id) => self.start_inner(id),
            LifecycleCommand::Stop(id) => self.stop_inner(id),
            LifecycleCommand::Destroy(id) => self.destroy_inner(id).map(|_| ()),
        };
        if let Err(err) = result {
            tracing::warn!(?command, error = %err, "deferred lifecycle request failed");
        }
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::define_component;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Debug, PartialEq)]
    struct Health(i32);
    define_component!(Health, 9_201, "Health");

    #[derive(Debug, PartialEq)]
    struct Tag;
    define_component!(Tag, 9_202, "Tag");

    type Log = Rc<RefCell<Vec<String>>>;

    /// Records every hook it receives.
    struct Recorder {
        name: &'static str,
        hooks: HookSet,
        watches: Vec<u32>,
        log: Log,
    }

    impl Recorder {
        fn new(name: &'static str, hooks: HookSet, log: &Log) -> Self {
            Self {
                name,
                hooks,
                watches: Vec::new(),
                log: Rc::clone(log),
            }
        }

        fn record(&self, what: String) -> HookResult {
            self.log.borrow_mut().push(format!("{}:{}", self.name, what));
            Ok(())
        }
    }

    impl System for Recorder {
        fn descriptor(&self) -> SystemDescriptor {
            SystemDescriptor::new(self.name)
                .with_hooks(self.hooks)
                .watching(self.watches.iter().copied())
        }

        fn on_start(&mut self, _ctx: &mut WorldContext) -> HookResult {
            self.record("start".into())
        }

        fn on_update(&mut self, _ctx: &mut WorldContext, delta: f64, elapsed: f64) -> HookResult {
            self.record(format!("update({delta},{elapsed})"))
        }

        fn on_stop(&mut self, _ctx: &mut WorldContext) -> HookResult {
            self.record("stop".into())
        }

        fn on_entity_added(&mut self, _ctx: &mut WorldContext, entity: Entity) -> HookResult {
            self.record(format!("+{entity}"))
        }

        fn on_entity_removed(&mut self, _ctx: &mut WorldContext, entity: Entity) -> HookResult {
            self.record(format!("-{entity}"))
        }

        fn on_component_added(
            &mut self,
            _ctx: &mut WorldContext,
            entity: Entity,
            component: u32,
        ) -> HookResult {
            self.record(format!("+{entity}/{component}"))
        }

        fn on_component_removed(
            &mut self,
            _ctx: &mut WorldContext,
            entity: Entity,
            component: u32,
        ) -> HookResult {
            self.record(format!("-{entity}/{component}"))
        }
    }

    fn log() -> Log {
        Rc::new(RefCell::new(Vec::new()))
    }

    fn drain(log: &Log) -> Vec<String> {
        std::mem::take(&mut *log.borrow_mut())
    }

    #[test]
    fn test_lifecycle_runs_start_updates_stop() {
        let log = log();
        let mut world = World::new();
        let id = world
            .add_system(Recorder::new("p", HookSet::LIFECYCLE, &log))
            .unwrap();
        assert_eq!(world.system_state(id), Some(SystemState::Inactive));

        world.tick(0.5);
        assert!(drain(&log).is_empty(), "inactive systems are not updated");

        world.start_system(id).unwrap();
        world.start_system(id).unwrap();
        world.tick(0.5);
        world.tick(0.25);
        world.stop_system(id).unwrap();
        world.stop_system(id).unwrap();
        world.tick(0.5);

        assert_eq!(
            drain(&log),
            vec!["p:start", "p:update(0.5,1)", "p:update(0.25,1.25)", "p:stop"]
        );
        assert_eq!(world.clock().tick_count(), 4);
    }

    #[test]
    fn test_destroy_is_terminal_and_idempotent() {
        let log = log();
        let mut world = World::new();
        let id = world
            .spawn_system(Recorder::new("p", HookSet::LIFECYCLE, &log))
            .unwrap();

        assert_eq!(world.destroy_system(id).unwrap(), true);
        let state = world.system_state(id).unwrap();
        assert!(!state.is_active());
        assert!(state.is_destroyed());

        assert_eq!(world.destroy_system(id).unwrap(), false);
        assert_eq!(world.system_state(id), Some(SystemState::Destroyed));
        assert!(matches!(
            world.start_system(id),
            Err(SystemError::Destroyed { .. })
        ));

        world.tick(1.0);
        assert_eq!(drain(&log), vec!["p:start", "p:stop"]);
        assert_eq!(world.system_count(), 0);
        assert_eq!(world.system_id("p"), None);
    }

    #[test]
    fn test_unknown_system_is_reported() {
        let mut world = World::new();
        let mut other = World::new();
        let foreign = other
            .add_system(Recorder::new("x", HookSet::UPDATE, &log()))
            .unwrap();
        assert!(matches!(
            world.start_system(foreign),
            Err(SystemError::Unknown { .. })
        ));
    }

    #[test]
    fn test_membership_hooks_respect_declarations_and_watches() {
        let log = log();
        let mut world = World::new();

        world
            .spawn_system(Recorder::new("all", HookSet::ALL, &log))
            .unwrap();
        let mut picky = Recorder::new("picky", HookSet::COMPONENT_ADDED, &log);
        picky.watches = vec![Tag::ID];
        world.spawn_system(picky).unwrap();
        world
            .add_system(Recorder::new("asleep", HookSet::ALL, &log))
            .unwrap();
        drain(&log);

        let entity = world.spawn();
        world.insert(entity, Health(3)).unwrap();
        world.insert(entity, Tag).unwrap();
        world.insert(entity, Health(4)).unwrap();
        world.despawn(entity);

        let e = entity.to_string();
        assert_eq!(
            drain(&log),
            vec![
                format!("all:+{e}"),
                format!("all:+{e}/{}", Health::ID),
                format!("all:+{e}/{}", Tag::ID),
                format!("picky:+{e}/{}", Tag::ID),
                format!("all:-{e}/{}", Health::ID),
                format!("all:-{e}/{}", Tag::ID),
                format!("all:-{e}"),
            ]
        );
    }

    struct Faulty {
        name: &'static str,
        panic: bool,
    }

    impl System for Faulty {
        fn descriptor(&self) -> SystemDescriptor {
            SystemDescriptor::new(self.name).with_hooks(HookSet::UPDATE)
        }

        fn on_update(&mut self, _ctx: &mut WorldContext, _delta: f64, _elapsed: f64) -> HookResult {
            if self.panic {
                panic!("update exploded");
            }
            Err("update failed".into())
        }
    }

    #[test]
    fn test_failing_systems_do_not_abort_the_tick() {
        let log = log();
        let mut world = World::new();
        world
            .spawn_system(Faulty { name: "err", panic: false })
            .unwrap();
        world
            .spawn_system(Faulty { name: "boom", panic: true })
            .unwrap();
        world
            .spawn_system(Recorder::new("ok", HookSet::UPDATE, &log))
            .unwrap();

        let report = world.tick(1.0);
        assert_eq!(
            report,
            TickReport {
                tick: 1,
                updated: 3,
                failed: 2
            }
        );
        assert_eq!(drain(&log), vec!["ok:update(1,1)"]);
        assert_eq!(world.hook_failures(), 2);

        // Failing systems stay active and keep being scheduled.
        assert_eq!(world.tick(1.0).failed, 2);
    }

    struct BadStart;

    impl System for BadStart {
        fn descriptor(&self) -> SystemDescriptor {
            SystemDescriptor::new("bad-start").with_hooks(HookSet::START | HookSet::UPDATE)
        }

        fn on_start(&mut self, _ctx: &mut WorldContext) -> HookResult {
            Err("no config".into())
        }
    }

    #[test]
    fn test_failed_start_leaves_system_inactive() {
        let mut world = World::new();
        let id = world.add_system(BadStart).unwrap();
        let err = world.start_system(id).unwrap_err();
        assert!(matches!(err, SystemError::StartFailed { ref name, .. } if name == "bad-start"));
        assert_eq!(world.system_state(id), Some(SystemState::Inactive));
        assert_eq!(world.tick(0.1).updated, 0);
    }

    /// Spawns one entity per update and retires itself after `budget` ticks.
    struct Spawner {
        budget: u32,
    }

    impl System for Spawner {
        fn descriptor(&self) -> SystemDescriptor {
            SystemDescriptor::new("spawner").with_hooks(HookSet::UPDATE)
        }

        fn on_update(&mut self, ctx: &mut WorldContext, _delta: f64, _elapsed: f64) -> HookResult {
            let entity = ctx.spawn();
            ctx.insert(entity, Health(10))?;
            self.budget -= 1;
            if self.budget == 0 {
                if let Some(me) = ctx.current_system() {
                    ctx.destroy_system(me);
                }
            }
            Ok(())
        }
    }

    #[test]
    fn test_hook_changes_are_announced_after_the_hook() {
        let log = log();
        let mut world = World::new();
        let spawner = world.spawn_system(Spawner { budget: 2 }).unwrap();
        world
            .spawn_system(Recorder::new("watcher", HookSet::ENTITY_ADDED, &log))
            .unwrap();

        world.tick(0.1);
        world.tick(0.1);
        world.tick(0.1);

        assert_eq!(drain(&log).len(), 2);
        assert_eq!(world.entity_count(), 2);
        assert_eq!(world.system_state(spawner), Some(SystemState::Destroyed));
        assert_eq!(
            world.context().query::<Health>().count(),
            2,
        );
    }

    #[derive(Debug)]
    struct Scored(u32);

    /// Pushes an event each tick; the listener is attached on start.
    struct Scorer {
        total: Rc<RefCell<u32>>,
    }

    impl System for Scorer {
        fn descriptor(&self) -> SystemDescriptor {
            SystemDescriptor::new("scorer").with_hooks(HookSet::START | HookSet::UPDATE)
        }

        fn on_start(&mut self, ctx: &mut WorldContext) -> HookResult {
            let total = Rc::clone(&self.total);
            ctx.events().subscribe(move |event: &Scored| {
                *total.borrow_mut() += event.0;
                Ok(())
            });
            Ok(())
        }

        fn on_update(&mut self, ctx: &mut WorldContext, _delta: f64, _elapsed: f64) -> HookResult {
            ctx.events().push(Scored(5));
            Ok(())
        }
    }

    #[test]
    fn test_events_are_dispatched_at_end_of_tick() {
        let total = Rc::new(RefCell::new(0));
        let mut world = World::new();
        world
            .spawn_system(Scorer {
                total: Rc::clone(&total),
            })
            .unwrap();

        world.tick(0.1);
        world.tick(0.1);
        assert_eq!(*total.borrow(), 10);
        assert!(world.events().is_empty());
    }

    #[test]
    fn test_registration_errors_surface() {
        let mut world = World::new();
        world
            .add_system(Recorder::new("dup", HookSet::UPDATE, &log()))
            .unwrap();
        assert!(matches!(
            world.add_system(Recorder::new("dup", HookSet::UPDATE, &log())),
            Err(SystemRegistrationError::DuplicateName { .. })
        ));
        assert!(matches!(
            world.spawn_system(Recorder::new("none", HookSet::NONE, &log())),
            Err(WorldError::Registration(SystemRegistrationError::NoHooks { .. }))
        ));
    }
}
