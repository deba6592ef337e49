//! Double-buffered event queue
//!
//! Events are pushed into the active buffer and delivered to listeners keyed
//! by the event's Rust type. Once a dispatch pass has started, new pushes land
//! in the staging buffer and become visible only after `clear` swaps the two.
//! The queue is a cheap `Rc` handle and deliberately `!Send`: it belongs to the
//! context that created it.

use std::any::{Any, TypeId};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::{Rc, Weak};

/// Outcome of a listener invocation. Errors are logged, never propagated.
pub type ListenerResult = Result<(), Box<dyn Error + Send + Sync + 'static>>;

type Listener = Rc<dyn Fn(&dyn Any) -> ListenerResult>;

#[derive(Clone)]
struct ListenerEntry {
    id: u64,
    listener: Listener,
}

type ListenerTable = HashMap<TypeId, Rc<Vec<ListenerEntry>>>;

/// A queued event. Cloning shares the payload.
#[derive(Clone)]
pub struct QueuedEvent {
    type_id: TypeId,
    type_name: &'static str,
    payload: Rc<dyn Any>,
}

impl QueuedEvent {
    pub fn downcast_ref<E: 'static>(&self) -> Option<&E> {
        self.payload.downcast_ref::<E>()
    }

    pub fn is<E: 'static>(&self) -> bool {
        self.type_id == TypeId::of::<E>()
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl fmt::Debug for QueuedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueuedEvent")
            .field("type", &self.type_name)
            .finish_non_exhaustive()
    }
}

/// Cumulative delivery counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct QueueStats {
    /// Listener invocations, successful or not.
    pub delivered: u64,
    /// Invocations that returned an error or panicked.
    pub failed: u64,
}

struct Inner {
    active: RefCell<Vec<QueuedEvent>>,
    staging: RefCell<Vec<QueuedEvent>>,
    /// Set when a pass starts, reset by `clear`.
    dispatched: Cell<bool>,
    /// Set only while a pass is executing.
    running: Cell<bool>,
    listeners: RefCell<ListenerTable>,
    next_listener: Cell<u64>,
    stats: Cell<QueueStats>,
}

#[derive(Clone)]
pub struct EventQueue {
    inner: Rc<Inner>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(Inner {
                active: RefCell::new(Vec::new()),
                staging: RefCell::new(Vec::new()),
                dispatched: Cell::new(false),
                running: Cell::new(false),
                listeners: RefCell::new(HashMap::new()),
                next_listener: Cell::new(1),
                stats: Cell::new(QueueStats::default()),
            }),
        }
    }

    /// Queue `event`. During or after a dispatch pass (until the next
    /// `clear`) the event is held back for the following pass.
    pub fn push<E: 'static>(&self, event: E) {
        let event = QueuedEvent {
            type_id: TypeId::of::<E>(),
            type_name: std::any::type_name::<E>(),
            payload: Rc::new(event),
        };
        if self.inner.dispatched.get() {
            self.inner.staging.borrow_mut().push(event);
        } else {
            self.inner.active.borrow_mut().push(event);
        }
    }

    /// Lazy view of the active buffer as it stands now. Call again to
    /// restart.
    pub fn iter(&self) -> EventIter {
        EventIter {
            inner: Rc::clone(&self.inner),
            index: 0,
            end: self.inner.active.borrow().len(),
        }
    }

    /// Events visible to the current cycle.
    pub fn len(&self) -> usize {
        self.inner.active.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Events held back for the next cycle.
    pub fn pending_len(&self) -> usize {
        self.inner.staging.borrow().len()
    }

    /// True while a dispatch pass is running.
    pub fn is_dispatching(&self) -> bool {
        self.inner.running.get()
    }

    pub fn stats(&self) -> QueueStats {
        self.inner.stats.get()
    }

    pub fn listener_count<E: 'static>(&self) -> usize {
        self.inner
            .listeners
            .borrow()
            .get(&TypeId::of::<E>())
            .map_or(0, |list| list.len())
    }

    /// Register `listener` for events of type `E`. Listeners run in
    /// subscription order. A subscription made during a pass takes effect on
    /// the next one.
    pub fn subscribe<E, F>(&self, listener: F) -> Subscription
    where
        E: 'static,
        F: Fn(&E) -> ListenerResult + 'static,
    {
        let id = self.inner.next_listener.get();
        self.inner.next_listener.set(id + 1);

        let listener: Listener =
            Rc::new(move |payload: &dyn Any| match payload.downcast_ref::<E>() {
                Some(event) => listener(event),
                None => Ok(()),
            });

        let type_id = TypeId::of::<E>();
        let mut table = self.inner.listeners.borrow_mut();
        Rc::make_mut(table.entry(type_id).or_default()).push(ListenerEntry { id, listener });

        Subscription {
            id,
            type_id,
            queue: Rc::downgrade(&self.inner),
        }
    }

    /// Remove a listener from future passes. A pass already in progress still
    /// delivers to it. Returns false if it was already gone.
    pub fn unsubscribe(&self, subscription: &Subscription) -> bool {
        Self::remove_listener(&self.inner, subscription)
    }

    fn remove_listener(inner: &Inner, subscription: &Subscription) -> bool {
        let mut table = inner.listeners.borrow_mut();
        let Some(list) = table.get_mut(&subscription.type_id) else {
            return false;
        };
        let Some(position) = list.iter().position(|entry| entry.id == subscription.id) else {
            return false;
        };
        Rc::make_mut(list).remove(position);
        if list.is_empty() {
            table.remove(&subscription.type_id);
        }
        true
    }

    /// Deliver every event in the active buffer to the listeners of its type.
    /// Failing or panicking listeners are logged and skipped.
    pub fn dispatch_queue(&self) {
        if self.is_dispatching() {
            tracing::warn!("ignoring re-entrant dispatch_queue call from inside a listener");
            return;
        }
        self.inner.running.set(true);
        self.inner.dispatched.set(true);

        let pinned: ListenerTable = self.inner.listeners.borrow().clone();
        let mut index = 0;
        loop {
            let event = match self.inner.active.borrow().get(index) {
                Some(event) => event.clone(),
                None => break,
            };
            index += 1;

            if let Some(listeners) = pinned.get(&event.type_id) {
                for entry in listeners.iter() {
                    self.deliver(entry, &event);
                }
            }
        }

        self.inner.running.set(false);
    }

    /// Swap buffers: events held back during the last pass become active and
    /// the previously active events are dropped.
    pub fn clear(&self) {
        if self.is_dispatching() {
            tracing::warn!("ignoring clear call from inside a listener");
            return;
        }
        {
            let mut active = self.inner.active.borrow_mut();
            let mut staging = self.inner.staging.borrow_mut();
            std::mem::swap(&mut *active, &mut *staging);
            staging.clear();
        }
        self.inner.dispatched.set(false);
    }

    pub fn dispatch_and_clear(&self) {
        self.dispatch_queue();
        self.clear();
    }

    fn deliver(&self, entry: &ListenerEntry, event: &QueuedEvent) {
        let outcome =
            panic::catch_unwind(AssertUnwindSafe(|| (entry.listener)(event.payload.as_ref())));

        let mut stats = self.inner.stats.get();
        stats.delivered += 1;
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                stats.failed += 1;
                tracing::warn!(
                    event = event.type_name,
                    listener = entry.id,
                    error = %err,
                    "event listener failed"
                );
            }
            Err(payload) => {
                stats.failed += 1;
                tracing::error!(
                    event = event.type_name,
                    listener = entry.id,
                    panic = crate::panic_message(payload.as_ref()),
                    "event listener panicked"
                );
            }
        }
        self.inner.stats.set(stats);
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventQueue")
            .field("active", &self.len())
            .field("pending", &self.pending_len())
            .field("dispatched", &self.inner.dispatched.get())
            .finish()
    }
}

/// Ticket returned by [`EventQueue::subscribe`]. Dropping it does not
/// unsubscribe.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    type_id: TypeId,
    queue: Weak<Inner>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Detach from the queue it came from. A no-op if the queue is gone.
    pub fn unsubscribe(self) -> bool {
        match self.queue.upgrade() {
            Some(inner) => EventQueue::remove_listener(&inner, &self),
            None => false,
        }
    }
}

/// Iterator over the active events captured at creation time.
pub struct EventIter {
    inner: Rc<Inner>,
    index: usize,
    end: usize,
}

impl Iterator for EventIter {
    type Item = QueuedEvent;

    fn next(&mut self) -> Option<Self::Item> {
        if self.index >= self.end {
            return None;
        }
        let event = self.inner.active.borrow().get(self.index).cloned();
        self.index += 1;
        // A clear in between shrinks the buffer; stop rather than skip.
        if event.is_none() {
            self.index = self.end;
        }
        event
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[derive(Debug, PartialEq)]
    struct Ping(u32);

    #[derive(Debug, PartialEq)]
    struct Pong(&'static str);

    fn recorder() -> Rc<RefCell<Vec<String>>> {
        Rc::new(RefCell::new(Vec::new()))
    }

    #[test]
    fn test_delivery_follows_push_then_subscription_order() {
        let queue = EventQueue::new();
        let log = recorder();

        for tag in ["first", "second"] {
            let log = Rc::clone(&log);
            queue.subscribe(move |ping: &Ping| {
                log.borrow_mut().push(format!("{tag}:{}", ping.0));
                Ok(())
            });
        }

        queue.push(Ping(1));
        queue.push(Pong("ignored"));
        queue.push(Ping(2));
        queue.dispatch_and_clear();

        assert_eq!(
            *log.borrow(),
            vec!["first:1", "second:1", "first:2", "second:2"]
        );
        assert_eq!(queue.stats().delivered, 4);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_events_pushed_during_dispatch_wait_for_next_pass() {
        let queue = EventQueue::new();
        let seen = recorder();

        {
            let queue_handle = queue.clone();
            let seen = Rc::clone(&seen);
            queue.subscribe(move |ping: &Ping| {
                seen.borrow_mut().push(ping.0.to_string());
                if ping.0 < 3 {
                    queue_handle.push(Ping(ping.0 + 1));
                }
                Ok(())
            });
        }

        queue.push(Ping(1));
        queue.dispatch_queue();
        assert_eq!(*seen.borrow(), vec!["1"]);
        assert_eq!(queue.pending_len(), 1);

        // Still held back after the pass until clear swaps the buffers.
        queue.push(Ping(10));
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.pending_len(), 2);

        queue.clear();
        assert_eq!(queue.len(), 2);
        queue.dispatch_and_clear();
        assert_eq!(*seen.borrow(), vec!["1", "2", "10"]);
        assert_eq!(queue.len(), 1, "Ping(3) surfaces one cycle later");
    }

    #[test]
    fn test_failing_listener_does_not_stop_dispatch() {
        let queue = EventQueue::new();
        let reached = Rc::new(Cell::new(0));

        queue.subscribe(|_: &Ping| Err("boom".into()));
        queue.subscribe(|_: &Ping| -> ListenerResult { panic!("listener exploded") });
        {
            let reached = Rc::clone(&reached);
            queue.subscribe(move |_: &Ping| {
                reached.set(reached.get() + 1);
                Ok(())
            });
        }

        queue.push(Ping(1));
        queue.push(Ping(2));
        queue.dispatch_and_clear();

        assert_eq!(reached.get(), 2);
        assert_eq!(
            queue.stats(),
            QueueStats {
                delivered: 6,
                failed: 4
            }
        );
    }

    #[test]
    fn test_unsubscribe_applies_to_future_passes_only() {
        let queue = EventQueue::new();
        let hits = Rc::new(Cell::new(0));
        let ticket: Rc<RefCell<Option<Subscription>>> = Rc::new(RefCell::new(None));

        {
            let hits = Rc::clone(&hits);
            let queue_handle = queue.clone();
            let slot = Rc::clone(&ticket);
            let subscription = queue.subscribe(move |_: &Ping| {
                hits.set(hits.get() + 1);
                if let Some(sub) = slot.borrow().as_ref() {
                    queue_handle.unsubscribe(sub);
                }
                Ok(())
            });
            *ticket.borrow_mut() = Some(subscription);
        }

        queue.push(Ping(1));
        queue.push(Ping(2));
        queue.dispatch_and_clear();
        assert_eq!(hits.get(), 2, "listener set is pinned for the whole pass");
        assert_eq!(queue.listener_count::<Ping>(), 0);

        queue.push(Ping(3));
        queue.dispatch_and_clear();
        assert_eq!(hits.get(), 2);
    }

    #[test]
    fn test_subscription_handle_unsubscribes() {
        let queue = EventQueue::new();
        let sub = queue.subscribe(|_: &Pong| Ok(()));
        assert_eq!(queue.listener_count::<Pong>(), 1);
        assert!(sub.unsubscribe());
        assert_eq!(queue.listener_count::<Pong>(), 0);

        let orphan = {
            let short_lived = EventQueue::new();
            short_lived.subscribe(|_: &Pong| Ok(()))
        };
        assert!(!orphan.unsubscribe());
    }

    #[test]
    fn test_reentrant_dispatch_and_clear_are_ignored() {
        let queue = EventQueue::new();
        let hits = Rc::new(Cell::new(0));
        {
            let queue_handle = queue.clone();
            let hits = Rc::clone(&hits);
            queue.subscribe(move |_: &Ping| {
                hits.set(hits.get() + 1);
                assert!(queue_handle.is_dispatching());
                queue_handle.dispatch_and_clear();
                Ok(())
            });
        }

        queue.push(Ping(1));
        assert!(!queue.is_dispatching());
        queue.dispatch_queue();
        assert!(!queue.is_dispatching());
        assert_eq!(hits.get(), 1);
        assert_eq!(queue.stats().failed, 0);
        assert_eq!(queue.len(), 1, "buffers must not swap mid-pass");
        queue.clear();
        assert!(queue.is_empty());
    }

    #[test]
    fn test_iter_is_restartable_and_finite() {
        let queue = EventQueue::new();
        queue.push(Ping(7));
        queue.push(Pong("x"));

        let first: Vec<_> = queue.iter().collect();
        let second: Vec<_> = queue.iter().collect();
        assert_eq!(first.len(), 2);
        assert_eq!(second.len(), 2);
        assert_eq!(first[0].downcast_ref::<Ping>(), Some(&Ping(7)));
        assert!(first[1].is::<Pong>());

        let mut partial = queue.iter();
        queue.push(Ping(8));
        assert_eq!(partial.by_ref().count(), 2);

        queue.clear();
        assert_eq!(queue.iter().count(), 0);
    }
}
