//! A value protected by a shared mutex word

use crate::error::SyncError;
use crate::mutex::{MemorySharing, Mutex, MutexMode};
use std::cell::UnsafeCell;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

struct Slot<T>(UnsafeCell<T>);

// SAFETY: the cell is only reached through `GuardedRef`, which exists only
// while the mutex word is held, so at most one thread touches it at a time.
unsafe impl<T: Send> Sync for Slot<T> {}

/// Shared state whose access is serialized by a [`Mutex`].
///
/// ```ignore
/// let counter = Guarded::new(0u64);
/// let remote = counter.connect()?;
/// std::thread::spawn(move || *remote.lock() += 1);
/// ```
pub struct Guarded<T> {
    mutex: Mutex,
    value: Arc<Slot<T>>,
}

impl<T> Guarded<T> {
    pub fn new(value: T) -> Self {
        Self::with_sharing(value, MemorySharing::detect())
    }

    pub fn with_sharing(value: T, sharing: MemorySharing) -> Self {
        Self {
            mutex: Mutex::with_sharing(sharing),
            value: Arc::new(Slot(UnsafeCell::new(value))),
        }
    }

    /// Another handle to the same value and lock word.
    pub fn connect(&self) -> Result<Self, SyncError> {
        Ok(Self {
            mutex: Mutex::connect(&self.mutex)?,
            value: Arc::clone(&self.value),
        })
    }

    pub fn mode(&self) -> MutexMode {
        self.mutex.mode()
    }

    pub fn mutex(&self) -> &Mutex {
        &self.mutex
    }

    pub fn lock(&self) -> GuardedRef<'_, T> {
        self.mutex.lock();
        GuardedRef { owner: self }
    }

    pub fn try_lock(&self) -> Option<GuardedRef<'_, T>> {
        self.mutex.try_lock().then(|| GuardedRef { owner: self })
    }
}

impl<T: fmt::Debug> fmt::Debug for Guarded<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.try_lock() {
            Some(value) => f.debug_struct("Guarded").field("value", &*value).finish(),
            None => f.debug_struct("Guarded").field("value", &"<locked>").finish(),
        }
    }
}

/// Access to a [`Guarded`] value; unlocks on drop.
#[must_use = "the value is unlocked as soon as the guard is dropped"]
pub struct GuardedRef<'a, T> {
    owner: &'a Guarded<T>,
}

impl<T> Deref for GuardedRef<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: this guard holds the lock word.
        unsafe { &*self.owner.value.0.get() }
    }
}

impl<T> DerefMut for GuardedRef<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: this guard holds the lock word, and `&mut self` prevents a
        // second borrow through the same guard.
        unsafe { &mut *self.owner.value.0.get() }
    }
}

impl<T> Drop for GuardedRef<'_, T> {
    fn drop(&mut self) {
        self.owner.mutex.unlock();
    }
}
