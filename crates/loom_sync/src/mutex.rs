//! Cross-context mutex over a single shared word
//!
//! The lock state is one `AtomicU32` holding [`UNLOCKED`] or [`LOCKED`].
//! Every handle connected to the same word shares the identical allocation, so
//! the word can be handed to another thread and locked from there. Contended
//! lockers spin briefly, then park on the word's address until an unlock wakes
//! one of them. Not reentrant, not fair.

use crate::error::SyncError;
use parking_lot_core::{DEFAULT_PARK_TOKEN, DEFAULT_UNPARK_TOKEN};
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

pub const UNLOCKED: u32 = 0;
pub const LOCKED: u32 = 1;

const SPIN_LIMIT: u32 = 64;

/// Whether the host can share memory between execution contexts.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MemorySharing {
    Available,
    Unavailable,
}

impl MemorySharing {
    pub fn detect() -> Self {
        if cfg!(all(target_arch = "wasm32", not(target_feature = "atomics"))) {
            MemorySharing::Unavailable
        } else {
            MemorySharing::Available
        }
    }
}

/// Capability of a particular mutex.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MutexMode {
    /// Word may be connected to from other contexts.
    CrossContext,
    /// Degraded: excludes within one context only and refuses `connect`.
    Private,
}

/// Handle to a lock word that can be sent to another context and attached
/// there with [`Mutex::attach`].
#[derive(Clone)]
pub struct SharedWord(Arc<AtomicU32>);

impl SharedWord {
    pub fn value(&self) -> u32 {
        self.0.load(Ordering::Acquire)
    }
}

impl fmt::Debug for SharedWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SharedWord").field(&self.value()).finish()
    }
}

pub struct Mutex {
    word: Arc<AtomicU32>,
    mode: MutexMode,
}

impl Mutex {
    /// Fresh unlocked word, cross-context when the host allows it.
    pub fn new() -> Self {
        Self::with_sharing(MemorySharing::detect())
    }

    pub fn with_sharing(sharing: MemorySharing) -> Self {
        let mode = match sharing {
            MemorySharing::Available => MutexMode::CrossContext,
            MemorySharing::Unavailable => {
                tracing::debug!("shared memory unavailable; mutex is private to this context");
                MutexMode::Private
            }
        };
        Self {
            word: Arc::new(AtomicU32::new(UNLOCKED)),
            mode,
        }
    }

    /// Bind to a word received from another context.
    pub fn attach(word: SharedWord) -> Result<Self, SyncError> {
        let value = word.value();
        if value != UNLOCKED && value != LOCKED {
            return Err(SyncError::InvalidWordValue { value });
        }
        Ok(Self {
            word: word.0,
            mode: MutexMode::CrossContext,
        })
    }

    /// Second handle bound to the same word as `existing`.
    pub fn connect(existing: &Mutex) -> Result<Self, SyncError> {
        Self::attach(existing.word()?)
    }

    /// The word backing this mutex, for handing to another context.
    pub fn word(&self) -> Result<SharedWord, SyncError> {
        match self.mode {
            MutexMode::CrossContext => Ok(SharedWord(Arc::clone(&self.word))),
            MutexMode::Private => Err(SyncError::PrivateWord),
        }
    }

    pub fn mode(&self) -> MutexMode {
        self.mode
    }

    pub fn is_locked(&self) -> bool {
        self.word.load(Ordering::Relaxed) == LOCKED
    }

    /// Acquire the lock without blocking.
    pub fn try_lock(&self) -> bool {
        self.word
            .compare_exchange(UNLOCKED, LOCKED, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    /// Acquire the lock, parking the calling thread while it is held
    /// elsewhere.
    pub fn lock(&self) {
        loop {
            let mut spins = 0;
            while spins < SPIN_LIMIT {
                if self.try_lock() {
                    return;
                }
                std::hint::spin_loop();
                spins += 1;
            }

            // SAFETY: the key is the address of the shared word, which stays
            // alive for as long as any handle (including this one) exists.
            // The validate callback runs under the bucket lock and only loads
            // an atomic; the remaining callbacks do nothing.
            unsafe {
                parking_lot_core::park(
                    self.key(),
                    || self.word.load(Ordering::Relaxed) == LOCKED,
                    || {},
                    |_, _| {},
                    DEFAULT_PARK_TOKEN,
                    None,
                );
            }
        }
    }

    /// Release the lock and wake one parked waiter.
    ///
    /// # Panics
    ///
    /// If the word was not locked. Nobody is woken in that case.
    pub fn unlock(&self) {
        if let Err(value) =
            self.word
                .compare_exchange(LOCKED, UNLOCKED, Ordering::Release, Ordering::Relaxed)
        {
            tracing::error!(value, "unlock on a mutex word that was not locked");
            panic!("mutex unlock on a word that was not locked (value {value})");
        }

        // SAFETY: same key as `lock`; the callback only returns a token.
        unsafe {
            parking_lot_core::unpark_one(self.key(), |_| DEFAULT_UNPARK_TOKEN);
        }
    }

    /// Lock and return a guard that unlocks on drop.
    pub fn lock_guard(&self) -> MutexGuard<'_> {
        self.lock();
        MutexGuard { mutex: self }
    }

    pub fn try_lock_guard(&self) -> Option<MutexGuard<'_>> {
        self.try_lock().then(|| MutexGuard { mutex: self })
    }

    fn key(&self) -> usize {
        Arc::as_ptr(&self.word) as usize
    }
}

impl Default for Mutex {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Mutex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mutex")
            .field("mode", &self.mode)
            .field("locked", &self.is_locked())
            .finish()
    }
}

#[must_use = "the mutex unlocks as soon as the guard is dropped"]
pub struct MutexGuard<'a> {
    mutex: &'a Mutex,
}

impl Drop for MutexGuard<'_> {
    fn drop(&mut self) {
        self.mutex.unlock();
    }
}
