//! Ordered membership set
//!
//! Insertion-ordered set with O(1) `first`, `last`, `add` and `delete`.
//! Elements live in a slot arena threaded by a doubly-linked list; freed slots
//! are recycled so steady-state churn does not allocate.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

const NIL: usize = usize::MAX;

#[derive(Clone)]
struct Slot<T> {
    value: Option<T>,
    prev: usize,
    next: usize,
}

#[derive(Clone)]
pub struct ComponentSet<T: Eq + Hash + Clone> {
    slots: Vec<Slot<T>>,
    index: HashMap<T, usize>,
    free: Vec<usize>,
    head: usize,
    tail: usize,
}

impl<T: Eq + Hash + Clone> ComponentSet<T> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            index: HashMap::new(),
            free: Vec::new(),
            head: NIL,
            tail: NIL,
        }
    }

    /// Append `value`. Returns false and leaves the set untouched if it is
    /// already a member.
    pub fn add(&mut self, value: T) -> bool {
        if self.index.contains_key(&value) {
            return false;
        }

        let slot = Slot {
            value: Some(value.clone()),
            prev: self.tail,
            next: NIL,
        };
        let at = match self.free.pop() {
            Some(at) => {
                self.slots[at] = slot;
                at
            }
            None => {
                self.slots.push(slot);
                self.slots.len() - 1
            }
        };

        if self.tail == NIL {
            self.head = at;
        } else {
            self.slots[self.tail].next = at;
        }
        self.tail = at;
        self.index.insert(value, at);
        true
    }

    /// Remove `value`. Returns false if it was not a member.
    pub fn delete(&mut self, value: &T) -> bool {
        let Some(at) = self.index.remove(value) else {
            return false;
        };

        let (prev, next) = {
            let slot = &mut self.slots[at];
            slot.value = None;
            (slot.prev, slot.next)
        };

        if prev == NIL {
            self.head = next;
        } else {
            self.slots[prev].next = next;
        }
        if next == NIL {
            self.tail = prev;
        } else {
            self.slots[next].prev = prev;
        }

        self.free.push(at);
        true
    }

    /// Oldest member, `None` iff the set is empty.
    pub fn first(&self) -> Option<&T> {
        self.value_at(self.head)
    }

    /// Newest member.
    pub fn last(&self) -> Option<&T> {
        self.value_at(self.tail)
    }

    pub fn contains(&self, value: &T) -> bool {
        self.index.contains_key(value)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Members in insertion order.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            set: self,
            cursor: self.head,
            remaining: self.len(),
        }
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.index.clear();
        self.free.clear();
        self.head = NIL;
        self.tail = NIL;
    }

    fn value_at(&self, at: usize) -> Option<&T> {
        if at == NIL {
            return None;
        }
        self.slots[at].value.as_ref()
    }
}

impl<T: Eq + Hash + Clone> Default for ComponentSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Eq + Hash + Clone + fmt::Debug> fmt::Debug for ComponentSet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl<T: Eq + Hash + Clone> FromIterator<T> for ComponentSet<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut set = Self::new();
        for value in iter {
            set.add(value);
        }
        set
    }
}

impl<'a, T: Eq + Hash + Clone> IntoIterator for &'a ComponentSet<T> {
    type Item = &'a T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

pub struct Iter<'a, T: Eq + Hash + Clone> {
    set: &'a ComponentSet<T>,
    cursor: usize,
    remaining: usize,
}

impl<'a, T: Eq + Hash + Clone> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor == NIL {
            return None;
        }
        let slot = &self.set.slots[self.cursor];
        self.cursor = slot.next;
        self.remaining -= 1;
        slot.value.as_ref()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<T: Eq + Hash + Clone> ExactSizeIterator for Iter<'_, T> {}
