//! Bounded cache slot table.
//!
//! Maps case names to mounted handles, bounded by a fixed capacity. The
//! table itself is not synchronized; the manager serializes all access
//! under its mutex.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use crate::handle::CaseHandle;

/// Eviction was requested but every resident case is exempt.
///
/// Raised when the current case is the only resident entry; the current
/// case is never evicted while an alternative exists.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("no evictable entry: every resident case is exempt from eviction")]
pub struct NoEvictableEntry;

#[derive(Debug)]
struct Slot {
    handle: Arc<CaseHandle>,
    /// Monotonic mount order, the least-recently-mounted tie-break.
    mount_seq: u64,
}

/// Bounded mapping from case name to mounted handle.
#[derive(Debug)]
pub struct SlotTable {
    slots: HashMap<String, Slot>,
    capacity: usize,
    next_seq: u64,
}

impl SlotTable {
    /// Create an empty table with the given capacity.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "slot table capacity must be positive");
        Self {
            slots: HashMap::with_capacity(capacity),
            capacity,
            next_seq: 0,
        }
    }

    /// Number of resident entries.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the table has no resident entries.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Whether the table is at capacity.
    pub fn is_full(&self) -> bool {
        self.slots.len() >= self.capacity
    }

    /// The configured capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether a case is resident.
    pub fn contains(&self, name: &str) -> bool {
        self.slots.contains_key(name)
    }

    /// Look up a resident handle.
    pub fn get(&self, name: &str) -> Option<&Arc<CaseHandle>> {
        self.slots.get(name).map(|slot| &slot.handle)
    }

    /// Resident case names in mount order.
    pub fn names(&self) -> Vec<String> {
        let mut entries: Vec<(&String, u64)> = self
            .slots
            .iter()
            .map(|(name, slot)| (name, slot.mount_seq))
            .collect();
        entries.sort_by_key(|(_, seq)| *seq);
        entries.into_iter().map(|(name, _)| name.clone()).collect()
    }

    /// Insert a freshly mounted handle.
    ///
    /// The caller must have made room first; inserting into a full table,
    /// or over an existing entry, is a capacity-invariant violation and
    /// panics.
    pub fn insert(&mut self, name: String, handle: Arc<CaseHandle>) {
        assert!(
            self.slots.len() < self.capacity,
            "slot table insert while full (capacity {})",
            self.capacity
        );
        let seq = self.next_seq;
        self.next_seq += 1;
        let previous = self.slots.insert(
            name,
            Slot {
                handle,
                mount_seq: seq,
            },
        );
        assert!(previous.is_none(), "duplicate mount for one case name");
    }

    /// Remove and return a resident handle.
    pub fn remove(&mut self, name: &str) -> Option<Arc<CaseHandle>> {
        self.slots.remove(name).map(|slot| slot.handle)
    }

    /// Select the entry to evict: lowest reference count among entries
    /// other than `current`, ties broken by least-recently-mounted.
    ///
    /// Does not remove the entry; the caller flushes the victim first and
    /// only then commits the removal.
    pub fn pick_victim(&self, current: Option<&str>) -> Result<String, NoEvictableEntry> {
        self.slots
            .iter()
            .filter(|(name, _)| Some(name.as_str()) != current)
            .min_by_key(|(_, slot)| (slot.handle.refcount(), slot.mount_seq))
            .map(|(name, _)| name.clone())
            .ok_or(NoEvictableEntry)
    }

    /// Remove every entry, in mount order.
    pub fn drain(&mut self) -> Vec<(String, Arc<CaseHandle>)> {
        let mut entries: Vec<(String, Slot)> = self.slots.drain().collect();
        entries.sort_by_key(|(_, slot)| slot.mount_seq);
        entries
            .into_iter()
            .map(|(name, slot)| (name, slot.handle))
            .collect()
    }
}
