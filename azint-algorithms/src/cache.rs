//! Shared cache of sparse mappings.
//!
//! Concurrent requests for the same key trigger exactly one build: the first
//! caller builds while holding the key's slot lock, later callers block on
//! that lock and then read the finished mapping. The map lock itself is held
//! only for bookkeeping.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use azint_core::{Geometry, Mask, RadialUnit, Result, SplitMethod};

use crate::mapping::{range_bits, AxisSpec, SparseMapping};

/// Number of mappings kept when no capacity is given.
pub const DEFAULT_CAPACITY: usize = 8;

/// Everything a mapping depends on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MappingKey {
    geometry: u64,
    method: SplitMethod,
    unit: RadialUnit,
    radial: AxisSpec,
    azimuthal: Option<AxisSpec>,
    azimuth_range: Option<(u64, u64)>,
    mask: Option<u64>,
}

impl MappingKey {
    /// Key of a 1-D mapping.
    #[must_use]
    pub fn radial(
        geometry: &Geometry,
        method: SplitMethod,
        unit: RadialUnit,
        radial: AxisSpec,
        azimuth_range: Option<(f64, f64)>,
        mask: Option<&Mask>,
    ) -> Self {
        Self {
            geometry: geometry.fingerprint(),
            method,
            unit,
            radial,
            azimuthal: None,
            azimuth_range: range_bits(azimuth_range),
            mask: mask.map(Mask::fingerprint),
        }
    }

    /// Key of a 2-D mapping.
    #[must_use]
    pub fn radial_azimuthal(
        geometry: &Geometry,
        method: SplitMethod,
        unit: RadialUnit,
        radial: AxisSpec,
        azimuthal: AxisSpec,
        mask: Option<&Mask>,
    ) -> Self {
        Self {
            geometry: geometry.fingerprint(),
            method,
            unit,
            radial,
            azimuthal: Some(azimuthal),
            azimuth_range: None,
            mask: mask.map(Mask::fingerprint),
        }
    }
}

/// Cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStatistics {
    /// Requests served from a finished mapping.
    pub hits: u64,
    /// Mappings built.
    pub builds: u64,
    /// Entries dropped to respect the capacity.
    pub evictions: u64,
    /// Entries currently held.
    pub entries: usize,
}

type Slot = Arc<Mutex<Option<Arc<SparseMapping>>>>;

struct Entry {
    slot: Slot,
    last_used: u64,
}

#[derive(Default)]
struct State {
    entries: HashMap<MappingKey, Entry>,
    clock: u64,
}

/// Thread-safe least-recently-used mapping cache.
pub struct MappingCache {
    capacity: usize,
    state: Mutex<State>,
    hits: AtomicU64,
    builds: AtomicU64,
    evictions: AtomicU64,
}

impl Default for MappingCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl std::fmt::Debug for MappingCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappingCache")
            .field("capacity", &self.capacity)
            .field("statistics", &self.statistics())
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MappingCache {
    /// Creates a cache holding at most `capacity` mappings (at least one).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            state: Mutex::new(State::default()),
            hits: AtomicU64::new(0),
            builds: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Maximum number of entries.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of entries currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.state).entries.len()
    }

    /// Returns true when nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `key` is currently cached.
    #[must_use]
    pub fn contains(&self, key: &MappingKey) -> bool {
        lock(&self.state).entries.contains_key(key)
    }

    /// Drops every entry. Mappings still held by callers stay alive.
    pub fn clear(&self) {
        lock(&self.state).entries.clear();
    }

    /// Current counters.
    #[must_use]
    pub fn statistics(&self) -> CacheStatistics {
        CacheStatistics {
            hits: self.hits.load(Ordering::Relaxed),
            builds: self.builds.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }

    /// Returns the mapping for `key`, building it with `build` on a miss.
    ///
    /// # Errors
    /// Propagates the error of `build`; the failed key is not cached.
    pub fn get_or_build<F>(&self, key: MappingKey, build: F) -> Result<Arc<SparseMapping>>
    where
        F: FnOnce() -> Result<SparseMapping>,
    {
        let slot = self.touch(&key);

        let mut guard = lock(&slot);
        if let Some(mapping) = guard.as_ref() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            log::trace!("mapping cache hit");
            return Ok(Arc::clone(mapping));
        }
        match build() {
            Ok(mapping) => {
                let mapping = Arc::new(mapping);
                *guard = Some(Arc::clone(&mapping));
                self.builds.fetch_add(1, Ordering::Relaxed);
                Ok(mapping)
            }
            Err(err) => {
                drop(guard);
                let mut state = lock(&self.state);
                if state
                    .entries
                    .get(&key)
                    .is_some_and(|e| Arc::ptr_eq(&e.slot, &slot))
                {
                    state.entries.remove(&key);
                }
                Err(err)
            }
        }
    }

    /// Finds or inserts the slot of `key`, marks it used and evicts the
    /// least recently used entries above capacity.
    fn touch(&self, key: &MappingKey) -> Slot {
        let mut state = lock(&self.state);
        state.clock += 1;
        let now = state.clock;
        let slot = {
            let entry = state.entries.entry(key.clone()).or_insert_with(|| Entry {
                slot: Arc::new(Mutex::new(None)),
                last_used: now,
            });
            entry.last_used = now;
            Arc::clone(&entry.slot)
        };
        while state.entries.len() > self.capacity {
            let oldest = state
                .entries
                .iter()
                .filter(|(k, _)| *k != key)
                .min_by_key(|(_, e)| e.last_used)
                .map(|(k, _)| k.clone());
            let Some(oldest) = oldest else { break };
            state.entries.remove(&oldest);
            self.evictions.fetch_add(1, Ordering::Relaxed);
            log::debug!("evicted mapping, {} entries left", state.entries.len());
        }
        slot
    }
}
