//! Byte-budgeted LRU cache of decoded slice planes.
//!
//! Planes are shared as `Arc<SlicePlane>` so a reader never observes a
//! partially written plane, and dropping an entry from the cache never
//! invalidates a plane somebody is still reading.
//!
//! Two markers protect in-flight work:
//! - *loading*: an index currently being decoded. Other readers block on a
//!   condition variable until the load finishes instead of loading it again,
//!   and the index is never chosen for eviction.
//! - *pinned*: an index referenced by a live [`SlicePin`]. Pinned entries are
//!   skipped by LRU eviction.
//!
//! Resident bytes never exceed the budget. When no room can be made the plane
//! is handed to the caller without being cached.
use super::SlicePlane;
use crate::error::{Result, SegmentationError};
use log::{debug, warn};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::ops::Deref;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

/// Default cache ceiling: 1 GiB.
pub const DEFAULT_CACHE_BUDGET: usize = 1 << 30;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    /// Planes returned to the caller without being cached.
    pub bypassed: u64,
}

struct CacheEntry {
    plane: Arc<SlicePlane>,
    bytes: usize,
    last_used: u64,
}

struct CacheState {
    budget: usize,
    resident: usize,
    tick: u64,
    entries: HashMap<usize, CacheEntry>,
    loading: HashSet<usize>,
    pins: HashMap<usize, usize>,
    stats: CacheStats,
}

impl CacheState {
    fn touch(&mut self, index: usize) -> Option<Arc<SlicePlane>> {
        self.tick += 1;
        let tick = self.tick;
        let entry = self.entries.get_mut(&index)?;
        entry.last_used = tick;
        Some(Arc::clone(&entry.plane))
    }

    fn is_evictable(&self, index: usize) -> bool {
        !self.pins.contains_key(&index) && !self.loading.contains(&index)
    }

    fn lru_victim(&self, exclude: Option<usize>) -> Option<usize> {
        self.entries
            .iter()
            .filter(|(idx, _)| Some(**idx) != exclude && self.is_evictable(**idx))
            .min_by_key(|(idx, e)| (e.last_used, **idx))
            .map(|(idx, _)| *idx)
    }

    fn remove(&mut self, index: usize) {
        if let Some(entry) = self.entries.remove(&index) {
            self.resident -= entry.bytes;
            self.stats.evictions += 1;
        }
    }

    /// Evict unpinned entries until `incoming` more bytes fit under the budget.
    fn make_room(&mut self, incoming: usize, exclude: Option<usize>) -> bool {
        if incoming > self.budget {
            return false;
        }
        while self.resident + incoming > self.budget {
            match self.lru_victim(exclude) {
                Some(victim) => {
                    debug!("slice cache: evicting slice {victim}");
                    self.remove(victim);
                }
                None => return false,
            }
        }
        true
    }

    fn insert(&mut self, index: usize, plane: Arc<SlicePlane>) {
        let bytes = plane.byte_size();
        if !self.make_room(bytes, Some(index)) {
            self.stats.bypassed += 1;
            debug!(
                "slice cache: slice {index} ({bytes} B) not cached, budget {} B",
                self.budget
            );
            return;
        }
        self.tick += 1;
        self.resident += bytes;
        self.entries.insert(
            index,
            CacheEntry {
                plane,
                bytes,
                last_used: self.tick,
            },
        );
        debug_assert!(self.resident <= self.budget);
    }

    fn pin(&mut self, index: usize) {
        *self.pins.entry(index).or_insert(0) += 1;
    }

    fn unpin(&mut self, index: usize) {
        if let Some(count) = self.pins.get_mut(&index) {
            *count -= 1;
            if *count == 0 {
                self.pins.remove(&index);
            }
        }
    }
}

pub struct SliceCache {
    state: Mutex<CacheState>,
    loaded: Condvar,
}

impl Default for SliceCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_BUDGET)
    }
}

impl SliceCache {
    pub fn new(budget: usize) -> Self {
        Self {
            state: Mutex::new(CacheState {
                budget,
                resident: 0,
                tick: 0,
                entries: HashMap::new(),
                loading: HashSet::new(),
                pins: HashMap::new(),
                stats: CacheStats::default(),
            }),
            loaded: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Return the cached plane for `index`, running `loader` on a miss.
    pub fn get_or_load<F>(&self, index: usize, loader: F) -> Result<Arc<SlicePlane>>
    where
        F: FnOnce() -> Result<SlicePlane>,
    {
        self.acquire(index, loader, false)
    }

    /// Like [`get_or_load`](Self::get_or_load) but keeps `index` out of
    /// eviction until the returned guard is dropped.
    pub fn pin<F>(&self, index: usize, loader: F) -> Result<SlicePin<'_>>
    where
        F: FnOnce() -> Result<SlicePlane>,
    {
        let plane = self.acquire(index, loader, true)?;
        Ok(SlicePin {
            cache: self,
            index,
            plane,
        })
    }

    fn acquire<F>(&self, index: usize, loader: F, pin: bool) -> Result<Arc<SlicePlane>>
    where
        F: FnOnce() -> Result<SlicePlane>,
    {
        let mut state = self.lock();
        loop {
            if let Some(plane) = state.touch(index) {
                state.stats.hits += 1;
                if pin {
                    state.pin(index);
                }
                return Ok(plane);
            }
            if !state.loading.contains(&index) {
                break;
            }
            state = self.loaded.wait(state).unwrap_or_else(|e| e.into_inner());
        }
        state.loading.insert(index);
        state.stats.misses += 1;
        drop(state);

        let mut marker = LoadMarker {
            cache: self,
            index,
            finished: false,
        };
        let loaded = loader();

        let mut state = self.lock();
        state.loading.remove(&index);
        marker.finished = true;
        let result = loaded.map(|plane| {
            let plane = Arc::new(plane);
            if pin {
                state.pin(index);
            }
            state.insert(index, Arc::clone(&plane));
            plane
        });
        drop(state);
        self.loaded.notify_all();
        result
    }

    /// Change the byte ceiling, evicting immediately when over it.
    ///
    /// Unpinned entries go first in LRU order. If pinned entries alone still
    /// exceed the new ceiling they are dropped from residency as well; their
    /// holders keep reading through their own `Arc`.
    pub fn set_budget(&self, bytes: usize) {
        let mut state = self.lock();
        state.budget = bytes;
        while state.resident > state.budget {
            if let Some(victim) = state.lru_victim(None) {
                state.remove(victim);
                continue;
            }
            let pinned = state
                .entries
                .iter()
                .filter(|(idx, _)| !state.loading.contains(*idx))
                .min_by_key(|(idx, e)| (e.last_used, **idx))
                .map(|(idx, _)| *idx);
            match pinned {
                Some(victim) => {
                    warn!("slice cache: budget shrink detaches pinned slice {victim}");
                    state.remove(victim);
                }
                None => break,
            }
        }
    }

    pub fn budget(&self) -> usize {
        self.lock().budget
    }

    pub fn resident_bytes(&self) -> usize {
        self.lock().resident
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, index: usize) -> bool {
        self.lock().entries.contains_key(&index)
    }

    pub fn is_pinned(&self, index: usize) -> bool {
        self.lock().pins.contains_key(&index)
    }

    pub fn stats(&self) -> CacheStats {
        self.lock().stats
    }

    /// Verify the residency invariant.
    pub fn check_budget(&self) -> Result<()> {
        let state = self.lock();
        if state.resident > state.budget {
            return Err(SegmentationError::CacheOverBudget {
                resident: state.resident,
                budget: state.budget,
            });
        }
        Ok(())
    }

    fn release(&self, index: usize) {
        self.lock().unpin(index);
    }
}

/// Clears the loading marker if the loader unwinds, so waiters can retry.
struct LoadMarker<'a> {
    cache: &'a SliceCache,
    index: usize,
    finished: bool,
}

impl Drop for LoadMarker<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.cache.lock().loading.remove(&self.index);
            self.cache.loaded.notify_all();
        }
    }
}

/// Scoped read access to a slice plane. The slice stays ineligible for LRU
/// eviction while the pin is alive.
pub struct SlicePin<'a> {
    cache: &'a SliceCache,
    index: usize,
    plane: Arc<SlicePlane>,
}

impl SlicePin<'_> {
    pub fn index(&self) -> usize {
        self.index
    }
}

impl Deref for SlicePin<'_> {
    type Target = SlicePlane;

    fn deref(&self) -> &SlicePlane {
        &self.plane
    }
}

impl Drop for SlicePin<'_> {
    fn drop(&mut self) {
        self.cache.release(self.index);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    // 4x4 f32 plane = 64 bytes
    fn plane(value: f32) -> SlicePlane {
        SlicePlane::from_vec(4, 4, vec![value; 16]).unwrap()
    }

    #[test]
    fn evicts_least_recently_used_within_budget() {
        let cache = SliceCache::new(128);
        for i in 0..2 {
            cache.get_or_load(i, || Ok(plane(i as f32))).unwrap();
        }
        // Touch 0 so that 1 becomes the LRU entry.
        cache.get_or_load(0, || panic!("cached")).unwrap();
        cache.get_or_load(2, || Ok(plane(2.0))).unwrap();
        assert!(cache.contains(0));
        assert!(!cache.contains(1));
        assert!(cache.contains(2));
        assert!(cache.resident_bytes() <= cache.budget());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn resident_bytes_never_exceed_budget() {
        let cache = SliceCache::new(200);
        for i in 0..50usize {
            let idx = (i * 7) % 11;
            cache.get_or_load(idx, || Ok(plane(idx as f32))).unwrap();
            assert!(cache.resident_bytes() <= 200);
            cache.check_budget().unwrap();
        }
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn pinned_slice_survives_pressure() {
        let cache = SliceCache::new(128);
        let pin = cache.pin(0, || Ok(plane(0.0))).unwrap();
        for i in 1..6 {
            cache.get_or_load(i, || Ok(plane(i as f32))).unwrap();
        }
        assert!(cache.contains(0));
        assert!(cache.is_pinned(0));
        assert_eq!(pin.get(0, 0), 0.0);
        drop(pin);
        assert!(!cache.is_pinned(0));
        cache.get_or_load(10, || Ok(plane(1.0))).unwrap();
        cache.get_or_load(11, || Ok(plane(1.0))).unwrap();
        assert!(!cache.contains(0));
    }

    #[test]
    fn oversized_plane_is_returned_but_not_cached() {
        let cache = SliceCache::new(32);
        let p = cache.get_or_load(3, || Ok(plane(3.0))).unwrap();
        assert_eq!(p.get(1, 1), 3.0);
        assert!(!cache.contains(3));
        assert_eq!(cache.resident_bytes(), 0);
        assert_eq!(cache.stats().bypassed, 1);
    }

    #[test]
    fn failed_load_is_reported_and_retried() {
        let cache = SliceCache::new(1024);
        let err = cache
            .get_or_load(1, || Err(SegmentationError::Image("broken".into())))
            .unwrap_err();
        assert!(matches!(err, SegmentationError::Image(_)));
        let p = cache.get_or_load(1, || Ok(plane(1.0))).unwrap();
        assert_eq!(p.get(0, 0), 1.0);
    }

    #[test]
    fn shrinking_budget_evicts_immediately() {
        let cache = SliceCache::new(1024);
        for i in 0..4 {
            cache.get_or_load(i, || Ok(plane(i as f32))).unwrap();
        }
        assert_eq!(cache.resident_bytes(), 256);
        cache.set_budget(100);
        assert!(cache.resident_bytes() <= 100);
        assert!(cache.contains(3));
    }

    #[test]
    fn concurrent_readers_load_once() {
        let cache = Arc::new(SliceCache::new(1024));
        let loads = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let loads = Arc::clone(&loads);
                thread::spawn(move || {
                    let p = cache
                        .get_or_load(5, || {
                            loads.fetch_add(1, Ordering::SeqCst);
                            thread::sleep(Duration::from_millis(20));
                            Ok(plane(5.0))
                        })
                        .unwrap();
                    assert_eq!(p.get(3, 3), 5.0);
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }
}
