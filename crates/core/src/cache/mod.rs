//! Shared two-segment (SLRU) track cache, indexed by a splay tree per segment.
//!
//! One [`TrackCache`] is shared across every unit. Lookups and stores are keyed by
//! `(unit_id, track)`; entries live in a flat arena and move between the probationary and
//! protected segments as they're re-accessed, exactly as described for the engine in
//! [`crate::unit`]. HD media never participates (the engine only consults the cache for DD
//! units), so every entry is exactly one DD track in size.

mod entry;
mod list;
mod splay;

use entry::{CacheEntry, NodeId, Segment, key_for};
use list::{IntrusiveList, SegmentLinks, UnitLinks};
use splay::SplayTree;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::{debug, trace};

use crate::geometry::DriveKind;

/// How [`TrackCache::store`] should behave when the key is not already present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreMode {
    /// Allocate a fresh entry (evicting if necessary) when the key is absent.
    Allocate,
    /// Do nothing when the key is absent; only refresh an entry that already exists.
    UpdateOnly,
}

/// Every entry's payload size: one DD track. The cache is never consulted for HD media.
const ENTRY_BYTES: usize = DriveKind::Dd.track_bytes();

struct Inner {
    arena: Vec<CacheEntry>,
    free: Vec<NodeId>,
    max_bytes: usize,
    protected_limit: usize,
    splay_probation: SplayTree,
    splay_protected: SplayTree,
    list_probation: IntrusiveList<SegmentLinks>,
    list_protected: IntrusiveList<SegmentLinks>,
    unit_lists: HashMap<u32, IntrusiveList<UnitLinks>>,
}

impl Inner {
    fn new(max_bytes: usize) -> Self {
        let max_nodes = max_bytes / ENTRY_BYTES;
        Self {
            arena: Vec::new(),
            free: Vec::new(),
            max_bytes,
            protected_limit: protected_limit_for(max_nodes),
            splay_probation: SplayTree::default(),
            splay_protected: SplayTree::default(),
            list_probation: IntrusiveList::default(),
            list_protected: IntrusiveList::default(),
            unit_lists: HashMap::new(),
        }
    }

    fn max_nodes(&self) -> usize {
        self.max_bytes / ENTRY_BYTES
    }

    fn live_nodes(&self) -> usize {
        self.list_probation.len() + self.list_protected.len()
    }

    fn bytes_allocated(&self) -> usize {
        self.live_nodes() * ENTRY_BYTES
    }

    /// Looks up `key` in protected first, then probationary. Returns the node id and which
    /// segment it was found in, without mutating segment membership (promotion is the caller's
    /// job, since it differs between `lookup` and `store`).
    fn find(&mut self, key: u64) -> Option<(NodeId, Segment)> {
        if let Some(id) = self.splay_protected.find(&mut self.arena, key) {
            return Some((id, Segment::Protected));
        }
        if let Some(id) = self.splay_probation.find(&mut self.arena, key) {
            return Some((id, Segment::Probationary));
        }
        None
    }

    /// Promotes `id` from probationary to protected, demoting protected's LRU entries back to
    /// probationary until the segment is back within `protected_limit`.
    fn promote(&mut self, id: NodeId) {
        self.splay_probation.remove(&mut self.arena, id);
        self.list_probation.remove(&mut self.arena, id);

        self.arena[id].segment = Segment::Protected;
        self.splay_protected.insert(&mut self.arena, id);
        self.list_protected.push_back(&mut self.arena, id);

        while self.list_protected.len() > self.protected_limit {
            let Some(demote) = self.list_protected.pop_front(&mut self.arena) else {
                break;
            };
            self.splay_protected.remove(&mut self.arena, demote);
            self.arena[demote].segment = Segment::Probationary;
            self.splay_probation.insert(&mut self.arena, demote);
            self.list_probation.push_back(&mut self.arena, demote);
        }
    }

    /// Unlinks `id` from whichever segment it's in and returns it to the free pool.
    fn retire(&mut self, id: NodeId) {
        match self.arena[id].segment {
            Segment::Probationary => {
                self.splay_probation.remove(&mut self.arena, id);
                self.list_probation.remove(&mut self.arena, id);
            }
            Segment::Protected => {
                self.splay_protected.remove(&mut self.arena, id);
                self.list_protected.remove(&mut self.arena, id);
            }
        }
        let unit_id = self.arena[id].unit_id;
        if let Some(backrefs) = self.unit_lists.get_mut(&unit_id) {
            backrefs.remove(&mut self.arena, id);
        }
        self.free.push(id);
    }

    /// Evicts one entry to make room: probationary LRU first, then protected LRU. Returns the
    /// recycled node id, or `None` if the cache holds nothing evictable.
    fn evict_one(&mut self) -> Option<NodeId> {
        let victim = self
            .list_probation
            .front()
            .or_else(|| self.list_protected.front())?;
        self.retire(victim);
        Some(victim)
    }

    /// Obtains a node id ready to hold a fresh entry: reuse a free slot, grow the arena if under
    /// budget, or evict the global LRU.
    fn acquire_slot(&mut self) -> Option<NodeId> {
        if let Some(id) = self.free.pop() {
            return Some(id);
        }
        if self.live_nodes() < self.max_nodes() {
            self.arena.push(CacheEntry::new(
                0,
                0,
                vec![0u8; ENTRY_BYTES],
                Segment::Probationary,
            ));
            return Some(self.arena.len() - 1);
        }
        self.evict_one()
    }

    fn insert_new(&mut self, unit_id: u32, key: u64, payload: &[u8]) {
        let Some(id) = self.acquire_slot() else {
            return;
        };
        let entry = &mut self.arena[id];
        entry.key = key;
        entry.unit_id = unit_id;
        entry.segment = Segment::Probationary;
        entry.payload.copy_from_slice(payload);
        entry.checksum = crate::common::checksum::Checksum::compute(payload);

        self.splay_probation.insert(&mut self.arena, id);
        self.list_probation.push_back(&mut self.arena, id);
        self.unit_lists
            .entry(unit_id)
            .or_default()
            .push_back(&mut self.arena, id);
    }

    fn invalidate_unit(&mut self, unit_id: u32) {
        let Some(mut backrefs) = self.unit_lists.remove(&unit_id) else {
            return;
        };
        while let Some(id) = backrefs.pop_front(&mut self.arena) {
            match self.arena[id].segment {
                Segment::Probationary => {
                    self.splay_probation.remove(&mut self.arena, id);
                    self.list_probation.remove(&mut self.arena, id);
                }
                Segment::Protected => {
                    self.splay_protected.remove(&mut self.arena, id);
                    self.list_protected.remove(&mut self.arena, id);
                }
            }
            self.free.push(id);
        }
    }

    fn try_reclaim(&mut self, bytes: usize) -> usize {
        let target = bytes.div_ceil(ENTRY_BYTES);
        let mut freed = 0;
        while freed < target && self.evict_one().is_some() {
            freed += 1;
        }
        freed * ENTRY_BYTES
    }

    fn resize(&mut self, new_max_bytes: usize) {
        self.max_bytes = new_max_bytes;
        let max_nodes = self.max_nodes();
        self.protected_limit = protected_limit_for(max_nodes);

        if self.protected_limit == 0 {
            while self.evict_one().is_some() {}
            self.max_bytes = 0;
            return;
        }

        while self.live_nodes() > max_nodes {
            if self.evict_one().is_none() {
                break;
            }
        }
        while self.list_protected.len() > self.protected_limit {
            let Some(demote) = self.list_protected.pop_front(&mut self.arena) else {
                break;
            };
            self.splay_protected.remove(&mut self.arena, demote);
            self.arena[demote].segment = Segment::Probationary;
            self.splay_probation.insert(&mut self.arena, demote);
            self.list_probation.push_back(&mut self.arena, demote);
        }
    }
}

/// `protected_limit = ceil(max_nodes * 2 / 3)`, forced to zero when capacity is too small to
/// make segmentation meaningful.
fn protected_limit_for(max_nodes: usize) -> usize {
    if max_nodes < 8 {
        0
    } else {
        (max_nodes * 2).div_ceil(3)
    }
}

/// The shared, thread-safe track cache.
pub struct TrackCache {
    inner: Mutex<Inner>,
}

impl std::fmt::Debug for TrackCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackCache").finish_non_exhaustive()
    }
}

impl TrackCache {
    /// Builds a cache capped at `max_bytes`, rounded down to a whole number of DD-track entries.
    #[must_use]
    pub fn new(max_bytes: usize) -> Self {
        Self {
            inner: Mutex::new(Inner::new(max_bytes)),
        }
    }

    /// Looks up `(unit_id, track)`. On a checksum mismatch the entry is invalidated and this
    /// reports a miss rather than returning corrupted data.
    #[must_use]
    pub fn lookup(&self, unit_id: u32, track: u32, out: &mut [u8]) -> bool {
        debug_assert_eq!(out.len(), ENTRY_BYTES);
        let key = key_for(unit_id, track);
        #[allow(clippy::unwrap_used)]
        let mut inner = self.inner.lock().unwrap();

        let Some((id, segment)) = inner.find(key) else {
            return false;
        };

        let expected = crate::common::checksum::Checksum::compute(&inner.arena[id].payload);
        if expected != inner.arena[id].checksum {
            trace!(unit_id, track, "cache payload checksum mismatch, evicting");
            inner.retire(id);
            return false;
        }

        out.copy_from_slice(&inner.arena[id].payload);
        match segment {
            Segment::Probationary => inner.promote(id),
            Segment::Protected => inner.list_protected.move_to_back(&mut inner.arena, id),
        }
        true
    }

    /// Stores `data` for `(unit_id, track)` per `mode`. An existing entry is overwritten in
    /// place and keeps its segment; a new entry is only allocated when `mode` is
    /// [`StoreMode::Allocate`].
    pub fn store(&self, unit_id: u32, track: u32, data: &[u8], mode: StoreMode) {
        debug_assert_eq!(data.len(), ENTRY_BYTES);
        let key = key_for(unit_id, track);
        #[allow(clippy::unwrap_used)]
        let mut inner = self.inner.lock().unwrap();

        if let Some((id, _)) = inner.find(key) {
            inner.arena[id].restore(data);
            return;
        }
        if mode == StoreMode::UpdateOnly {
            return;
        }
        inner.insert_new(unit_id, key, data);
    }

    /// Removes `(unit_id, track)` from the cache if present.
    pub fn invalidate(&self, unit_id: u32, track: u32) {
        let key = key_for(unit_id, track);
        #[allow(clippy::unwrap_used)]
        let mut inner = self.inner.lock().unwrap();
        if let Some((id, _)) = inner.find(key) {
            inner.retire(id);
        }
    }

    /// Removes every entry belonging to `unit_id`, in time proportional to that unit's entry
    /// count.
    pub fn invalidate_unit(&self, unit_id: u32) {
        #[allow(clippy::unwrap_used)]
        let mut inner = self.inner.lock().unwrap();
        inner.invalidate_unit(unit_id);
    }

    /// Frees least-recently-used entries until at least `bytes` worth have been reclaimed, or
    /// the cache is empty. Never blocks: if the lock is already held, does nothing and returns
    /// `0`. Safe to call from a memory-pressure callback.
    pub fn try_reclaim(&self, bytes: usize) -> usize {
        let Ok(mut inner) = self.inner.try_lock() else {
            return 0;
        };
        let freed = inner.try_reclaim(bytes);
        if freed > 0 {
            debug!(freed, "cache reclaimed bytes under memory pressure");
        }
        freed
    }

    /// Resizes the cache to `new_max_bytes`, evicting if necessary. A `protected_limit` that
    /// would fall below 8 slots disables the cache entirely (matching [`Self::new`]'s rounding).
    pub fn resize(&self, new_max_bytes: usize) {
        #[allow(clippy::unwrap_used)]
        let mut inner = self.inner.lock().unwrap();
        inner.resize(new_max_bytes);
    }

    /// Whether the image fits wholly within the cache's current budget, for the media-insert
    /// prefill decision in [`crate::unit::engine`].
    #[must_use]
    pub fn fits(&self, total_bytes: usize) -> bool {
        #[allow(clippy::unwrap_used)]
        let inner = self.inner.lock().unwrap();
        inner.max_bytes > 0 && total_bytes <= inner.max_bytes
    }
}
