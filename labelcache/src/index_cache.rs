use std::path::Path;
use std::sync::{Arc, Mutex};

use lru::LruCache;
use serde_json::Value;

use crate::blob_key::BlobKey;
use crate::error::IndexError;
use crate::geometry::BoundingBox;
use crate::index_builder::{build_index, IndexEntry};

struct State {
    entries: LruCache<BlobKey, Arc<IndexEntry>>,
    total_memory_mb: f64,
}

/// Bounded in-memory LRU of spatial indexes, one per cached annotation file.
/// Two eviction bounds are enforced jointly: entry count and aggregate
/// estimated memory. Building a new index is not single-flighted: concurrent
/// first-queries for the same key may redundantly parse, which is acceptable
/// because parsing is CPU-bound and rare (see DESIGN.md).
pub struct IndexCache {
    max_indexes: usize,
    max_memory_mb: f64,
    state: Mutex<State>,
}

impl IndexCache {
    pub fn new(max_indexes: usize, max_memory_mb: f64) -> Self {
        Self {
            max_indexes,
            max_memory_mb,
            state: Mutex::new(State {
                entries: LruCache::unbounded(),
                total_memory_mb: 0.0,
            }),
        }
    }

    /// Returns the existing entry (bumped to MRU) or builds one from
    /// `local_path`. CPU-bound work is the caller's responsibility to offload
    /// (see `QueryService`, which dispatches via `spawn_blocking`).
    pub fn get_or_build(
        &self,
        key: &BlobKey,
        local_path: &Path,
    ) -> Result<Arc<IndexEntry>, IndexError> {
        {
            let mut state = self.state.lock().unwrap();
            if let Some(entry) = state.entries.get(key) {
                entry.touch();
                return Ok(entry.clone());
            }
        }

        let entry = Arc::new(build_index(local_path, self.max_memory_mb)?);

        let mut state = self.state.lock().unwrap();
        // lost the race against a concurrent builder for the same key: keep
        // whichever is already resident rather than double counting memory.
        if let Some(existing) = state.entries.get(key) {
            existing.touch();
            return Ok(existing.clone());
        }
        state.total_memory_mb += entry.memory_estimate_mb;
        state.entries.put(key.clone(), entry.clone());
        evict_if_needed(&mut state, self.max_indexes, self.max_memory_mb);
        Ok(entry)
    }

    /// Labels whose stored bbox intersects `bbox`. Empty if `key` is not
    /// present; callers must ensure the index was built first.
    pub fn query(&self, key: &BlobKey, bbox: BoundingBox) -> Vec<Value> {
        let mut state = self.state.lock().unwrap();
        match state.entries.get(key) {
            Some(entry) => {
                entry.touch();
                entry.query(bbox)
            }
            None => Vec::new(),
        }
    }

    pub fn invalidate(&self, key: &BlobKey) {
        let mut state = self.state.lock().unwrap();
        if let Some(entry) = state.entries.pop(key) {
            state.total_memory_mb -= entry.memory_estimate_mb;
        }
    }

    pub fn contains(&self, key: &BlobKey) -> bool {
        self.state.lock().unwrap().entries.contains(key)
    }

    pub fn stats(&self) -> (u64, u64, f64) {
        let state = self.state.lock().unwrap();
        let indexed_count = state.entries.len() as u64;
        let total_labels = state
            .entries
            .iter()
            .map(|(_, v)| v.label_count as u64)
            .sum();
        (indexed_count, total_labels, state.total_memory_mb)
    }
}

fn evict_if_needed(state: &mut State, max_indexes: usize, max_memory_mb: f64) {
    while (state.entries.len() > max_indexes || state.total_memory_mb > max_memory_mb)
        && !state.entries.is_empty()
    {
        if let Some((key, entry)) = state.entries.pop_lru() {
            state.total_memory_mb -= entry.memory_estimate_mb;
            log::info!("evicted index {key}");
        } else {
            break;
        }
    }
}
