use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::sync::Mutex;
use std::time::Instant;

use flate2::read::GzDecoder;
use rstar::{RTree, RTreeObject, AABB};
use serde_json::Value;

use crate::error::IndexError;
use crate::geometry::{extract_bbox, BoundingBox};

/// One label's bbox, spatially indexed by position in `IndexEntry::labels`.
#[derive(Debug, Clone, Copy)]
pub(crate) struct IndexedRect {
    pub id: usize,
    pub envelope: AABB<[f64; 2]>,
}

impl RTreeObject for IndexedRect {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

fn to_envelope(bbox: BoundingBox) -> AABB<[f64; 2]> {
    AABB::from_corners([bbox.min_x, bbox.min_y], [bbox.max_x, bbox.max_y])
}

pub struct IndexEntry {
    pub labels: Vec<Value>,
    pub(crate) tree: RTree<IndexedRect>,
    pub label_count: usize,
    pub memory_estimate_mb: f64,
    last_accessed: Mutex<Instant>,
}

impl IndexEntry {
    pub fn last_accessed(&self) -> Instant {
        *self.last_accessed.lock().unwrap()
    }

    pub fn touch(&self) {
        *self.last_accessed.lock().unwrap() = Instant::now();
    }

    /// Labels whose stored bbox intersects `bbox` (closed intervals), in
    /// insertion order.
    pub fn query(&self, bbox: BoundingBox) -> Vec<Value> {
        let query_envelope = to_envelope(bbox);
        let mut hits: Vec<_> = self
            .tree
            .locate_in_envelope_intersecting(&query_envelope)
            .map(|item| item.id)
            .collect();
        hits.sort_unstable();
        hits.into_iter()
            .map(|id| self.labels[id].clone())
            .collect()
    }
}

fn estimate_memory_mb(file_len: u64, is_gzip: bool) -> f64 {
    let multiplier = if is_gzip { 8.0 } else { 2.0 };
    (file_len as f64) * multiplier / (1024.0 * 1024.0)
}

fn read_labels(local_path: &Path) -> Result<Vec<Value>, IndexError> {
    let file = File::open(local_path)?;
    let is_gzip = local_path
        .extension()
        .map(|ext| ext == "gz")
        .unwrap_or(false);

    let mut contents = String::new();
    if is_gzip {
        GzDecoder::new(BufReader::new(file)).read_to_string(&mut contents)?;
    } else {
        BufReader::new(file).read_to_string(&mut contents)?;
    }

    let doc: Value =
        serde_json::from_str(&contents).map_err(|e| IndexError::Parse(e.to_string()))?;

    let labels = match doc {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("labels") {
            Some(Value::Array(items)) => items,
            Some(_) => return Err(IndexError::Parse("`labels` field is not an array".into())),
            None => return Err(IndexError::Parse("missing top-level `labels` field".into())),
        },
        _ => return Err(IndexError::Parse("expected a JSON array or object".into())),
    };
    Ok(labels)
}

/// Parses a cached annotation file and builds its spatial index. `max_memory_mb`
/// is the cap against which a single oversized entry is rejected before ever
/// being inserted into the cache (see `IndexCache::get_or_build`).
pub fn build_index(local_path: &Path, max_memory_mb: f64) -> Result<IndexEntry, IndexError> {
    let file_len = std::fs::metadata(local_path)?.len();
    let is_gzip = local_path
        .extension()
        .map(|ext| ext == "gz")
        .unwrap_or(false);
    let memory_estimate_mb = estimate_memory_mb(file_len, is_gzip);
    if memory_estimate_mb > max_memory_mb {
        return Err(IndexError::OutOfMemory {
            estimate_mb: memory_estimate_mb,
            cap_mb: max_memory_mb,
        });
    }

    let labels = read_labels(local_path)?;
    let rects: Vec<IndexedRect> = labels
        .iter()
        .enumerate()
        .filter_map(|(id, label)| {
            extract_bbox(label).map(|bbox| IndexedRect {
                id,
                envelope: to_envelope(bbox),
            })
        })
        .collect();

    let label_count = labels.len();
    Ok(IndexEntry {
        labels,
        tree: RTree::bulk_load(rects),
        label_count,
        memory_estimate_mb,
        last_accessed: Mutex::new(Instant::now()),
    })
}
