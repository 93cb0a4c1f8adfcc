use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use lru::LruCache;
use tokio::fs;

use crate::blob_key::BlobKey;
use crate::error::BlobError;
use crate::object_store::ObjectFetcher;

struct Accounting {
    lru: LruCache<BlobKey, u64>,
    total_bytes: u64,
}

/// Disk-backed read-through LRU of compressed annotation blobs. Downloads
/// for a given key are single-flighted: concurrent callers for a key not yet
/// on disk share one in-flight fetch.
pub struct BlobCache {
    cache_dir: PathBuf,
    max_bytes: u64,
    fetcher: Arc<dyn ObjectFetcher>,
    accounting: Mutex<Accounting>,
    download_locks: Mutex<HashMap<BlobKey, Arc<tokio::sync::Mutex<()>>>>,
}

impl BlobCache {
    pub fn new(cache_dir: PathBuf, max_bytes: u64, fetcher: Arc<dyn ObjectFetcher>) -> Self {
        Self {
            cache_dir,
            max_bytes,
            fetcher,
            accounting: Mutex::new(Accounting {
                lru: LruCache::unbounded(),
                total_bytes: 0,
            }),
            download_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Walks `cache_dir` for files left over from a previous run and
    /// registers them in LRU order, oldest access first. `.tmp` leftovers
    /// from an interrupted download are removed rather than adopted. Access
    /// time is preferred; when the filesystem doesn't track it (common with
    /// `noatime`), modification time is used instead.
    pub async fn reconcile_from_disk(&self) -> Result<(), BlobError> {
        fs::create_dir_all(&self.cache_dir).await?;
        let mut entries: Vec<(BlobKey, u64, SystemTime)> = Vec::new();
        let mut stack = vec![self.cache_dir.clone()];

        while let Some(dir) = stack.pop() {
            let mut read_dir = fs::read_dir(&dir).await?;
            while let Some(entry) = read_dir.next_entry().await? {
                let path = entry.path();
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    stack.push(path);
                    continue;
                }
                if path.extension().map(|e| e == "tmp").unwrap_or(false) {
                    let _ = fs::remove_file(&path).await;
                    continue;
                }
                let relative = match path.strip_prefix(&self.cache_dir) {
                    Ok(rel) => rel,
                    Err(_) => continue,
                };
                let Some(key) = BlobKey::new(relative.to_string_lossy().into_owned()) else {
                    continue;
                };
                let metadata = entry.metadata().await?;
                let stamp = metadata
                    .accessed()
                    .or_else(|_| metadata.modified())
                    .unwrap_or(SystemTime::UNIX_EPOCH);
                entries.push((key, metadata.len(), stamp));
            }
        }

        entries.sort_by_key(|(_, _, stamp)| *stamp);

        let evicted = {
            let mut accounting = self.accounting.lock().unwrap();
            for (key, len, _) in entries {
                accounting.lru.put(key, len);
                accounting.total_bytes += len;
            }
            pop_excess(&mut accounting, self.max_bytes)
        };
        remove_evicted(&self.cache_dir, evicted);
        Ok(())
    }

    /// Returns the local path of `key`, downloading it first if necessary.
    pub async fn get(&self, key: &BlobKey) -> Result<PathBuf, BlobError> {
        let local_path = key.local_path(&self.cache_dir);

        {
            let mut accounting = self.accounting.lock().unwrap();
            if accounting.lru.get(key).is_some() {
                return Ok(local_path);
            }
        }

        let lock = self.lock_for(key);
        let _guard = lock.lock().await;

        // a concurrent downloader may have finished while we waited.
        {
            let mut accounting = self.accounting.lock().unwrap();
            if accounting.lru.get(key).is_some() {
                return Ok(local_path);
            }
        }

        self.download(key, &local_path).await?;

        let len = fs::metadata(&local_path).await?.len();
        let evicted = {
            let mut accounting = self.accounting.lock().unwrap();
            accounting.lru.put(key.clone(), len);
            accounting.total_bytes += len;
            pop_excess(&mut accounting, self.max_bytes)
        };
        remove_evicted(&self.cache_dir, evicted);

        self.forget_lock(key);
        Ok(local_path)
    }

    async fn download(&self, key: &BlobKey, local_path: &Path) -> Result<(), BlobError> {
        if let Some(parent) = local_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let tmp_path = key.tmp_path(&self.cache_dir);

        let result = async {
            let mut file = fs::File::create(&tmp_path).await?;
            self.fetcher.fetch(key.as_str(), &mut file).await?;
            Ok::<(), BlobError>(())
        }
        .await;

        match result {
            Ok(()) => {
                fs::rename(&tmp_path, local_path).await?;
                Ok(())
            }
            Err(e) => {
                let _ = fs::remove_file(&tmp_path).await;
                Err(e)
            }
        }
    }

    /// Removes `key` from both the disk and the accounting structures, if
    /// present. Idempotent.
    pub async fn remove(&self, key: &BlobKey) {
        let existed = {
            let mut accounting = self.accounting.lock().unwrap();
            match accounting.lru.pop(key) {
                Some(len) => {
                    accounting.total_bytes -= len;
                    true
                }
                None => false,
            }
        };
        if existed {
            let _ = fs::remove_file(key.local_path(&self.cache_dir)).await;
        }
    }

    pub fn contains(&self, key: &BlobKey) -> bool {
        self.accounting.lock().unwrap().lru.contains(key)
    }

    pub fn stats(&self) -> (u64, u64) {
        let accounting = self.accounting.lock().unwrap();
        (accounting.lru.len() as u64, accounting.total_bytes)
    }

    fn lock_for(&self, key: &BlobKey) -> Arc<tokio::sync::Mutex<()>> {
        self.download_locks
            .lock()
            .unwrap()
            .entry(key.clone())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Drops the per-key lock entry once nobody else holds a clone, so the
    /// map doesn't grow without bound across the cache's lifetime.
    fn forget_lock(&self, key: &BlobKey) {
        let mut locks = self.download_locks.lock().unwrap();
        if let Some(lock) = locks.get(key) {
            if Arc::strong_count(lock) == 1 {
                locks.remove(key);
            }
        }
    }
}

/// Pops least-recently-used entries from `accounting` until `total_bytes` is
/// back under `max_bytes`, returning the popped keys. Pure bookkeeping under
/// the cache-wide mutex; no file I/O so the lock is held only briefly.
fn pop_excess(accounting: &mut Accounting, max_bytes: u64) -> Vec<BlobKey> {
    let mut evicted = Vec::new();
    while accounting.total_bytes > max_bytes {
        let Some((key, len)) = accounting.lru.pop_lru() else {
            break;
        };
        accounting.total_bytes -= len;
        evicted.push(key);
    }
    evicted
}

/// Deletes the files for already-evicted keys and prunes now-empty parent
/// directories. Called with the accounting mutex released.
fn remove_evicted(cache_dir: &Path, evicted: Vec<BlobKey>) {
    for key in evicted {
        let path = key.local_path(cache_dir);
        if let Err(e) = std::fs::remove_file(&path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                log::warn!("failed to remove evicted blob {key}: {e}");
            }
        }
        prune_empty_parents(cache_dir, &path);
        log::info!("evicted blob {key}");
    }
}

fn prune_empty_parents(cache_dir: &Path, removed_path: &Path) {
    let mut dir = removed_path.parent();
    while let Some(d) = dir {
        if d == cache_dir {
            break;
        }
        match std::fs::remove_dir(d) {
            Ok(()) => dir = d.parent(),
            Err(_) => break,
        }
    }
}
