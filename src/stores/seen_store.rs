//! Seen-Item Store - bounded, persisted record of posts already shown
//!
//! Ids are kept in insertion order. When capacity is exceeded the oldest
//! inserted ids are dropped first; re-marking an id never moves it. Every
//! change is written through to the backend, and a failed write only logs.

use std::collections::{HashSet, VecDeque};

use crate::config::FeedConfig;
use crate::errors::{FeedError, FeedResult};

/// Persistence backend for the seen set: one fixed key, one JSON array of ids
pub trait SeenBackend {
    fn load(&self) -> FeedResult<Vec<String>>;
    fn save(&self, ids: &[String]) -> FeedResult<()>;
}

/// In-memory backend. Clones share the same storage, so a second store built
/// on a clone behaves like a reload.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    data: std::rc::Rc<std::cell::RefCell<Option<String>>>,
    fail_writes: std::rc::Rc<std::cell::Cell<bool>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw JSON currently stored, if any
    pub fn raw(&self) -> Option<String> {
        self.data.borrow().clone()
    }

    pub fn set_raw(&self, json: impl Into<String>) {
        *self.data.borrow_mut() = Some(json.into());
    }

    /// Make every subsequent save fail, to exercise the warning path
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.set(fail);
    }
}

impl SeenBackend for MemoryBackend {
    fn load(&self) -> FeedResult<Vec<String>> {
        match self.data.borrow().as_deref() {
            Some(json) => Ok(serde_json::from_str(json)?),
            None => Ok(Vec::new()),
        }
    }

    fn save(&self, ids: &[String]) -> FeedResult<()> {
        if self.fail_writes.get() {
            return Err(FeedError::Persistence("memory backend is read-only".to_string()));
        }
        *self.data.borrow_mut() = Some(serde_json::to_string(ids)?);
        Ok(())
    }
}

/// JSON file backend for native hosts. The file name is the storage key.
#[cfg(not(target_arch = "wasm32"))]
pub struct FileBackend {
    path: std::path::PathBuf,
}

#[cfg(not(target_arch = "wasm32"))]
impl FileBackend {
    pub fn new(dir: impl AsRef<std::path::Path>, key: &str) -> Self {
        Self {
            path: dir.as_ref().join(format!("{}.json", key)),
        }
    }
}

#[cfg(not(target_arch = "wasm32"))]
impl SeenBackend for FileBackend {
    fn load(&self) -> FeedResult<Vec<String>> {
        match std::fs::read_to_string(&self.path) {
            Ok(json) => Ok(serde_json::from_str(&json)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(FeedError::Persistence(format!(
                "Failed to read {}: {}",
                self.path.display(),
                e
            ))),
        }
    }

    fn save(&self, ids: &[String]) -> FeedResult<()> {
        let json = serde_json::to_string(ids)?;
        std::fs::write(&self.path, json).map_err(|e| {
            FeedError::Persistence(format!("Failed to write {}: {}", self.path.display(), e))
        })
    }
}

/// Browser LocalStorage backend
#[cfg(target_arch = "wasm32")]
pub struct LocalStorageBackend {
    key: String,
}

#[cfg(target_arch = "wasm32")]
impl LocalStorageBackend {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

#[cfg(target_arch = "wasm32")]
impl SeenBackend for LocalStorageBackend {
    fn load(&self) -> FeedResult<Vec<String>> {
        use gloo_storage::{errors::StorageError, LocalStorage, Storage};

        match LocalStorage::get::<Vec<String>>(&self.key) {
            Ok(ids) => Ok(ids),
            Err(StorageError::KeyNotFound(_)) => Ok(Vec::new()),
            Err(e) => Err(FeedError::Persistence(e.to_string())),
        }
    }

    fn save(&self, ids: &[String]) -> FeedResult<()> {
        use gloo_storage::{LocalStorage, Storage};

        LocalStorage::set(&self.key, ids).map_err(|e| FeedError::Persistence(e.to_string()))
    }
}

pub struct SeenStore {
    order: VecDeque<String>,
    index: HashSet<String>,
    capacity: usize,
    backend: Box<dyn SeenBackend>,
}

impl SeenStore {
    /// Read the persisted set once. An unreadable backend starts empty.
    pub fn new(backend: Box<dyn SeenBackend>, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let mut store = Self {
            order: VecDeque::new(),
            index: HashSet::new(),
            capacity,
            backend,
        };

        match store.backend.load() {
            Ok(ids) => {
                for id in ids {
                    store.insert(id);
                }
                store.evict();
                log::debug!("Loaded {} seen posts from storage", store.order.len());
            }
            Err(e) => {
                log::warn!("Failed to load seen posts, starting empty: {}", e);
            }
        }

        store
    }

    pub fn with_memory(capacity: usize) -> Self {
        Self::new(Box::new(MemoryBackend::new()), capacity)
    }

    /// Store under the configured key in browser LocalStorage
    #[cfg(target_arch = "wasm32")]
    pub fn local_storage(config: &FeedConfig) -> Self {
        Self::new(
            Box::new(LocalStorageBackend::new(config.seen_storage_key.clone())),
            config.seen_capacity,
        )
    }

    /// Store under the configured key as a JSON file in `dir`
    #[cfg(not(target_arch = "wasm32"))]
    pub fn in_dir(dir: impl AsRef<std::path::Path>, config: &FeedConfig) -> Self {
        Self::new(
            Box::new(FileBackend::new(dir, &config.seen_storage_key)),
            config.seen_capacity,
        )
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains(id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Oldest first
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    /// Returns true if the id was not seen before
    pub fn mark_seen(&mut self, id: &str) -> bool {
        let inserted = self.insert(id.to_string());
        if inserted {
            self.evict();
            self.persist();
        }
        inserted
    }

    /// Mark a batch with a single write; returns how many were new
    pub fn mark_all<I, S>(&mut self, ids: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let added = ids
            .into_iter()
            .filter(|id| self.insert(id.as_ref().to_string()))
            .count();
        if added > 0 {
            self.evict();
            self.persist();
            log::debug!("Marked {} posts seen ({} tracked)", added, self.order.len());
        }
        added
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.index.clear();
        self.persist();
    }

    fn insert(&mut self, id: String) -> bool {
        if self.index.contains(&id) {
            return false;
        }
        self.index.insert(id.clone());
        self.order.push_back(id);
        true
    }

    fn evict(&mut self) {
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.index.remove(&oldest);
            }
        }
    }

    fn persist(&self) {
        let ids: Vec<String> = self.order.iter().cloned().collect();
        if let Err(e) = self.backend.save(&ids) {
            log::warn!("Failed to persist seen posts (keeping in-memory state): {}", e);
        }
    }
}
