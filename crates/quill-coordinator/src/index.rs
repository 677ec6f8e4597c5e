//! The filename index and its LRU lookup cache.
//!
//! The index maps each filename to the storage node that owns it plus an
//! advisory metadata snapshot (the node's `.meta` stays authoritative).
//! Lookups go through a small bounded LRU layer first; the cache holds
//! keys only and re-looks-up on hit, so a removal can never leave a
//! dangling reference. Removal pops the cache entry before the index
//! entry.

use std::collections::HashMap;
use std::num::NonZeroUsize;

use lru::LruCache;
use quill_core::FileMeta;

use crate::node::NodeId;

/// Bounded size of the lookup cache.
pub const LRU_CAPACITY: usize = 10;

/// Initial bucket allocation for the filename index.
const INDEX_CAPACITY: usize = 1024;

/// One indexed file.
#[derive(Debug, Clone)]
pub struct FileEntry {
    pub filename: String,
    pub node: NodeId,
    /// Advisory snapshot; `None` until first fetched from the node.
    pub meta: Option<FileMeta>,
}

/// The coordinator's filename index.
pub struct FileIndex {
    files: HashMap<String, FileEntry>,
    cache: LruCache<String, ()>,
}

impl Default for FileIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl FileIndex {
    pub fn new() -> Self {
        FileIndex {
            files: HashMap::with_capacity(INDEX_CAPACITY),
            cache: LruCache::new(NonZeroUsize::new(LRU_CAPACITY).expect("nonzero capacity")),
        }
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.files.contains_key(name)
    }

    /// Looks a file up through the cache layer, promoting the name on hit
    /// and inserting it on miss. Absent files never enter the cache.
    pub fn find(&mut self, name: &str) -> Option<&FileEntry> {
        if self.cache.get(name).is_some() {
            log::info!("cache HIT for '{name}'");
        } else if self.files.contains_key(name) {
            log::info!("cache MISS for '{name}'");
            self.cache.put(name.to_string(), ());
        }
        self.files.get(name)
    }

    /// Like [`FileIndex::find`] but yields a mutable entry, for metadata
    /// refreshes.
    pub fn find_mut(&mut self, name: &str) -> Option<&mut FileEntry> {
        if self.cache.get(name).is_some() {
            log::info!("cache HIT for '{name}'");
        } else if self.files.contains_key(name) {
            log::info!("cache MISS for '{name}'");
            self.cache.put(name.to_string(), ());
        }
        self.files.get_mut(name)
    }

    pub fn insert(&mut self, filename: String, node: NodeId, meta: Option<FileMeta>) {
        self.files.insert(
            filename.clone(),
            FileEntry {
                filename,
                node,
                meta,
            },
        );
    }

    /// Removes a file. The cache entry goes first, so no window exists in
    /// which the cache names a freed index entry.
    pub fn remove(&mut self, name: &str) -> Option<FileEntry> {
        self.cache.pop(name);
        self.files.remove(name)
    }

    /// Untracked shared access: no cache consultation, no promotion.
    pub fn peek(&self, name: &str) -> Option<&FileEntry> {
        self.files.get(name)
    }

    /// Untracked mutable access, for internal bookkeeping (metadata
    /// refreshes, ownership remaps) that is not a lookup.
    pub fn peek_mut(&mut self, name: &str) -> Option<&mut FileEntry> {
        self.files.get_mut(name)
    }

    /// Plain enumeration, bypassing the cache layer.
    pub fn iter(&self) -> impl Iterator<Item = &FileEntry> {
        self.files.values()
    }

    /// Sorted filename list, for stable display output.
    pub fn sorted_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.files.keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index_with(names: &[&str]) -> FileIndex {
        let mut index = FileIndex::new();
        for (i, name) in names.iter().enumerate() {
            index.insert(name.to_string(), NodeId(i as u64), None);
        }
        index
    }

    #[test]
    fn find_inserts_and_promotes() {
        let mut index = index_with(&["f1", "f2", "f3"]);
        assert!(index.find("f1").is_some()); // miss
        assert!(index.find("f1").is_some()); // hit
        assert!(index.find("absent").is_none());
        assert_eq!(index.len(), 3);
    }

    #[test]
    fn eviction_keeps_the_cache_bounded() {
        let names: Vec<String> = (0..LRU_CAPACITY + 5).map(|i| format!("f{i}")).collect();
        let mut index = FileIndex::new();
        for name in &names {
            index.insert(name.clone(), NodeId(0), None);
        }
        for name in &names {
            index.find(name);
        }
        // all files are still reachable regardless of cache churn
        for name in &names {
            assert!(index.find(name).is_some());
        }
    }

    #[test]
    fn remove_then_find_is_clean() {
        let mut index = index_with(&["f1"]);
        index.find("f1");
        assert!(index.remove("f1").is_some());
        assert!(index.find("f1").is_none());
        assert!(index.remove("f1").is_none());
    }
}
