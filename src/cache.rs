//! Persistent map from source URL to a downloaded file.
//!
//! The whole map is rewritten on every mutation. A store that cannot be
//! read or parsed is treated as empty: losing the cache only costs a
//! re-download.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use tracing::{debug, warn};

use crate::{error::Result, source::SourceRef};

#[derive(Debug)]
pub struct TrackCache {
    store: PathBuf,
    entries: BTreeMap<SourceRef, PathBuf>,
}

impl TrackCache {
    /// Loads the map from `store`, starting empty if it is missing or corrupt.
    pub fn load(store: impl Into<PathBuf>) -> Self {
        let store = store.into();
        let entries = match fs::read_to_string(&store) {
            Ok(text) => match serde_json::from_str(&text) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!("Cache store {:?} is corrupt, starting empty: {}", store, e);
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                warn!("Cannot read cache store {:?}, starting empty: {}", store, e);
                BTreeMap::new()
            }
        };
        debug!("Loaded {} cache entries from {:?}", entries.len(), store);
        Self { store, entries }
    }

    /// Returns the cached file for `source`, but only if it still exists.
    pub fn lookup(&self, source: &SourceRef) -> Option<PathBuf> {
        let path = self.entries.get(source)?;
        if path.exists() {
            Some(path.clone())
        } else {
            debug!("Stale cache entry for {}: {:?} is gone", source, path);
            None
        }
    }

    pub fn insert(&mut self, source: SourceRef, path: PathBuf) -> Result<()> {
        self.entries.insert(source, path);
        self.persist()
    }

    /// Removes the entry for `source`. Absent entries are not an error.
    pub fn remove(&mut self, source: &SourceRef) -> Result<()> {
        if self.entries.remove(source).is_some() {
            self.persist()?;
        }
        Ok(())
    }

    /// Removes every entry pointing at `path` and returns how many went.
    pub fn remove_path(&mut self, path: &Path) -> Result<usize> {
        let before = self.entries.len();
        self.entries.retain(|_, cached| cached != path);
        let removed = before - self.entries.len();
        if removed > 0 {
            self.persist()?;
        }
        Ok(removed)
    }

    /// Whether any entry points at `path`.
    pub fn holds_path(&self, path: &Path) -> bool {
        self.entries.values().any(|cached| cached == path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn persist(&self) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.entries)?;
        let tmp = self.store.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.store)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(id: &str) -> SourceRef {
        SourceRef::parse(&format!("https://youtu.be/{id}")).unwrap()
    }

    fn audio_file(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, b"audio").unwrap();
        path
    }

    #[test]
    fn survives_a_reload() {
        let dir = tempfile::tempdir().unwrap();
        let store = dir.path().join("songs.json");
        let file = audio_file(dir.path(), "a.mp4");

        let mut cache = TrackCache::load(&store);
        cache.insert(source("a"), file.clone()).unwrap();

        let reloaded = TrackCache::load(&store);
        assert_eq!(reloaded.lookup(&source("a")), Some(file));
        assert_eq!(reloaded.len(), 1);
    }

    #[test]
    fn stale_entry_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let file = audio_file(dir.path(), "a.mp4");
        let mut cache = TrackCache::load(dir.path().join("songs.json"));
        cache.insert(source("a"), file.clone()).unwrap();

        fs::remove_file(&file).unwrap();
        assert_eq!(cache.lookup(&source("a")), None);
    }

    #[test]
    fn corrupt_store_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = dir.path().join("songs.json");
        fs::write(&store, "{ not json").unwrap();

        let mut cache = TrackCache::load(&store);
        assert!(cache.is_empty());

        // The next write replaces the garbage.
        let file = audio_file(dir.path(), "a.mp4");
        cache.insert(source("a"), file).unwrap();
        assert_eq!(TrackCache::load(&store).len(), 1);
    }

    #[test]
    fn removing_an_absent_entry_is_fine() {
        let dir = tempfile::tempdir().unwrap();
        let store = dir.path().join("songs.json");
        let mut cache = TrackCache::load(&store);
        cache.remove(&source("missing")).unwrap();
        assert!(!store.exists());
    }

    #[test]
    fn remove_path_drops_every_alias() {
        let dir = tempfile::tempdir().unwrap();
        let store = dir.path().join("songs.json");
        let shared = audio_file(dir.path(), "shared.mp4");
        let other = audio_file(dir.path(), "other.mp4");

        let mut cache = TrackCache::load(&store);
        cache.insert(source("a"), shared.clone()).unwrap();
        cache
            .insert(SourceRef::parse("https://www.youtube.com/watch?v=a").unwrap(), shared.clone())
            .unwrap();
        cache.insert(source("b"), other.clone()).unwrap();

        assert_eq!(cache.remove_path(&shared).unwrap(), 2);
        assert!(!cache.holds_path(&shared));
        assert!(cache.holds_path(&other));
        assert_eq!(TrackCache::load(&store).len(), 1);
    }
}
