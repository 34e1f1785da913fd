// One loaded-library record per distinct path, counted by referencing interfaces.
// Callers hold the broker lock, which makes loads of a given path load-once.
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::info;

use crate::core::error::Error;
use crate::core::loader::LibraryLoader;

/// A resident native library. Dropping the last reference unloads it.
#[derive(Debug)]
pub struct LoadedLibrary<L> {
    path: PathBuf,
    handle: L,
}

impl<L> LoadedLibrary<L> {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn handle(&self) -> &L {
        &self.handle
    }
}

struct Record<L> {
    library: Arc<LoadedLibrary<L>>,
    interfaces: usize,
}

pub(crate) struct LibraryRegistry<L> {
    records: HashMap<PathBuf, Record<L>>,
}

impl<L> LibraryRegistry<L> {
    pub(crate) fn new() -> Self {
        Self {
            records: HashMap::new(),
        }
    }

    /// Existing record for `path`, or a freshly loaded one. Does not count a reference.
    pub(crate) fn acquire<F>(&mut self, loader: &F, path: &Path) -> Result<Arc<LoadedLibrary<L>>, Error>
    where
        F: LibraryLoader<Library = L>,
    {
        if let Some(record) = self.records.get(path) {
            return Ok(Arc::clone(&record.library));
        }
        let handle = loader.load(path)?;
        info!(path = %path.display(), "library loaded");
        let library = Arc::new(LoadedLibrary {
            path: path.to_path_buf(),
            handle,
        });
        self.records.insert(
            path.to_path_buf(),
            Record {
                library: Arc::clone(&library),
                interfaces: 0,
            },
        );
        Ok(library)
    }

    pub(crate) fn retain(&mut self, path: &Path) {
        if let Some(record) = self.records.get_mut(path) {
            record.interfaces += 1;
        }
    }

    pub(crate) fn forget(&mut self, path: &Path) {
        if let Some(record) = self.records.get_mut(path) {
            record.interfaces = record.interfaces.saturating_sub(1);
        }
    }

    /// Drop the record for `path` if no interface references it.
    pub(crate) fn release_if_unused(&mut self, path: &Path) -> bool {
        let unused = self
            .records
            .get(path)
            .is_some_and(|record| record.interfaces == 0);
        if unused {
            self.records.remove(path);
            info!(path = %path.display(), "library released");
        }
        unused
    }

    /// Drop every record with no referencing interfaces; returns the released paths.
    pub(crate) fn release_idle(&mut self) -> Vec<PathBuf> {
        let idle: Vec<PathBuf> = self
            .records
            .iter()
            .filter(|(_, record)| record.interfaces == 0)
            .map(|(path, _)| path.clone())
            .collect();
        for path in &idle {
            self.release_if_unused(path);
        }
        idle
    }

    pub(crate) fn ref_count(&self, path: &Path) -> Option<usize> {
        self.records.get(path).map(|record| record.interfaces)
    }

    pub(crate) fn paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.records.keys().cloned().collect();
        paths.sort();
        paths
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorKind;
    use crate::core::testing::MemoryLoader;

    #[test]
    fn acquire_loads_once_per_path() {
        let loader = MemoryLoader::default();
        loader.add_library("/lib/a.so");
        let mut registry = LibraryRegistry::new();

        let first = registry.acquire(&loader, Path::new("/lib/a.so")).expect("acquire");
        let second = registry.acquire(&loader, Path::new("/lib/a.so")).expect("acquire");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(loader.loads("/lib/a.so"), 1);
        assert_eq!(registry.ref_count(Path::new("/lib/a.so")), Some(0));
    }

    #[test]
    fn failed_load_leaves_no_record() {
        let loader = MemoryLoader::default();
        let mut registry = LibraryRegistry::new();
        let err = registry.acquire(&loader, Path::new("/lib/missing.so")).err().expect("error");
        assert_eq!(err.kind(), ErrorKind::UnableToLoad);
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn release_idle_only_drops_unreferenced() {
        let loader = MemoryLoader::default();
        loader.add_library("/lib/a.so");
        loader.add_library("/lib/b.so");
        let mut registry = LibraryRegistry::new();
        drop(registry.acquire(&loader, Path::new("/lib/a.so")).expect("a"));
        drop(registry.acquire(&loader, Path::new("/lib/b.so")).expect("b"));
        registry.retain(Path::new("/lib/b.so"));

        let released = registry.release_idle();
        assert_eq!(released, vec![PathBuf::from("/lib/a.so")]);
        assert_eq!(loader.unloads("/lib/a.so"), 1);
        assert_eq!(loader.unloads("/lib/b.so"), 0);
        assert_eq!(registry.paths(), vec![PathBuf::from("/lib/b.so")]);

        registry.forget(Path::new("/lib/b.so"));
        registry.forget(Path::new("/lib/b.so"));
        assert_eq!(registry.ref_count(Path::new("/lib/b.so")), Some(0));
        assert!(registry.release_if_unused(Path::new("/lib/b.so")));
        assert_eq!(loader.unloads("/lib/b.so"), 1);
    }
}
