// In-memory `LibraryLoader` for unit tests: counts loads/unloads and scripts symbols.
use std::collections::HashMap;
use std::os::fd::OwnedFd;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::core::error::{Error, ErrorKind};
use crate::core::flags::OpenFlags;
use crate::core::loader::{CallResult, CapabilityProvider, LibraryLoader};
use crate::core::manifest::ManifestEntry;

pub(crate) type ServeBehavior = Arc<dyn Fn(OwnedFd, OpenFlags, Option<&str>) -> i32 + Send + Sync>;

#[derive(Default)]
struct Symbols {
    serve: HashMap<String, ServeBehavior>,
    counts: HashMap<String, Arc<AtomicI32>>,
}

#[derive(Default)]
struct LoaderState {
    libraries: HashMap<PathBuf, Arc<Mutex<Symbols>>>,
    loads: HashMap<PathBuf, usize>,
    unloads: HashMap<PathBuf, Arc<AtomicUsize>>,
    invocations: HashMap<String, usize>,
    load_delay: Option<Duration>,
}

#[derive(Clone, Default)]
pub(crate) struct MemoryLoader {
    state: Arc<Mutex<LoaderState>>,
}

impl MemoryLoader {
    pub(crate) fn add_library(&self, path: impl Into<PathBuf>) {
        let mut state = self.state.lock().expect("lock");
        state.libraries.entry(path.into()).or_default();
    }

    /// Entry symbol that runs `behavior` and returns its value.
    pub(crate) fn add_entry<F>(&self, path: impl Into<PathBuf>, symbol: &str, behavior: F)
    where
        F: Fn(OwnedFd, OpenFlags, Option<&str>) -> i32 + Send + Sync + 'static,
    {
        let symbols = self.symbols(path.into());
        let mut symbols = symbols.lock().expect("lock");
        symbols.serve.insert(symbol.to_string(), Arc::new(behavior));
    }

    /// Entry symbol that returns `value` without touching the endpoint.
    pub(crate) fn add_returning(&self, path: impl Into<PathBuf>, symbol: &str, value: i32) {
        self.add_entry(path, symbol, move |_, _, _| value);
    }

    /// Client-count symbol reporting `count` until changed.
    pub(crate) fn set_clients(&self, path: impl Into<PathBuf>, symbol: &str, count: i32) {
        let symbols = self.symbols(path.into());
        let mut symbols = symbols.lock().expect("lock");
        symbols
            .counts
            .entry(symbol.to_string())
            .or_insert_with(|| Arc::new(AtomicI32::new(0)))
            .store(count, Ordering::SeqCst);
    }

    pub(crate) fn set_load_delay(&self, delay: Duration) {
        self.state.lock().expect("lock").load_delay = Some(delay);
    }

    pub(crate) fn loads(&self, path: impl AsRef<Path>) -> usize {
        let state = self.state.lock().expect("lock");
        state.loads.get(path.as_ref()).copied().unwrap_or(0)
    }

    pub(crate) fn unloads(&self, path: impl AsRef<Path>) -> usize {
        let state = self.state.lock().expect("lock");
        state
            .unloads
            .get(path.as_ref())
            .map_or(0, |count| count.load(Ordering::SeqCst))
    }

    pub(crate) fn invocations(&self, symbol: &str) -> usize {
        let state = self.state.lock().expect("lock");
        state.invocations.get(symbol).copied().unwrap_or(0)
    }

    fn symbols(&self, path: PathBuf) -> Arc<Mutex<Symbols>> {
        let mut state = self.state.lock().expect("lock");
        Arc::clone(state.libraries.entry(path).or_default())
    }
}

pub(crate) struct MemoryLibrary {
    symbols: Arc<Mutex<Symbols>>,
    unloads: Arc<AtomicUsize>,
}

impl Drop for MemoryLibrary {
    fn drop(&mut self) {
        self.unloads.fetch_add(1, Ordering::SeqCst);
    }
}

impl LibraryLoader for MemoryLoader {
    type Library = MemoryLibrary;

    fn load(&self, path: &Path) -> Result<Self::Library, Error> {
        let delay = self.state.lock().expect("lock").load_delay;
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        let mut state = self.state.lock().expect("lock");
        let Some(symbols) = state.libraries.get(path).cloned() else {
            return Err(Error::new(ErrorKind::UnableToLoad)
                .with_message("no such library")
                .with_path(path));
        };
        *state.loads.entry(path.to_path_buf()).or_default() += 1;
        let unloads = Arc::clone(state.unloads.entry(path.to_path_buf()).or_default());
        Ok(MemoryLibrary { symbols, unloads })
    }

    fn bind(
        &self,
        library: &Self::Library,
        entry: &ManifestEntry,
    ) -> Option<Box<dyn CapabilityProvider>> {
        let symbols = library.symbols.lock().expect("lock");
        let serve = symbols.serve.get(&entry.entry_symbol)?.clone();
        let count = symbols.counts.get(&entry.client_count_symbol).cloned();
        Some(Box::new(MemoryProvider {
            symbol: entry.entry_symbol.clone(),
            serve,
            count,
            state: Arc::clone(&self.state),
        }))
    }
}

struct MemoryProvider {
    symbol: String,
    serve: ServeBehavior,
    count: Option<Arc<AtomicI32>>,
    state: Arc<Mutex<LoaderState>>,
}

impl CapabilityProvider for MemoryProvider {
    fn invoke(&self, endpoint: OwnedFd, flags: OpenFlags, data: Option<&str>) -> CallResult {
        {
            let mut state = self.state.lock().expect("lock");
            *state.invocations.entry(self.symbol.clone()).or_default() += 1;
        }
        CallResult::from_raw((self.serve)(endpoint, flags, data))
    }

    fn query_clients(&self) -> CallResult {
        match &self.count {
            Some(count) => CallResult::from_raw(count.load(Ordering::SeqCst)),
            None => CallResult::SymbolAbsent,
        }
    }
}
