// Broker facade: init, open, cleanup and the fork pause/resume pair.
// One lock guards manifest, library registry and interface cache; entry points
// run after it is released, pinned by an in-flight guard.
use std::collections::HashMap;
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::core::connection::{self, Connection, ConnectionOrigin};
use crate::core::error::{Error, ErrorKind};
use crate::core::flags::{self, InitFlags, OpenFlags};
use crate::core::loader::{CallResult, CapabilityProvider, LibraryLoader, NativeLoader};
use crate::core::manifest::{InitOptions, Manifest, ManifestEntry};
use crate::core::registry::{LibraryRegistry, LoadedLibrary};

#[derive(Clone, Debug, Default)]
pub struct BrokerConfig {
    /// Base for relative library paths; defaults to `paths::interfaces_dir()`.
    pub interfaces_dir: Option<PathBuf>,
    /// Open absolute paths that are not manifest entries as files or sockets.
    pub filesystem_fallback: bool,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OpenRequest {
    pub name: String,
    pub flags: OpenFlags,
    pub data: Option<String>,
}

impl OpenRequest {
    pub fn new(name: impl Into<String>, flags: OpenFlags) -> Self {
        Self {
            name: name.into(),
            flags,
            data: None,
        }
    }

    pub fn with_data(mut self, data: impl Into<String>) -> Self {
        self.data = Some(data.into());
        self
    }
}

struct ResolvedInterface<L> {
    // Declared before `library` so the bound symbols drop first.
    provider: Box<dyn CapabilityProvider>,
    entry: ManifestEntry,
    library: Arc<LoadedLibrary<L>>,
    in_flight: AtomicUsize,
}

struct InFlight<L> {
    interface: Arc<ResolvedInterface<L>>,
}

impl<L> InFlight<L> {
    /// Must be taken while the broker lock is held.
    fn enter(interface: &Arc<ResolvedInterface<L>>) -> Self {
        interface.in_flight.fetch_add(1, Ordering::SeqCst);
        Self {
            interface: Arc::clone(interface),
        }
    }
}

impl<L> Drop for InFlight<L> {
    fn drop(&mut self) {
        self.interface.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

struct State<L> {
    manifest: Option<Manifest>,
    registry: LibraryRegistry<L>,
    interfaces: HashMap<String, Arc<ResolvedInterface<L>>>,
}

pub struct Broker<L: LibraryLoader = NativeLoader> {
    loader: L,
    config: BrokerConfig,
    state: Mutex<State<L::Library>>,
    paused: AtomicBool,
}

impl Broker<NativeLoader> {
    pub fn native() -> Self {
        Self::new(NativeLoader)
    }
}

impl<L: LibraryLoader> Broker<L> {
    pub fn new(loader: L) -> Self {
        Self {
            loader,
            config: BrokerConfig::default(),
            state: Mutex::new(State {
                manifest: None,
                registry: LibraryRegistry::new(),
                interfaces: HashMap::new(),
            }),
            paused: AtomicBool::new(false),
        }
    }

    pub fn with_config(mut self, config: BrokerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    pub fn is_initialized(&self) -> bool {
        self.state.lock().manifest.is_some()
    }

    /// Load the manifest and make the broker operational. A failed init leaves
    /// the broker uninitialized and may be retried.
    pub fn init(&self, options: InitOptions) -> Result<(), Error> {
        if self.is_initialized() {
            return Err(already_initialized());
        }
        let base_dir = self
            .config
            .interfaces_dir
            .clone()
            .unwrap_or_else(crate::paths::interfaces_dir);
        let manifest = Manifest::load(&options.source, options.layout, &base_dir)?;
        self.init_with_manifest(manifest)
    }

    /// `init` driven by the C-style flag word.
    pub fn init_flags(&self, flags: InitFlags, arg: Option<&str>) -> Result<(), Error> {
        self.init(InitOptions::from_flags(flags, arg)?)
    }

    pub fn init_with_manifest(&self, manifest: Manifest) -> Result<(), Error> {
        let mut state = self.state.lock();
        if state.manifest.is_some() {
            return Err(already_initialized());
        }
        info!(interfaces = manifest.len(), "broker initialized");
        state.manifest = Some(manifest);
        Ok(())
    }

    pub fn open(&self, name: &str, flags: OpenFlags) -> Result<Connection, Error> {
        self.open_with(&OpenRequest::new(name, flags))
    }

    pub fn open_with(&self, request: &OpenRequest) -> Result<Connection, Error> {
        let guard = {
            let mut state = self.state.lock();
            let Some(manifest) = state.manifest.as_ref() else {
                return Err(Error::new(ErrorKind::InitNotDone).with_message("broker is not initialized"));
            };
            let Some(entry) = manifest.get(&request.name).cloned() else {
                drop(state);
                return self.open_unlisted(request);
            };
            flags::matches(entry.capabilities, request.flags)
                .map_err(|err| err.with_name(&request.name))?;
            let interface = self.resolve(&mut state, entry)?;
            InFlight::enter(&interface)
        };
        let interface = &guard.interface;

        let (client, server) = UnixStream::pair().map_err(|err| {
            Error::from_io(ErrorKind::Io, err)
                .with_message("failed to create endpoint")
                .with_name(&request.name)
        })?;
        let result = interface
            .provider
            .invoke(server.into(), request.flags, request.data.as_deref());
        match result {
            CallResult::Ok(value) => {
                debug!(name = %request.name, value, "interface opened");
                Ok(Connection::new(client.into(), value, ConnectionOrigin::Interface))
            }
            CallResult::SymbolAbsent => {
                warn!(
                    name = %request.name,
                    symbol = %interface.entry.entry_symbol,
                    library = %interface.library.path().display(),
                    "interface reported itself absent"
                );
                Err(Error::new(ErrorKind::UnableToLoad)
                    .with_message("interface not found in library")
                    .with_name(&request.name)
                    .with_path(interface.library.path()))
            }
            CallResult::Errno(errno) => {
                warn!(name = %request.name, errno, "interface returned a failure");
                Err(Error::interface(errno).with_name(&request.name))
            }
        }
    }

    fn open_unlisted(&self, request: &OpenRequest) -> Result<Connection, Error> {
        let path = Path::new(&request.name);
        if self.config.filesystem_fallback && path.is_absolute() {
            return connection::open_path(path, request.flags);
        }
        Err(Error::new(ErrorKind::NotFound)
            .with_message("no manifest entry")
            .with_name(&request.name))
    }

    fn resolve(
        &self,
        state: &mut State<L::Library>,
        entry: ManifestEntry,
    ) -> Result<Arc<ResolvedInterface<L::Library>>, Error> {
        if let Some(interface) = state.interfaces.get(&entry.name) {
            debug!(name = %entry.name, "interface cache hit");
            return Ok(Arc::clone(interface));
        }
        let library = state
            .registry
            .acquire(&self.loader, &entry.library)
            .map_err(|err| err.with_name(&entry.name))?;
        let Some(provider) = self.loader.bind(library.handle(), &entry) else {
            drop(library);
            state.registry.release_if_unused(&entry.library);
            return Err(Error::new(ErrorKind::UnableToLoad)
                .with_message(format!("entry symbol {} not found", entry.entry_symbol))
                .with_name(&entry.name)
                .with_path(&entry.library));
        };
        state.registry.retain(&entry.library);
        info!(name = %entry.name, library = %entry.library.display(), "interface resolved");
        let interface = Arc::new(ResolvedInterface {
            provider,
            entry,
            library,
            in_flight: AtomicUsize::new(0),
        });
        state
            .interfaces
            .insert(interface.entry.name.clone(), Arc::clone(&interface));
        Ok(interface)
    }

    /// Unload idle interfaces, then libraries nothing references. Returns the
    /// number of interfaces unloaded.
    pub fn cleanup(&self) -> usize {
        let mut state = self.state.lock();
        let State {
            registry,
            interfaces,
            ..
        } = &mut *state;
        let mut unloaded = 0;
        interfaces.retain(|name, interface| {
            if interface.entry.no_unload {
                return true;
            }
            if interface.in_flight.load(Ordering::SeqCst) > 0 {
                debug!(name = %name, "interface busy; kept");
                return true;
            }
            match interface.provider.query_clients() {
                CallResult::Ok(0) => {}
                CallResult::Ok(clients) => {
                    debug!(name = %name, clients, "interface in use; kept");
                    return true;
                }
                CallResult::SymbolAbsent => {
                    debug!(name = %name, "no client count; kept");
                    return true;
                }
                CallResult::Errno(errno) => {
                    warn!(name = %name, errno, "client count failed; kept");
                    return true;
                }
            }
            registry.forget(&interface.entry.library);
            unloaded += 1;
            info!(name = %name, "interface unloaded");
            false
        });
        registry.release_idle();
        unloaded
    }

    /// Hold the broker lock across a process duplication. Pair with `after_fork`
    /// on the same thread; calling it twice without `after_fork` deadlocks.
    pub fn before_fork(&self) {
        debug_assert!(
            !self.paused.load(Ordering::SeqCst),
            "before_fork called twice without after_fork"
        );
        std::mem::forget(self.state.lock());
        self.paused.store(true, Ordering::SeqCst);
    }

    /// Release the lock taken by `before_fork`. No-op when not paused.
    pub fn after_fork(&self) {
        if self.paused.swap(false, Ordering::SeqCst) {
            // SAFETY: `before_fork` forgot the guard of this lock.
            unsafe { self.state.force_unlock() };
        }
    }

    pub fn resolved_names(&self) -> Vec<String> {
        let state = self.state.lock();
        let mut names: Vec<String> = state.interfaces.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn loaded_libraries(&self) -> Vec<PathBuf> {
        self.state.lock().registry.paths()
    }

    /// Interfaces currently referencing the library at `path`.
    pub fn library_refs(&self, path: &Path) -> Option<usize> {
        self.state.lock().registry.ref_count(path)
    }
}

fn already_initialized() -> Error {
    Error::new(ErrorKind::AlreadyInitialized).with_message("broker is already initialized")
}
