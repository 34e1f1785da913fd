// Capability-provider seam between the broker and loaded code.
// `NativeLoader` resolves symbols with libloading; tests plug in in-memory loaders.
// Sentinel return values are decoded into `CallResult` here and nowhere else.
use std::ffi::CString;
use std::os::fd::{IntoRawFd, OwnedFd};
use std::os::raw::{c_char, c_int};
use std::path::Path;

use crate::core::error::{Error, ErrorKind};
use crate::core::flags::OpenFlags;
use crate::core::manifest::ManifestEntry;

/// Value loaded code returns to mean "functionally absent".
pub const SYMBOL_ABSENT: i32 = -2;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CallResult {
    Ok(i32),
    SymbolAbsent,
    /// Positive errno reported by the callee.
    Errno(i32),
}

impl CallResult {
    pub fn from_raw(ret: i32) -> Self {
        match ret {
            ret if ret >= 0 => CallResult::Ok(ret),
            SYMBOL_ABSENT => CallResult::SymbolAbsent,
            ret => CallResult::Errno(ret.saturating_neg()),
        }
    }
}

pub trait CapabilityProvider: Send + Sync {
    /// Hand `endpoint` to the interface. Ownership of the descriptor moves to the callee.
    fn invoke(&self, endpoint: OwnedFd, flags: OpenFlags, data: Option<&str>) -> CallResult;

    /// Active client count; `SymbolAbsent` when the interface exports none.
    fn query_clients(&self) -> CallResult;
}

pub trait LibraryLoader: Send + Sync {
    /// Loaded library; dropping it unloads the code.
    type Library: Send + Sync;

    fn load(&self, path: &Path) -> Result<Self::Library, Error>;

    /// Bind an entry's symbols. `None` when the entry symbol is missing.
    /// The provider must not be used after `library` is dropped.
    fn bind(&self, library: &Self::Library, entry: &ManifestEntry)
    -> Option<Box<dyn CapabilityProvider>>;
}

type ServeFn = unsafe extern "C" fn(c_int, c_int) -> c_int;
type ServeExFn = unsafe extern "C" fn(c_int, c_int, *const c_char) -> c_int;
type CountFn = unsafe extern "C" fn() -> c_int;

#[derive(Clone, Copy, Debug, Default)]
pub struct NativeLoader;

impl LibraryLoader for NativeLoader {
    type Library = libloading::Library;

    fn load(&self, path: &Path) -> Result<Self::Library, Error> {
        // SAFETY: library initializers run here; manifests are trusted configuration.
        unsafe { libloading::Library::new(path) }.map_err(|err| {
            Error::new(ErrorKind::UnableToLoad)
                .with_message("failed to load library")
                .with_path(path)
                .with_source(err)
        })
    }

    fn bind(
        &self,
        library: &Self::Library,
        entry: &ManifestEntry,
    ) -> Option<Box<dyn CapabilityProvider>> {
        // SAFETY: symbol types follow the interface calling convention; the raw
        // pointers are only used while the owning library stays loaded.
        let serve = unsafe {
            if entry.extended {
                Serve::Extended(*library.get::<ServeExFn>(entry.entry_symbol.as_bytes()).ok()?)
            } else {
                Serve::Basic(*library.get::<ServeFn>(entry.entry_symbol.as_bytes()).ok()?)
            }
        };
        let count = unsafe { library.get::<CountFn>(entry.client_count_symbol.as_bytes()) }
            .ok()
            .map(|symbol| *symbol);
        Some(Box::new(NativeProvider { serve, count }))
    }
}

#[derive(Clone, Copy)]
enum Serve {
    Basic(ServeFn),
    Extended(ServeExFn),
}

struct NativeProvider {
    serve: Serve,
    count: Option<CountFn>,
}

impl CapabilityProvider for NativeProvider {
    fn invoke(&self, endpoint: OwnedFd, flags: OpenFlags, data: Option<&str>) -> CallResult {
        let data = match data.map(CString::new).transpose() {
            Ok(data) => data,
            Err(_) => return CallResult::Errno(libc::EINVAL),
        };
        let flags = flags.bits() as c_int;
        let fd = endpoint.into_raw_fd();
        let ret = unsafe {
            match self.serve {
                Serve::Basic(serve) => serve(fd, flags),
                Serve::Extended(serve) => serve(
                    fd,
                    flags,
                    data.as_ref().map_or(std::ptr::null(), |data| data.as_ptr()),
                ),
            }
        };
        CallResult::from_raw(ret)
    }

    fn query_clients(&self) -> CallResult {
        match self.count {
            Some(count) => CallResult::from_raw(unsafe { count() }),
            None => CallResult::SymbolAbsent,
        }
    }
}
