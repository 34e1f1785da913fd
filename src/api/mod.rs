//! Purpose: Define the stable public Rust API boundary for Cordis.
//! Exports: Broker facade, manifest model, open flags, loader seam and errors.
//! Role: Public, additive-only surface shared by the CLI, the C ABI and embedders.
//! Invariants: This module is the only public path to core types.
//! Invariants: Registry internals stay private; callers observe them through `Broker`.

pub use crate::core::broker::{Broker, BrokerConfig, OpenRequest};
pub use crate::core::connection::{Connection, ConnectionOrigin};
#[doc(hidden)]
pub use crate::core::error::to_exit_code;
pub use crate::core::error::{
    Error, ErrorKind, INIT_ERROR_FLAGS, INIT_ERROR_INIT, INIT_ERROR_MANIFEST_DATA,
    INIT_ERROR_MANIFEST_LOAD, OPEN_ERROR_INIT, OPEN_ERROR_NEED_WRITE, OPEN_ERROR_UNABLE_LOAD,
    OPEN_ERROR_WRONG_KIND, to_init_code, to_open_code,
};
pub use crate::core::flags::{
    Capabilities, INIT_JSON_MAIN, INIT_JSON_MANIFEST, INIT_LOAD_FILE, INIT_LOAD_STRING, InitFlags,
    Kind, OPEN_FS, OPEN_INTERFACE, OPEN_WANT_MASK, OPEN_WRITE, OpenFlags, matches,
};
pub use crate::core::loader::{
    CallResult, CapabilityProvider, LibraryLoader, NativeLoader, SYMBOL_ABSENT,
};
pub use crate::core::manifest::{
    InitOptions, LaunchEntry, MANIFEST_KEY, Manifest, ManifestEntry, ManifestLayout,
    ManifestSource,
};
pub use crate::core::registry::LoadedLibrary;
pub use crate::paths::{PathKind, default_manifest_path, get_path, interfaces_dir};
