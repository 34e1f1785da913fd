//! Purpose: Resolve well-known directories and the broker's default file locations.
//! Exports: `PathKind`, `get_path`, `default_manifest_path`, `interfaces_dir`.
//! Role: Thin platform layer shared by the broker, the C ABI and the CLI.
//! Invariants: Home falls back to the working directory captured on first use.
//! Invariants: Application dir is the executable's parent; empty when unknown.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum PathKind {
    Temp = 1,
    Home = 2,
    Executable = 3,
    Application = 4,
    Config = 5,
    Data = 6,
    Cache = 7,
}

impl PathKind {
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(PathKind::Temp),
            2 => Some(PathKind::Home),
            3 => Some(PathKind::Executable),
            4 => Some(PathKind::Application),
            5 => Some(PathKind::Config),
            6 => Some(PathKind::Data),
            7 => Some(PathKind::Cache),
            _ => None,
        }
    }
}

fn init_dir() -> &'static Path {
    static INIT_DIR: OnceLock<PathBuf> = OnceLock::new();
    INIT_DIR.get_or_init(|| std::env::current_dir().unwrap_or_default())
}

/// Resolve a directory (or, for `Executable`, a file) of the given kind.
pub fn get_path(kind: PathKind) -> PathBuf {
    match kind {
        PathKind::Temp => std::env::temp_dir(),
        PathKind::Home => home_dir(),
        PathKind::Executable => std::env::current_exe().unwrap_or_default(),
        PathKind::Application => app_dir(),
        PathKind::Config => dirs::config_dir().unwrap_or_else(|| home_dir().join(".config")),
        PathKind::Data => dirs::data_dir().unwrap_or_else(|| home_dir().join(".local/share")),
        PathKind::Cache => dirs::cache_dir().unwrap_or_else(|| home_dir().join(".cache")),
    }
}

fn home_dir() -> PathBuf {
    dirs::home_dir()
        .filter(|home| !home.as_os_str().is_empty())
        .unwrap_or_else(|| init_dir().to_path_buf())
}

fn app_dir() -> PathBuf {
    let exe = get_path(PathKind::Executable);
    match exe.parent() {
        Some(parent) if !exe.as_os_str().is_empty() => parent.to_path_buf(),
        _ => init_dir().to_path_buf(),
    }
}

/// `<exe>.manifest.json`, used when init is given no manifest path.
pub fn default_manifest_path() -> PathBuf {
    let mut raw = get_path(PathKind::Executable).into_os_string();
    raw.push(".manifest.json");
    PathBuf::from(raw)
}

/// Directory relative library paths are resolved against.
pub fn interfaces_dir() -> PathBuf {
    interfaces_dir_for(&get_path(PathKind::Application))
}

pub(crate) fn interfaces_dir_for(app_dir: &Path) -> PathBuf {
    let interfaces = app_dir.join("../interfaces");
    if interfaces.exists() {
        return interfaces;
    }
    let lib = app_dir.join("../lib");
    if lib.exists() {
        return lib;
    }
    app_dir.to_path_buf()
}

/// Copy `path` NUL-terminated into `dest`. Returns the length written, or the
/// required buffer size (length + 1) when `dest` is too small.
pub(crate) fn copy_path_into(path: &str, dest: &mut [u8]) -> usize {
    let len = path.len();
    if len >= dest.len() {
        if path.is_empty() {
            return 0;
        }
        return len + 1;
    }
    dest[..len].copy_from_slice(path.as_bytes());
    dest[len] = 0;
    len
}
