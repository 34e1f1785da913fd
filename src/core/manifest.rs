// Manifest model: JSON parsing, validation, and name lookup for interface entries.
// Relative library paths are resolved against the interfaces directory at parse time.
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::core::error::{Error, ErrorKind};
use crate::core::flags::{Capabilities, InitFlags, Kind};

/// Key of the broker's object inside a generic manifest document.
pub const MANIFEST_KEY: &str = "cordis";

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ManifestEntry {
    pub name: String,
    pub library: PathBuf,
    pub entry_symbol: String,
    pub client_count_symbol: String,
    pub capabilities: Capabilities,
    pub no_unload: bool,
    /// Entry point takes a third `const char *data` argument.
    pub extended: bool,
}

impl ManifestEntry {
    /// Entry with default capabilities and `<interface>_interface` / `<interface>_count` symbols.
    pub fn new(name: impl Into<String>, library: impl Into<PathBuf>, interface: &str) -> Self {
        Self {
            name: name.into(),
            library: library.into(),
            entry_symbol: format!("{interface}_interface"),
            client_count_symbol: format!("{interface}_count"),
            capabilities: Capabilities::default(),
            no_unload: false,
            extended: false,
        }
    }

    pub fn with_kind(mut self, kind: Kind) -> Self {
        self.capabilities.kind = kind;
        self
    }

    pub fn read_only(mut self) -> Self {
        self.capabilities.write = false;
        self
    }

    pub fn pinned(mut self) -> Self {
        self.no_unload = true;
        self
    }

    pub fn extended(mut self) -> Self {
        self.extended = true;
        self
    }

    pub fn with_entry_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.entry_symbol = symbol.into();
        self
    }

    pub fn with_client_count_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.client_count_symbol = symbol.into();
        self
    }

    pub fn to_json(&self) -> Value {
        json!({
            "library": self.library.display().to_string(),
            "entry": self.entry_symbol,
            "client_count": self.client_count_symbol,
            "kind": self.capabilities.kind.as_str(),
            "write": self.capabilities.write,
            "no_unload": self.no_unload,
            "extended": self.extended,
        })
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Deserialize)]
pub struct LaunchEntry {
    #[serde(default)]
    pub run: String,
}

#[derive(Clone, Debug, Default)]
pub struct Manifest {
    interfaces: BTreeMap<String, ManifestEntry>,
    launch: BTreeMap<String, LaunchEntry>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ManifestSource {
    /// Manifest file; an empty path selects `<exe>.manifest.json`.
    File(PathBuf),
    Inline(String),
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ManifestLayout {
    /// Generic document carrying the broker's object under `"cordis"`.
    Document,
    /// The document is already the broker's object.
    Main,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InitOptions {
    pub source: ManifestSource,
    pub layout: ManifestLayout,
}

impl InitOptions {
    pub fn new(source: ManifestSource, layout: ManifestLayout) -> Self {
        Self { source, layout }
    }

    /// Decode init flags. File loading wins over string loading, and the
    /// generic document layout wins over the main layout.
    pub fn from_flags(flags: InitFlags, arg: Option<&str>) -> Result<Self, Error> {
        let arg = arg.unwrap_or("");
        let source = if flags.load_file() {
            ManifestSource::File(PathBuf::from(arg))
        } else if flags.load_string() {
            ManifestSource::Inline(arg.to_string())
        } else {
            return Err(Error::new(ErrorKind::InvalidFlags).with_message("no manifest load mode"));
        };
        let layout = if flags.json_manifest() {
            ManifestLayout::Document
        } else if flags.json_main() {
            ManifestLayout::Main
        } else {
            return Err(Error::new(ErrorKind::InvalidFlags).with_message("no manifest layout"));
        };
        Ok(Self { source, layout })
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "lowercase")]
enum RawKind {
    Interface,
    Fs,
}

#[derive(Deserialize)]
struct RawInterface {
    // Missing keys decode as empty and are rejected as bad data in `from_raw`.
    #[serde(default)]
    library: String,
    #[serde(default)]
    interface: String,
    #[serde(default)]
    no_unload: bool,
    #[serde(default)]
    kind: Option<RawKind>,
    #[serde(default)]
    write: Option<bool>,
    #[serde(default)]
    entry: Option<String>,
    #[serde(default)]
    client_count: Option<String>,
    #[serde(default)]
    extended: bool,
}

#[derive(Deserialize, Default)]
struct RawMain {
    #[serde(default)]
    interfaces: BTreeMap<String, RawInterface>,
    #[serde(default)]
    launch: BTreeMap<String, LaunchEntry>,
}

#[derive(Deserialize)]
struct RawDocument {
    #[serde(default)]
    cordis: Option<RawMain>,
}

impl Manifest {
    pub fn from_entries(entries: impl IntoIterator<Item = ManifestEntry>) -> Self {
        let interfaces = entries
            .into_iter()
            .map(|entry| (entry.name.clone(), entry))
            .collect();
        Self {
            interfaces,
            launch: BTreeMap::new(),
        }
    }

    pub fn load(source: &ManifestSource, layout: ManifestLayout, base_dir: &Path) -> Result<Self, Error> {
        match source {
            ManifestSource::File(path) => {
                let path = if path.as_os_str().is_empty() {
                    crate::paths::default_manifest_path()
                } else {
                    path.clone()
                };
                let text = fs::read_to_string(&path).map_err(|err| {
                    Error::from_io(ErrorKind::ManifestLoad, err)
                        .with_message("failed to read manifest")
                        .with_path(&path)
                })?;
                debug!(path = %path.display(), "read manifest file");
                Self::parse(&text, layout, base_dir).map_err(|err| err.with_path(&path))
            }
            ManifestSource::Inline(text) => Self::parse(text, layout, base_dir),
        }
    }

    pub fn parse(text: &str, layout: ManifestLayout, base_dir: &Path) -> Result<Self, Error> {
        let raw = match layout {
            ManifestLayout::Document => {
                let doc: RawDocument = serde_json::from_str(text).map_err(|err| {
                    Error::new(ErrorKind::ManifestLoad)
                        .with_message("invalid manifest json")
                        .with_source(err)
                })?;
                doc.cordis.ok_or_else(|| {
                    Error::new(ErrorKind::ManifestData)
                        .with_message(format!("manifest has no \"{MANIFEST_KEY}\" object"))
                })?
            }
            ManifestLayout::Main => serde_json::from_str::<RawMain>(text).map_err(|err| {
                Error::new(ErrorKind::ManifestLoad)
                    .with_message("invalid manifest json")
                    .with_source(err)
            })?,
        };
        Self::from_raw(raw, base_dir)
    }

    fn from_raw(raw: RawMain, base_dir: &Path) -> Result<Self, Error> {
        for (name, launch) in &raw.launch {
            if name.is_empty() || launch.run.is_empty() {
                return Err(Error::new(ErrorKind::ManifestData)
                    .with_message("launch entries need a name and a run command"));
            }
        }
        let mut interfaces = BTreeMap::new();
        for (name, item) in raw.interfaces {
            if name.is_empty() || item.library.is_empty() || item.interface.is_empty() {
                return Err(Error::new(ErrorKind::ManifestData)
                    .with_message("interface entries need a name, library, and interface"));
            }
            let library = PathBuf::from(&item.library);
            let library = if library.is_absolute() {
                library
            } else {
                base_dir.join(library)
            };
            let mut entry = ManifestEntry::new(name.clone(), library, &item.interface);
            if let Some(symbol) = item.entry {
                entry.entry_symbol = symbol;
            }
            if let Some(symbol) = item.client_count {
                entry.client_count_symbol = symbol;
            }
            if entry.entry_symbol.is_empty() || entry.client_count_symbol.is_empty() {
                return Err(Error::new(ErrorKind::ManifestData)
                    .with_name(&name)
                    .with_message("symbol names must not be empty"));
            }
            entry.capabilities.kind = match item.kind {
                None | Some(RawKind::Interface) => Kind::Interface,
                Some(RawKind::Fs) => Kind::Filesystem,
            };
            entry.capabilities.write = item.write.unwrap_or(true);
            entry.no_unload = item.no_unload;
            entry.extended = item.extended;
            interfaces.insert(name, entry);
        }
        Ok(Self {
            interfaces,
            launch: raw.launch,
        })
    }

    pub fn get(&self, name: &str) -> Option<&ManifestEntry> {
        self.interfaces.get(name)
    }

    pub fn entries(&self) -> impl Iterator<Item = &ManifestEntry> {
        self.interfaces.values()
    }

    pub fn launch(&self, name: &str) -> Option<&LaunchEntry> {
        self.launch.get(name)
    }

    pub fn len(&self) -> usize {
        self.interfaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interfaces.is_empty()
    }

    pub fn to_json(&self) -> Value {
        let mut interfaces = Map::new();
        for (name, entry) in &self.interfaces {
            interfaces.insert(name.clone(), entry.to_json());
        }
        let mut launch = Map::new();
        for (name, entry) in &self.launch {
            launch.insert(name.clone(), json!({ "run": entry.run }));
        }
        json!({ "interfaces": interfaces, "launch": launch })
    }
}
