// Open want-mask and init flag layouts, plus capability matching against manifest entries.
// Kind bits are an exclusive sub-field; flag bits are independent requirements.
use crate::core::error::{Error, ErrorKind};

pub const OPEN_WRITE: u32 = 0x0001;
pub const OPEN_WANT_MASK: u32 = 0x0F00;
pub const OPEN_INTERFACE: u32 = 0x0100;
pub const OPEN_FS: u32 = 0x0200;

pub const INIT_LOAD_FILE: u32 = 0x0001;
pub const INIT_LOAD_STRING: u32 = 0x0002;
pub const INIT_JSON_MANIFEST: u32 = 0x0010;
pub const INIT_JSON_MAIN: u32 = 0x0020;
/// Bits `cordis_init` reserves for `cordis_init_from`.
pub const INIT_RESERVED_MASK: u32 = 0x00FF;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub enum Kind {
    #[default]
    None,
    Interface,
    Filesystem,
}

impl Kind {
    fn bits(self) -> u32 {
        match self {
            Kind::None => 0,
            Kind::Interface => OPEN_INTERFACE,
            Kind::Filesystem => OPEN_FS,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Kind::None => "none",
            Kind::Interface => "interface",
            Kind::Filesystem => "fs",
        }
    }
}

/// What a manifest entry provides.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct Capabilities {
    pub kind: Kind,
    pub write: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            kind: Kind::Interface,
            write: true,
        }
    }
}

/// Caller want-mask passed to `open`.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub struct OpenFlags(u32);

impl OpenFlags {
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub fn write(self) -> bool {
        self.0 & OPEN_WRITE != 0
    }

    pub fn with_write(self) -> Self {
        Self(self.0 | OPEN_WRITE)
    }

    pub fn with_kind(self, kind: Kind) -> Self {
        Self((self.0 & !OPEN_WANT_MASK) | kind.bits())
    }

    pub fn want_bits(self) -> u32 {
        self.0 & OPEN_WANT_MASK
    }

    /// Requested kind; `Err` when the sub-field names no single known kind.
    pub fn kind(self) -> Result<Kind, u32> {
        match self.want_bits() {
            0 => Ok(Kind::None),
            OPEN_INTERFACE => Ok(Kind::Interface),
            OPEN_FS => Ok(Kind::Filesystem),
            other => Err(other),
        }
    }
}

/// Init load and structure modes decoded from the init flag word.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct InitFlags(u32);

impl InitFlags {
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub fn load_file(self) -> bool {
        self.0 & INIT_LOAD_FILE != 0
    }

    pub fn load_string(self) -> bool {
        self.0 & INIT_LOAD_STRING != 0
    }

    pub fn json_manifest(self) -> bool {
        self.0 & INIT_JSON_MANIFEST != 0
    }

    pub fn json_main(self) -> bool {
        self.0 & INIT_JSON_MAIN != 0
    }
}

/// Check an entry's capabilities against a want-mask.
///
/// Kind is exclusive-match and checked first; write is a requirement-match.
/// Entries that declare write hand out a duplex endpoint, so the caller must
/// request write to open them.
pub fn matches(caps: Capabilities, want: OpenFlags) -> Result<(), Error> {
    match want.kind() {
        Ok(Kind::None) => {}
        Ok(kind) if kind == caps.kind => {}
        Ok(kind) => {
            return Err(Error::new(ErrorKind::WrongKind).with_message(format!(
                "requested {} but entry provides {}",
                kind.as_str(),
                caps.kind.as_str()
            )));
        }
        Err(bits) => {
            return Err(Error::new(ErrorKind::WrongKind)
                .with_message(format!("unsupported kind bits {bits:#06x}")));
        }
    }
    if want.write() && !caps.write {
        return Err(Error::new(ErrorKind::NeedWrite).with_message("entry is read-only"));
    }
    if caps.write && !want.write() {
        return Err(Error::new(ErrorKind::NeedWrite)
            .with_message("entry is duplex; open with the write flag")
            .with_hint("Set OPEN_WRITE (0x0001) in the open flags."));
    }
    Ok(())
}
