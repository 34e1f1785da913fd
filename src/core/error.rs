// Broker error taxonomy plus the stable integer mappings used by the C ABI and CLI.
use std::error::Error as StdError;
use std::fmt;
use std::path::{Path, PathBuf};

/// Open-path codes. `NotFound` is reported as `-ENOENT`.
pub const OPEN_ERROR_INIT: i32 = -70001;
pub const OPEN_ERROR_WRONG_KIND: i32 = -70002;
pub const OPEN_ERROR_UNABLE_LOAD: i32 = -70003;
pub const OPEN_ERROR_NEED_WRITE: i32 = -70004;

pub const INIT_ERROR_FLAGS: i32 = -80001;
pub const INIT_ERROR_MANIFEST_LOAD: i32 = -80002;
pub const INIT_ERROR_MANIFEST_DATA: i32 = -80003;
pub const INIT_ERROR_INIT: i32 = -80004;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    Internal,
    Usage,
    InitNotDone,
    AlreadyInitialized,
    InvalidFlags,
    ManifestLoad,
    ManifestData,
    NotFound,
    WrongKind,
    NeedWrite,
    UnableToLoad,
    Interface,
    Io,
}

#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    message: Option<String>,
    hint: Option<String>,
    path: Option<PathBuf>,
    name: Option<String>,
    errno: Option<i32>,
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl Error {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            hint: None,
            path: None,
            name: None,
            errno: None,
            source: None,
        }
    }

    /// Error carrying an errno-style code reported by loaded code or the OS.
    pub fn interface(errno: i32) -> Self {
        Self::new(ErrorKind::Interface).with_errno(errno)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn hint(&self) -> Option<&str> {
        self.hint.as_deref()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn errno(&self) -> Option<i32> {
        self.errno
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Positive errno value; callers may pass either sign.
    pub fn with_errno(mut self, errno: i32) -> Self {
        self.errno = Some(errno.abs());
        self
    }

    pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub(crate) fn from_io(kind: ErrorKind, err: std::io::Error) -> Self {
        let errno = err.raw_os_error();
        let mut out = Error::new(kind).with_source(err);
        if let Some(errno) = errno {
            out = out.with_errno(errno);
        }
        out
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.kind)?;
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        if let Some(name) = &self.name {
            write!(f, " (name: {name})")?;
        }
        if let Some(path) = &self.path {
            write!(f, " (path: {})", path.display())?;
        }
        if let Some(errno) = self.errno {
            write!(f, " (errno: {errno})")?;
        }
        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|source| source.as_ref() as &(dyn StdError + 'static))
    }
}

/// Negative code returned by `cordis_open`.
pub fn to_open_code(err: &Error) -> i32 {
    match err.kind() {
        ErrorKind::NotFound => -libc::ENOENT,
        ErrorKind::InitNotDone => OPEN_ERROR_INIT,
        ErrorKind::WrongKind => OPEN_ERROR_WRONG_KIND,
        ErrorKind::UnableToLoad => OPEN_ERROR_UNABLE_LOAD,
        ErrorKind::NeedWrite => OPEN_ERROR_NEED_WRITE,
        ErrorKind::Interface | ErrorKind::Io => match err.errno() {
            Some(errno) if errno > 0 => -errno,
            _ => -libc::EIO,
        },
        ErrorKind::Usage => -libc::EINVAL,
        ErrorKind::Internal
        | ErrorKind::AlreadyInitialized
        | ErrorKind::InvalidFlags
        | ErrorKind::ManifestLoad
        | ErrorKind::ManifestData => -libc::EIO,
    }
}

/// Negative code returned by `cordis_init` and `cordis_init_from`.
pub fn to_init_code(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::InvalidFlags | ErrorKind::Usage => INIT_ERROR_FLAGS,
        ErrorKind::ManifestLoad | ErrorKind::Io => INIT_ERROR_MANIFEST_LOAD,
        ErrorKind::ManifestData => INIT_ERROR_MANIFEST_DATA,
        _ => INIT_ERROR_INIT,
    }
}

pub fn to_exit_code(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::Internal => 1,
        ErrorKind::Usage | ErrorKind::InvalidFlags => 2,
        ErrorKind::NotFound => 3,
        ErrorKind::ManifestLoad | ErrorKind::ManifestData => 4,
        ErrorKind::InitNotDone | ErrorKind::AlreadyInitialized => 5,
        ErrorKind::WrongKind | ErrorKind::NeedWrite => 6,
        ErrorKind::UnableToLoad => 7,
        ErrorKind::Interface | ErrorKind::Io => 8,
    }
}
