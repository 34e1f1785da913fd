// What `open` hands back: the caller's descriptor plus the value the provider reported.
// Also hosts the filesystem fallback for absolute paths that are not manifest entries.
use std::fs::{self, OpenOptions};
use std::io;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, IntoRawFd, OwnedFd, RawFd};
use std::os::unix::fs::FileTypeExt;
use std::os::unix::net::UnixStream;
use std::path::Path;

use crate::core::error::{Error, ErrorKind};
use crate::core::flags::{Kind, OpenFlags};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ConnectionOrigin {
    Interface,
    File,
    Socket,
}

#[derive(Debug)]
pub struct Connection {
    fd: OwnedFd,
    value: i32,
    origin: ConnectionOrigin,
}

impl Connection {
    pub(crate) fn new(fd: OwnedFd, value: i32, origin: ConnectionOrigin) -> Self {
        Self { fd, value, origin }
    }

    /// Non-negative value returned by the entry point (0 for filesystem opens).
    pub fn value(&self) -> i32 {
        self.value
    }

    pub fn origin(&self) -> ConnectionOrigin {
        self.origin
    }

    pub fn into_fd(self) -> OwnedFd {
        self.fd
    }

    /// Stream view of a socket-backed connection.
    pub fn into_stream(self) -> UnixStream {
        UnixStream::from(self.fd)
    }

    pub fn into_file(self) -> fs::File {
        fs::File::from(self.fd)
    }
}

impl AsFd for Connection {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

impl AsRawFd for Connection {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

impl IntoRawFd for Connection {
    fn into_raw_fd(self) -> RawFd {
        self.fd.into_raw_fd()
    }
}

/// Open an absolute filesystem path with open-flag semantics.
pub(crate) fn open_path(path: &Path, flags: OpenFlags) -> Result<Connection, Error> {
    let metadata = fs::metadata(path);
    let wants_other_kind = !matches!(flags.kind(), Ok(Kind::None) | Ok(Kind::Filesystem));
    if wants_other_kind && metadata.is_ok() {
        return Err(Error::new(ErrorKind::WrongKind)
            .with_message("path exists but is not an interface")
            .with_path(path));
    }
    let metadata = metadata.map_err(|err| io_error(err, path))?;
    let file_type = metadata.file_type();
    if file_type.is_dir() {
        return Err(Error::new(ErrorKind::Io)
            .with_errno(libc::EISDIR)
            .with_message("path is a directory")
            .with_path(path));
    }
    if file_type.is_socket() {
        if !flags.write() {
            return Err(Error::new(ErrorKind::NeedWrite)
                .with_message("sockets are duplex; open with the write flag")
                .with_path(path));
        }
        let stream = UnixStream::connect(path).map_err(|err| io_error(err, path))?;
        return Ok(Connection::new(stream.into(), 0, ConnectionOrigin::Socket));
    }
    let file = OpenOptions::new()
        .read(true)
        .write(flags.write())
        .open(path)
        .map_err(|err| io_error(err, path))?;
    Ok(Connection::new(file.into(), 0, ConnectionOrigin::File))
}

fn io_error(err: io::Error, path: &Path) -> Error {
    let kind = if err.kind() == io::ErrorKind::NotFound {
        ErrorKind::NotFound
    } else {
        ErrorKind::Io
    };
    Error::from_io(kind, err).with_path(path)
}
