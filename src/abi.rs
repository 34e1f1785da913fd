//! Purpose: C ABI bridge for embedding the broker (libcordis).
//! Exports: `cordis_init*`, `cordis_open*`, `cordis_cleanup`, fork hooks, `cordis_get_path`.
//! Role: Stable ABI over one process-global broker using the native loader.
//! Invariants: Open returns a descriptor >= 0 or a negative code from `to_open_code`.
//! Invariants: Init returns 0 or a negative `INIT_ERROR_*` code; failed init may be retried.
//! Notes: The global broker enables the filesystem fallback for absolute paths.

use std::ffi::CStr;
use std::os::fd::IntoRawFd;
use std::os::raw::{c_char, c_int};
use std::sync::LazyLock;

use tracing::debug;

use crate::api::{
    Broker, BrokerConfig, Error, ErrorKind, INIT_ERROR_FLAGS, INIT_JSON_MANIFEST, INIT_LOAD_FILE,
    InitFlags, NativeLoader, OpenFlags, OpenRequest, PathKind, to_init_code, to_open_code,
};
use crate::core::flags::INIT_RESERVED_MASK;
use crate::paths::{copy_path_into, get_path};

static BROKER: LazyLock<Broker<NativeLoader>> = LazyLock::new(|| {
    Broker::new(NativeLoader).with_config(BrokerConfig {
        interfaces_dir: None,
        filesystem_fallback: true,
    })
});

/// Initialize from the default manifest file (`<exe>.manifest.json`).
/// `flags` must not carry any load or layout bit.
#[unsafe(no_mangle)]
pub extern "C" fn cordis_init(flags: c_int) -> c_int {
    let flags = flags as u32;
    if flags & INIT_RESERVED_MASK != 0 {
        return INIT_ERROR_FLAGS;
    }
    init_code(BROKER.init_flags(
        InitFlags::from_bits(flags | INIT_LOAD_FILE | INIT_JSON_MANIFEST),
        None,
    ))
}

/// Initialize with explicit load/layout flags. `arg` is a manifest path or
/// inline manifest text depending on the load flag; NULL means empty.
#[unsafe(no_mangle)]
pub extern "C" fn cordis_init_from(flags: c_int, arg: *const c_char) -> c_int {
    let arg = match optional_str(arg) {
        Ok(arg) => arg,
        Err(err) => return to_init_code(err.kind()),
    };
    init_code(BROKER.init_flags(InitFlags::from_bits(flags as u32), arg))
}

#[unsafe(no_mangle)]
pub extern "C" fn cordis_open(name: *const c_char, flags: c_int) -> c_int {
    open_code(name, flags, std::ptr::null())
}

/// Extended open: `data` is an opaque, interface-specific string (may be NULL).
#[unsafe(no_mangle)]
pub extern "C" fn cordis_open_ex(name: *const c_char, flags: c_int, data: *const c_char) -> c_int {
    open_code(name, flags, data)
}

/// Unload idle interfaces and unused libraries. Returns interfaces unloaded.
#[unsafe(no_mangle)]
pub extern "C" fn cordis_cleanup() -> c_int {
    c_int::try_from(BROKER.cleanup()).unwrap_or(c_int::MAX)
}

#[unsafe(no_mangle)]
pub extern "C" fn cordis_before_fork() {
    BROKER.before_fork();
}

#[unsafe(no_mangle)]
pub extern "C" fn cordis_after_fork() {
    BROKER.after_fork();
}

/// Install the fork hooks with `pthread_atfork`. Returns 0 or a negative errno.
#[unsafe(no_mangle)]
pub extern "C" fn cordis_register_atfork() -> c_int {
    unsafe extern "C" fn prepare() {
        BROKER.before_fork();
    }
    unsafe extern "C" fn release() {
        BROKER.after_fork();
    }
    let rc = unsafe { libc::pthread_atfork(Some(prepare), Some(release), Some(release)) };
    if rc == 0 { 0 } else { -rc }
}

/// Copy the path of kind `which` into `dest`. Returns the length written, or
/// the required size including the NUL when `destlen` is too small.
#[unsafe(no_mangle)]
pub extern "C" fn cordis_get_path(which: c_int, dest: *mut c_char, destlen: usize) -> usize {
    let path = PathKind::from_code(which)
        .map(|kind| get_path(kind).to_string_lossy().into_owned())
        .unwrap_or_default();
    let dest: &mut [u8] = if dest.is_null() || destlen == 0 {
        &mut []
    } else {
        unsafe { std::slice::from_raw_parts_mut(dest.cast::<u8>(), destlen) }
    };
    copy_path_into(&path, dest)
}

fn init_code(result: Result<(), Error>) -> c_int {
    match result {
        Ok(()) => 0,
        Err(err) => {
            debug!(error = %err, "init failed");
            to_init_code(err.kind())
        }
    }
}

fn open_code(name: *const c_char, flags: c_int, data: *const c_char) -> c_int {
    let result = required_str(name).and_then(|name| {
        let mut request = OpenRequest::new(name, OpenFlags::from_bits(flags as u32));
        request.data = optional_str(data)?.map(str::to_string);
        BROKER.open_with(&request)
    });
    match result {
        Ok(conn) => conn.into_raw_fd(),
        Err(err) => {
            debug!(error = %err, "open failed");
            to_open_code(&err)
        }
    }
}

fn required_str<'a>(input: *const c_char) -> Result<&'a str, Error> {
    optional_str(input)?.ok_or_else(|| Error::new(ErrorKind::NotFound).with_message("name is null"))
}

fn optional_str<'a>(input: *const c_char) -> Result<Option<&'a str>, Error> {
    if input.is_null() {
        return Ok(None);
    }
    unsafe { CStr::from_ptr(input) }
        .to_str()
        .map(Some)
        .map_err(|_| Error::new(ErrorKind::Usage).with_message("string is not valid UTF-8"))
}
