// C ABI smoke test. The ABI drives one process-global broker, so the whole
// lifecycle runs in a single test.
use std::ffi::{CStr, CString};
use std::fs::File;
use std::io::Read;
use std::os::fd::FromRawFd;
use std::os::raw::c_char;

use cordis::abi::{
    cordis_after_fork, cordis_before_fork, cordis_cleanup, cordis_get_path, cordis_init,
    cordis_init_from, cordis_open, cordis_open_ex,
};
use cordis::api::{
    INIT_ERROR_FLAGS, INIT_ERROR_INIT, INIT_ERROR_MANIFEST_DATA, INIT_ERROR_MANIFEST_LOAD,
    INIT_JSON_MAIN, INIT_JSON_MANIFEST, INIT_LOAD_FILE, INIT_LOAD_STRING, OPEN_ERROR_INIT,
    OPEN_ERROR_NEED_WRITE, OPEN_ERROR_UNABLE_LOAD, OPEN_ERROR_WRONG_KIND, OPEN_FS,
    OPEN_INTERFACE, OPEN_WRITE,
};

fn c(text: &str) -> CString {
    CString::new(text).expect("cstring")
}

#[test]
fn abi_lifecycle() {
    let temp = tempfile::tempdir().expect("tempdir");
    let data_path = temp.path().join("notes.txt");
    std::fs::write(&data_path, "plain file").expect("write");

    // Before init every open reports the init error.
    assert_eq!(cordis_open(c("log").as_ptr(), OPEN_WRITE as i32), OPEN_ERROR_INIT);

    // Layout and load bits are not accepted by the default initializer.
    assert_eq!(cordis_init(INIT_LOAD_FILE as i32), INIT_ERROR_FLAGS);
    assert_eq!(cordis_init_from(INIT_JSON_MAIN as i32, std::ptr::null()), INIT_ERROR_FLAGS);

    let missing = temp.path().join("absent.json");
    let missing = c(missing.to_str().expect("utf8"));
    assert_eq!(
        cordis_init_from((INIT_LOAD_FILE | INIT_JSON_MANIFEST) as i32, missing.as_ptr()),
        INIT_ERROR_MANIFEST_LOAD
    );
    assert_eq!(
        cordis_init_from(
            (INIT_LOAD_STRING | INIT_JSON_MANIFEST) as i32,
            c(r#"{"other": {}}"#).as_ptr()
        ),
        INIT_ERROR_MANIFEST_DATA
    );
    assert_eq!(
        cordis_init_from(
            (INIT_LOAD_STRING | INIT_JSON_MAIN) as i32,
            c(r#"{"interfaces": {"log": {"library": "liblog.so"}}}"#).as_ptr()
        ),
        INIT_ERROR_MANIFEST_DATA
    );

    let manifest = serde_json::json!({
        "interfaces": {
            "log": {"library": "/nonexistent/liblog.so", "interface": "log"},
            "clock": {"library": "/nonexistent/libclock.so", "interface": "clock", "write": false},
            "disk": {"library": "/nonexistent/libdisk.so", "interface": "disk", "kind": "fs"}
        }
    })
    .to_string();
    assert_eq!(
        cordis_init_from((INIT_LOAD_STRING | INIT_JSON_MAIN) as i32, c(&manifest).as_ptr()),
        0
    );
    assert_eq!(
        cordis_init_from((INIT_LOAD_STRING | INIT_JSON_MAIN) as i32, c(&manifest).as_ptr()),
        INIT_ERROR_INIT
    );

    assert_eq!(cordis_open(c("nope").as_ptr(), OPEN_WRITE as i32), -libc::ENOENT);
    assert_eq!(cordis_open(std::ptr::null(), OPEN_WRITE as i32), -libc::ENOENT);
    assert_eq!(cordis_open(c("log").as_ptr(), 0), OPEN_ERROR_NEED_WRITE);
    assert_eq!(cordis_open(c("clock").as_ptr(), OPEN_WRITE as i32), OPEN_ERROR_NEED_WRITE);
    assert_eq!(
        cordis_open(c("disk").as_ptr(), (OPEN_WRITE | OPEN_INTERFACE) as i32),
        OPEN_ERROR_WRONG_KIND
    );
    assert_eq!(
        cordis_open_ex(c("log").as_ptr(), OPEN_WRITE as i32, c("x").as_ptr()),
        OPEN_ERROR_UNABLE_LOAD
    );

    // Absolute paths outside the manifest fall back to the filesystem.
    let path = c(data_path.to_str().expect("utf8"));
    let fd = cordis_open(path.as_ptr(), OPEN_FS as i32);
    assert!(fd >= 0, "fs fallback returned {fd}");
    let mut file = unsafe { File::from_raw_fd(fd) };
    let mut text = String::new();
    file.read_to_string(&mut text).expect("read");
    assert_eq!(text, "plain file");
    assert_eq!(cordis_open(path.as_ptr(), OPEN_INTERFACE as i32), OPEN_ERROR_WRONG_KIND);

    cordis_before_fork();
    cordis_after_fork();
    cordis_after_fork();
    assert_eq!(cordis_cleanup(), 0);

    let mut buf = [0 as c_char; 4096];
    let len = cordis_get_path(1, buf.as_mut_ptr(), buf.len());
    let temp_dir = std::env::temp_dir();
    let expected = temp_dir.to_str().expect("utf8");
    assert_eq!(len, expected.len());
    let written = unsafe { CStr::from_ptr(buf.as_ptr()) };
    assert_eq!(written.to_str().expect("utf8"), expected);

    let mut tiny = [0 as c_char; 2];
    assert_eq!(cordis_get_path(1, tiny.as_mut_ptr(), tiny.len()), expected.len() + 1);
    assert_eq!(cordis_get_path(99, buf.as_mut_ptr(), buf.len()), 0);
}
