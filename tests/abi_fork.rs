// Fork hooks installed through the C ABI. Own test binary so the global
// broker and the atfork registration do not leak into other tests.
use std::ffi::CString;

use cordis::abi::{cordis_init_from, cordis_open, cordis_register_atfork};
use cordis::api::{INIT_JSON_MAIN, INIT_LOAD_STRING, OPEN_ERROR_NEED_WRITE, OPEN_WRITE};

fn c(text: &str) -> CString {
    CString::new(text).expect("cstring")
}

#[test]
fn broker_stays_usable_in_parent_and_child_after_fork() {
    let manifest = r#"{"interfaces": {"log": {"library": "/nonexistent/liblog.so", "interface": "log"}}}"#;
    assert_eq!(
        cordis_init_from((INIT_LOAD_STRING | INIT_JSON_MAIN) as i32, c(manifest).as_ptr()),
        0
    );
    assert_eq!(cordis_register_atfork(), 0);

    let missing = c("missing");
    let log = c("log");
    let pid = unsafe { libc::fork() };
    assert!(pid >= 0, "fork failed");
    if pid == 0 {
        let ok = cordis_open(missing.as_ptr(), OPEN_WRITE as i32) == -libc::ENOENT
            && cordis_open(log.as_ptr(), 0) == OPEN_ERROR_NEED_WRITE;
        unsafe { libc::_exit(if ok { 0 } else { 1 }) };
    }

    assert_eq!(cordis_open(missing.as_ptr(), OPEN_WRITE as i32), -libc::ENOENT);
    assert_eq!(cordis_open(log.as_ptr(), 0), OPEN_ERROR_NEED_WRITE);

    let mut status = 0;
    let waited = unsafe { libc::waitpid(pid, &mut status, 0) };
    assert_eq!(waited, pid);
    assert!(libc::WIFEXITED(status), "child did not exit normally");
    assert_eq!(libc::WEXITSTATUS(status), 0);
}
