//! Purpose: Build the C fixture interface library used by native loader tests.
//! Role: Cargo build-script; drives the `cc` toolchain to link a shared object in `OUT_DIR`.
//! Invariants: `cargo:rerun-if-changed` covers the fixture sources.
//! Invariants: A missing C toolchain is a warning, never a build failure; tests skip instead.
//! Invariants: Exposes the fixture path to tests via `CORDIS_FIXTURE_LIB`.
use std::env;
use std::path::PathBuf;

fn main() {
    println!("cargo:rerun-if-changed=c/fixture_iface.c");

    let target = env::var("TARGET").unwrap_or_default();
    if target.contains("windows") {
        return;
    }
    let (Some(manifest_dir), Some(out_dir)) = (
        env::var_os("CARGO_MANIFEST_DIR").map(PathBuf::from),
        env::var_os("OUT_DIR").map(PathBuf::from),
    ) else {
        return;
    };

    let source = manifest_dir.join("c").join("fixture_iface.c");
    let output = out_dir.join(fixture_file_name(&target));

    let compiler = match cc::Build::new()
        .cargo_metadata(false)
        .pic(true)
        .warnings(false)
        .try_get_compiler()
    {
        Ok(compiler) => compiler,
        Err(err) => {
            println!("cargo:warning=cordis fixture skipped: {err}");
            return;
        }
    };

    let mut cmd = compiler.to_command();
    if target.contains("apple") {
        cmd.arg("-dynamiclib");
    } else {
        cmd.arg("-shared");
    }
    cmd.arg("-fPIC").arg("-o").arg(&output).arg(&source);

    match cmd.status() {
        Ok(status) if status.success() => {
            println!("cargo:rustc-env=CORDIS_FIXTURE_LIB={}", output.display());
        }
        Ok(status) => {
            println!("cargo:warning=cordis fixture compile failed: {status}");
        }
        Err(err) => {
            println!("cargo:warning=cordis fixture compiler not runnable: {err}");
        }
    }
}

fn fixture_file_name(target: &str) -> &'static str {
    if target.contains("apple") {
        "libcordis_fixture.dylib"
    } else {
        "libcordis_fixture.so"
    }
}
