//! Build script for devlink-runtime
//!
//! With the `ffi` feature enabled, tells the linker where to find the native
//! `mix_device` library. Without it, does nothing.

use std::env;
use std::path::PathBuf;

/// Overrides the library search directory.
const LIB_DIR_ENV: &str = "MIX_DEVICE_LIB_DIR";

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-env-changed={LIB_DIR_ENV}");

    if env::var_os("CARGO_FEATURE_FFI").is_none() {
        return;
    }

    match find_lib_dir() {
        Some(dir) => {
            if !dir.exists() {
                println!(
                    "cargo:warning=mix_device library directory {} does not exist",
                    dir.display()
                );
            }
            println!("cargo:rustc-link-search=native={}", dir.display());
            println!("cargo:rustc-env=MIX_DEVICE_LIB_DIR={}", dir.display());
        }
        None => {
            println!(
                "cargo:warning=Could not locate the mix_device library; set {LIB_DIR_ENV}"
            );
        }
    }
}

/// Locates the directory holding the native library.
///
/// Strategy 1: `MIX_DEVICE_LIB_DIR`.
/// Strategy 2: the per-user install under the platform data directory.
fn find_lib_dir() -> Option<PathBuf> {
    if let Some(dir) = env::var_os(LIB_DIR_ENV).filter(|d| !d.is_empty()) {
        return Some(PathBuf::from(dir));
    }

    dirs::data_local_dir().map(|base| base.join("mix").join("lib"))
}
