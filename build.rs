//! Build script for plugbridge
//!
//! Records the compiler version. Native modules carry the same string in
//! their declaration, and the loader refuses modules built by a different
//! compiler since Rust has no stable ABI.

use std::env;
use std::process::Command;

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-env-changed=RUSTC");

    let rustc = env::var("RUSTC").unwrap_or_else(|_| "rustc".to_string());
    let version = Command::new(&rustc)
        .arg("--version")
        .output()
        .ok()
        .filter(|output| output.status.success())
        .and_then(|output| String::from_utf8(output.stdout).ok())
        .map(|v| v.trim().to_string())
        .unwrap_or_else(|| {
            eprintln!("Warning: could not query {} --version", rustc);
            "unknown".to_string()
        });

    println!("cargo:rustc-env=PLUGBRIDGE_RUSTC_VERSION={}", version);
}
