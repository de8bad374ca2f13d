//! Build script for tunemint-server
//!
//! Exposes build identification to the crate as compile-time env vars:
//! `GIT_HASH`, `BUILD_TIMESTAMP` and `BUILD_PROFILE`. The server logs them at
//! start-up and serves them at `/api/buildinfo`.

use std::process::Command;

/// Short commit hash of the checkout, or "unknown" outside a git tree
fn git_short_hash() -> String {
    Command::new("git")
        .args(["rev-parse", "--short=8", "HEAD"])
        .output()
        .ok()
        .filter(|output| output.status.success())
        .and_then(|output| String::from_utf8(output.stdout).ok())
        .map(|hash| hash.trim().to_string())
        .filter(|hash| !hash.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

fn main() {
    let build_timestamp = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
    let profile = std::env::var("PROFILE").unwrap_or_else(|_| "unknown".to_string());

    println!("cargo:rustc-env=GIT_HASH={}", git_short_hash());
    println!("cargo:rustc-env=BUILD_TIMESTAMP={}", build_timestamp);
    println!("cargo:rustc-env=BUILD_PROFILE={}", profile);
}
