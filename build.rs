//! Stamps the binary with the version and target shown by `provision version`
//! and written at the top of every run log.
use std::env;
use std::process::Command;

fn git_describe() -> Option<String> {
    let output = Command::new("git")
        .args(["describe", "--tags", "--always", "--dirty"])
        .output()
        .ok()?;
    output
        .status
        .success()
        .then(|| String::from_utf8_lossy(&output.stdout).trim().to_string())
        .filter(|v| !v.is_empty())
}

fn main() {
    // Release builds pin the version; local builds describe the checkout.
    let version = env::var("PROVISION_VERSION")
        .ok()
        .or_else(git_describe)
        .unwrap_or_else(|| format!("dev-{}", env::var("CARGO_PKG_VERSION").unwrap_or_default()));
    let target = env::var("TARGET").unwrap_or_else(|_| "unknown".to_string());

    println!("cargo:rustc-env=PROVISION_VERSION={version}");
    println!("cargo:rustc-env=PROVISION_TARGET={target}");
    println!("cargo:rerun-if-env-changed=PROVISION_VERSION");
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/refs/");
}
