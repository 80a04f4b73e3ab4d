// SPDX-License-Identifier: GPL-3.0-only

use std::process::Command;

fn main() {
    println!("cargo::rerun-if-changed=.git/HEAD");
    println!("cargo::rerun-if-env-changed=GAZECURSOR_VERSION");

    // Packagers can pin the reported version without a git checkout
    let version = std::env::var("GAZECURSOR_VERSION").unwrap_or_else(|_| describe_version());

    println!("cargo::rustc-env=GIT_VERSION={}", version);
}

/// Version string for `--version`: the crate version plus the short commit hash
/// when building from a git checkout.
fn describe_version() -> String {
    let crate_version = env!("CARGO_PKG_VERSION");

    match git(&["rev-parse", "--short", "HEAD"]) {
        Some(hash) => {
            let dirty = git(&["status", "--porcelain", "--untracked-files=no"])
                .map(|status| !status.is_empty())
                .unwrap_or(false);
            if dirty {
                format!("{}-dirty-{}", crate_version, hash)
            } else {
                format!("{}-{}", crate_version, hash)
            }
        }
        None => crate_version.to_string(),
    }
}

fn git(args: &[&str]) -> Option<String> {
    let output = Command::new("git").args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
}
