//! Stamps `APP_VERSION` as `<crate version>[+<commit>]` for the startup log.

use std::process::Command;

fn commit_from_git() -> Option<String> {
    let out = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()
        .filter(|o| o.status.success())?;
    let sha = String::from_utf8(out.stdout).ok()?;
    Some(sha.trim().to_owned()).filter(|s| !s.is_empty())
}

fn main() {
    let commit = commit_from_git()
        .or_else(|| std::env::var("GIT_SHA").ok().filter(|s| !s.is_empty()));
    let version = env!("CARGO_PKG_VERSION");

    match commit {
        Some(commit) => println!("cargo:rustc-env=APP_VERSION={version}+{commit}"),
        None => println!("cargo:rustc-env=APP_VERSION={version}"),
    }
    for trigger in [".git/HEAD", ".git/refs/heads"] {
        println!("cargo:rerun-if-changed={trigger}");
    }
    println!("cargo:rerun-if-env-changed=GIT_SHA");
}
