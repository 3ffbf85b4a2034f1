use std::process::Command;
use std::time::{SystemTime, UNIX_EPOCH};

fn git(args: &[&str]) -> Option<String> {
    let output = Command::new("git").args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

fn main() {
    let mut revision =
        git(&["rev-parse", "--short", "HEAD"]).unwrap_or_else(|| "unknown".to_string());
    let status = git(&["status", "--porcelain", "--untracked-files=no"]);
    if status.is_some_and(|s| !s.is_empty()) {
        revision.push_str("-dirty");
    }
    let built_at = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();

    println!("cargo:rustc-env=RUSTSIPREC_REVISION={}", revision);
    println!("cargo:rustc-env=RUSTSIPREC_BUILT_AT={}", built_at);
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/index");
}
