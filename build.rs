use std::process::Command;

/// Exposes `GIT_HASH` to the crate, reported by the health endpoint.
/// `LEDGER_BUILD_VERSION` wins when set (release pipelines without `.git`).
fn main() {
    println!("cargo:rerun-if-env-changed=LEDGER_BUILD_VERSION");
    println!("cargo:rerun-if-changed=.git/HEAD");

    let version = std::env::var("LEDGER_BUILD_VERSION")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .or_else(git_describe)
        .unwrap_or_else(|| "unknown".to_string());

    println!("cargo:rustc-env=GIT_HASH={}", version);
}

fn git_describe() -> Option<String> {
    let out = Command::new("git")
        .args(["describe", "--always", "--dirty", "--abbrev=8"])
        .output()
        .ok()?;
    if !out.status.success() {
        return None;
    }
    let hash = String::from_utf8_lossy(&out.stdout).trim().to_string();
    (!hash.is_empty()).then_some(hash)
}
