use std::process::Command;

/// Stamp the long `--version` string with the commit and build time.
fn main() {
    let built_at = chrono::Utc::now().format("%Y-%m-%d %H:%M UTC");

    let commit = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()
        .filter(|output| output.status.success())
        .and_then(|output| String::from_utf8(output.stdout).ok())
        .map(|hash| hash.trim().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    println!(
        "cargo:rustc-env=HISTORY_REPLAY_BUILD_INFO={} (commit {}, built {})",
        env!("CARGO_PKG_VERSION"),
        commit,
        built_at
    );

    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/refs/heads");
}
