use std::process::Command;

fn git_hash() -> Option<String> {
    let output = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    String::from_utf8(output.stdout)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn main() {
    // Release images are built without a .git directory and pass the hash in.
    let hash = std::env::var("SITEWORKS_GIT_HASH")
        .ok()
        .filter(|s| !s.is_empty())
        .or_else(git_hash)
        .unwrap_or_else(|| "unknown".to_string());

    println!("cargo:rustc-env=GIT_HASH={}", hash);

    println!("cargo:rerun-if-env-changed=SITEWORKS_GIT_HASH");
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/refs/heads/");
}
