//! Build script for vpl-dispatch
//!
//! Stamps the binaries with build identification (date and git revision)
//! surfaced by `vpl-inspect --verbose`.

use std::process::Command;

fn capture(cmd: &mut Command) -> Option<String> {
    let out = cmd.output().ok()?;
    if !out.status.success() {
        return None;
    }
    let text = String::from_utf8_lossy(&out.stdout).trim().to_string();
    (!text.is_empty()).then_some(text)
}

fn main() {
    let build_date =
        capture(Command::new("date").arg("+%Y-%m-%d")).unwrap_or_else(|| "unknown".into());
    println!("cargo:rustc-env=BUILD_DATE={build_date}");

    let git_hash = capture(Command::new("git").args(["rev-parse", "--short", "HEAD"]))
        .unwrap_or_else(|| "unreleased".into());
    println!("cargo:rustc-env=GIT_HASH={git_hash}");

    println!("cargo:rerun-if-changed=.git/HEAD");
}
