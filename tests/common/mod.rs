#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

pub fn bin() -> &'static str {
    env!("CARGO_BIN_EXE_kiln")
}

/// Write a kiln.toml with one required Shell module plus extra TOML appended.
pub fn write_config(root: &Path, extra: &str) -> PathBuf {
    let body = format!(
        "output = \"build\"\n\n[[module]]\nname = \"Shell\"\npath = \"client/Shell\"\nrequired = true\n{extra}"
    );
    let path = root.join("kiln.toml");
    std::fs::write(&path, body).unwrap();
    path
}

/// Seed a minimal Shell module with an entry point and one dependency.
pub fn seed_shell(root: &Path) {
    let src = root.join("client/Shell");
    std::fs::create_dir_all(&src).unwrap();
    std::fs::write(
        src.join("Shell.js"),
        r#"define("Shell/Shell", ["Shell/panel"], function () {});"#,
    )
    .unwrap();
    std::fs::write(
        src.join("panel.js"),
        r#"define("Shell/panel", [], function () {});"#,
    )
    .unwrap();
}

pub fn run_kiln(root: &Path, args: &[&str]) -> Output {
    Command::new(bin())
        .current_dir(root)
        .args(args)
        .output()
        .unwrap()
}

pub fn read_report(root: &Path) -> serde_json::Value {
    let text = std::fs::read_to_string(root.join("build/build-report.json")).unwrap();
    serde_json::from_str(&text).unwrap()
}
