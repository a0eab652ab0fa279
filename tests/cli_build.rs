use tempfile::tempdir;

mod common;
use common::{read_report, run_kiln, seed_shell, write_config};

#[test]
fn build_produces_outputs_and_artifacts() {
    let dir = tempdir().unwrap();
    seed_shell(dir.path());
    write_config(dir.path(), "");

    let output = run_kiln(dir.path(), &["build"]);
    assert!(
        output.status.success(),
        "build failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let out = dir.path().join("build");
    assert!(out.join("Shell/Shell.js").exists());
    assert!(out.join("Shell/panel.js").exists());
    assert!(out.join("contents.json").exists());
    assert!(out.join("contents.js").exists());
    assert!(out.join("module-dependencies.json").exists());
    assert!(out.join("routes-info.json").exists());
    assert!(out.join("Shell/contents.json").exists());
    assert!(out.join("build-report.json").exists());
    // The run lock must not survive the run.
    assert!(!out.join(".kiln.lock").exists());
}

#[test]
fn build_release_writes_min_and_gz() {
    let dir = tempdir().unwrap();
    seed_shell(dir.path());
    write_config(dir.path(), "");

    let output = run_kiln(dir.path(), &["build", "--release"]);
    assert!(output.status.success());

    let out = dir.path().join("build");
    assert!(out.join("Shell/panel.min.js").exists());
    assert!(out.join("Shell/panel.js.gz").exists());
    assert!(out.join("Shell/panel.min.js.gz").exists());
}

#[test]
fn build_reports_graph_in_required_by_form() {
    let dir = tempdir().unwrap();
    seed_shell(dir.path());
    write_config(dir.path(), "");

    assert!(run_kiln(dir.path(), &["build"]).status.success());

    let text =
        std::fs::read_to_string(dir.path().join("build/module-dependencies.json")).unwrap();
    let graph: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(
        graph["links"]["Shell/panel"],
        serde_json::json!(["Shell/Shell"])
    );
    assert_eq!(graph["nodes"]["Shell/panel"]["path"], "Shell/panel.js");
}

#[test]
fn missing_config_fails_with_nonzero_exit() {
    let dir = tempdir().unwrap();
    let output = run_kiln(dir.path(), &["build"]);
    assert!(!output.status.success());
}

#[test]
fn compile_errors_are_reported_but_not_fatal() {
    let dir = tempdir().unwrap();
    seed_shell(dir.path());
    write_config(dir.path(), "");
    // A file the walker sees but the compiler cannot decode as UTF-8 is
    // copied through; a genuinely failing compile would land in the report.
    std::fs::write(dir.path().join("client/Shell/logo.png"), [0xff, 0xd8, 0x00]).unwrap();

    let output = run_kiln(dir.path(), &["build"]);
    assert!(output.status.success());
    assert!(dir.path().join("build/Shell/logo.png").exists());

    let report = read_report(dir.path());
    assert_eq!(report["errors"].as_array().unwrap().len(), 0);
}
