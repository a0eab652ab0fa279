use serde_json::Value;
use tempfile::tempdir;

mod common;
use common::{run_kiln, seed_shell, write_config};

#[test]
fn json_build_emits_ndjson_events() {
    let dir = tempdir().unwrap();
    seed_shell(dir.path());
    write_config(dir.path(), "");

    let output = run_kiln(dir.path(), &["build", "--json"]);
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    let events: Vec<Value> = stdout
        .lines()
        .filter(|line| !line.is_empty())
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();

    assert_eq!(events.first().unwrap()["event"], "run_started");
    assert_eq!(events.last().unwrap()["event"], "run_complete");
    assert!(events
        .iter()
        .any(|e| e["event"] == "module_built" && e["module"] == "Shell"));
    assert!(events.iter().any(|e| e["event"] == "stage"));
}

#[test]
fn json_dev_build_marks_release_stages_skipped() {
    let dir = tempdir().unwrap();
    seed_shell(dir.path());
    write_config(dir.path(), "");

    let output = run_kiln(dir.path(), &["build", "--json"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    let skipped: Vec<&str> = stdout
        .lines()
        .filter(|line| line.contains("\"stage_skipped\""))
        .collect();
    for stage in ["finalize_release", "pack_html", "custom_pack", "gzip"] {
        assert!(
            skipped.iter().any(|line| line.contains(stage)),
            "expected skipped stage {stage}"
        );
    }
}
