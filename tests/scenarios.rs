//! End-to-end scenarios against the library API

use std::collections::BTreeSet;

use tempfile::tempdir;

use kiln::config::BuildConfig;
use kiln::error::KilnError;
use kiln::pack::PACKED_MARKER;
use kiln::workflow::Workflow;

fn write(path: &std::path::Path, body: &str) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, body).unwrap();
}

#[test]
fn release_build_packs_lazy_bundle() {
    let dir = tempdir().unwrap();
    write(
        &dir.path().join("kiln.toml"),
        r#"
output = "build"
release = true

[[module]]
name = "Shell"
path = "client/Shell"
required = true

[[bundle]]
name = "Shell/bundle"
host = "Shell"
modules = ["Shell/_private/grid"]
"#,
    );
    write(
        &dir.path().join("client/Shell/bundle.js"),
        "define(\"Shell/bundle\", [\"Shell/_private/grid\"], function () {});\nexports.grid = require(\"Shell/_private/grid\");\n",
    );
    write(
        &dir.path().join("client/Shell/_private/grid.js"),
        "define(\"Shell/_private/grid\", [], function () {});\nexports.cell = 1;\n",
    );

    let config = BuildConfig::load(&dir.path().join("kiln.toml")).unwrap();
    let report = Workflow::new(&config).run().unwrap();
    assert!(!report.has_errors());

    let packed = std::fs::read_to_string(dir.path().join("build/Shell/bundle.js")).unwrap();
    assert!(packed.starts_with(PACKED_MARKER));
    assert!(packed.contains("factories[\"Shell/_private/grid\"]"));
    assert!(packed.contains("Object.defineProperty(exports, \"grid\""));
    // The minified sibling carries the packed form too.
    let min = std::fs::read_to_string(dir.path().join("build/Shell/bundle.min.js")).unwrap();
    assert!(min.starts_with(PACKED_MARKER));

    // The bundle definitions are emitted for the runtime loader.
    let defs = std::fs::read_to_string(dir.path().join("build/lazy-bundles.json")).unwrap();
    assert!(defs.contains("Shell/bundle"));
    let map = std::fs::read_to_string(dir.path().join("build/lazy-bundles-map.json")).unwrap();
    assert!(map.contains("Shell/_private/grid"));
}

#[test]
fn packing_is_stable_across_runs() {
    let dir = tempdir().unwrap();
    write(
        &dir.path().join("kiln.toml"),
        r#"
output = "build"
release = true

[[module]]
name = "Shell"
path = "client/Shell"
required = true

[[bundle]]
name = "Shell/bundle"
host = "Shell"
modules = ["Shell/_private/grid"]
"#,
    );
    write(
        &dir.path().join("client/Shell/bundle.js"),
        "define(\"Shell/bundle\", [\"Shell/_private/grid\"], function () {});\n",
    );
    write(
        &dir.path().join("client/Shell/_private/grid.js"),
        "define(\"Shell/_private/grid\", [], function () {});\n",
    );
    let config = BuildConfig::load(&dir.path().join("kiln.toml")).unwrap();

    Workflow::new(&config).run().unwrap();
    let once = std::fs::read_to_string(dir.path().join("build/Shell/bundle.js")).unwrap();
    Workflow::new(&config).run().unwrap();
    let again = std::fs::read_to_string(dir.path().join("build/Shell/bundle.js")).unwrap();

    assert_eq!(once, again);
    assert_eq!(once.matches(PACKED_MARKER).count(), 1);
}

#[test]
fn bundle_conflict_aborts_the_run() {
    let dir = tempdir().unwrap();
    write(
        &dir.path().join("kiln.toml"),
        r#"
output = "build"

[[module]]
name = "Shell"
path = "client/Shell"
required = true

[[bundle]]
name = "Shell/panel"
host = "Shell"
modules = ["Shell/_private/grid"]

[[bundle]]
name = "Shell/editor"
host = "Shell"
modules = ["Shell/_private/grid"]
"#,
    );
    write(&dir.path().join("client/Shell/a.js"), "var a = 1;\n");

    let config = BuildConfig::load(&dir.path().join("kiln.toml")).unwrap();
    let err = Workflow::new(&config).run().unwrap_err();
    assert!(matches!(err, KilnError::BundleConflict { ref module, .. }
        if module == "Shell/_private/grid"));
}

#[test]
fn bundle_cycle_is_reported_not_fatal() {
    let dir = tempdir().unwrap();
    write(
        &dir.path().join("kiln.toml"),
        r#"
output = "build"

[[module]]
name = "Shell"
path = "client/Shell"
required = true

[[bundle]]
name = "Shell/bundle"
host = "Shell"
modules = ["Shell/_private/a"]
"#,
    );
    write(
        &dir.path().join("client/Shell/_private/a.js"),
        "define(\"Shell/_private/a\", [\"Shell/ext\"], function () {});\n",
    );
    write(
        &dir.path().join("client/Shell/ext.js"),
        "define(\"Shell/ext\", [\"Shell/_private/a\"], function () {});\n",
    );

    let config = BuildConfig::load(&dir.path().join("kiln.toml")).unwrap();
    let report = Workflow::new(&config).run().unwrap();

    assert!(report.has_errors());
    let message = &report.errors[0].message;
    assert!(message.contains("lazy loading cycle"), "got: {message}");
    assert!(message.contains("Shell/ext"));
}

#[test]
fn manifest_shards_are_restricted_to_their_module() {
    let dir = tempdir().unwrap();
    write(
        &dir.path().join("kiln.toml"),
        r#"
output = "build"

[[module]]
name = "Shell"
path = "client/Shell"
required = true

[[module]]
name = "Auth"
path = "client/Auth"
required = true

[service_urls]
api = "/service/"
"#,
    );
    write(
        &dir.path().join("client/Shell/app.routes.js"),
        "\"/main/\": \"Shell/pages/main\"\n",
    );
    write(
        &dir.path().join("client/Auth/auth.routes.js"),
        "\"/login/\": \"Auth/pages/login\"\n",
    );

    let config = BuildConfig::load(&dir.path().join("kiln.toml")).unwrap();
    Workflow::new(&config).run().unwrap();

    let joined: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(dir.path().join("build/contents.json")).unwrap(),
    )
    .unwrap();
    assert!(joined["routes"]["/main/"].is_object());
    assert!(joined["routes"]["/login/"].is_object());

    let shard: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(dir.path().join("build/Shell/contents.json")).unwrap(),
    )
    .unwrap();
    assert!(shard["routes"]["/main/"].is_object());
    assert!(shard["routes"]["/login/"].is_null());
    // Service URLs are application-global and repeat in every shard.
    assert_eq!(shard["service_urls"]["api"], "/service/");
}

#[test]
fn filtered_run_keeps_excluded_module_outputs() {
    let dir = tempdir().unwrap();
    write(
        &dir.path().join("kiln.toml"),
        r#"
output = "build"

[[module]]
name = "Shell"
path = "client/Shell"

[[module]]
name = "Auth"
path = "client/Auth"
"#,
    );
    write(&dir.path().join("client/Shell/a.js"), "var a = 1;\n");
    write(&dir.path().join("client/Auth/b.js"), "var b = 2;\n");

    let config = BuildConfig::load(&dir.path().join("kiln.toml")).unwrap();
    Workflow::new(&config).run().unwrap();
    assert!(dir.path().join("build/Shell/a.js").exists());

    // Rebuild only Auth; Shell's outputs and cache entries must survive.
    let only: BTreeSet<String> = [String::from("Auth")].into_iter().collect();
    Workflow::new(&config).run_filtered(Some(&only)).unwrap();
    assert!(dir.path().join("build/Shell/a.js").exists());

    let report = Workflow::new(&config).run().unwrap();
    assert_eq!(report.compiled, 0);
    assert_eq!(report.modules_skipped, 2);
}
