//! Integration tests for the canon binary

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use tempfile::tempdir;

/// Run canon inside `dir` with an isolated home directory.
fn canon(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_canon"))
        .args(args)
        .current_dir(dir)
        .env("HOME", dir)
        .env_remove("CANON_CONFIG_SEGMENT")
        .env_remove("CANON_NONCE_LEN")
        .env_remove("CANON_LOG")
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute canon")
}

const ACTION: &str = r#"{
    "requirements": ["supports-path-remapping", "requires-materialized-input-paths"],
    "inputs": [
        { "path": "cfgA/bin/x", "digest": "01" },
        { "path": "cfgB/bin/x", "digest": "02" },
        { "path": "src/main.c", "kind": "source" }
    ],
    "outputs": ["cfgA/bin/out.o"],
    "args": ["-o", "cfgA/bin/out.o", "--in=cfgB/bin/x", "src/main.c"]
}"#;

// ========== plan ==========

#[test]
fn test_plan_json() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("action.json"), ACTION).unwrap();

    let output = canon(dir.path(), &["plan", "action.json", "--json"]);
    assert!(output.status.success(), "{:?}", output);

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let nonce = report["nonce"].as_str().unwrap();
    assert_eq!(nonce.len(), 25);
    assert_eq!(report["materialize"], true);
    assert_eq!(report["entries"].as_array().unwrap().len(), 2);
    assert_eq!(report["entries"][0]["from"], "cfgA/bin/x");
    assert_eq!(report["entries"][0]["to"], format!("{}-0/bin/x", nonce));
    assert_eq!(report["entries"][1]["to"], format!("{}-1/bin/x", nonce));

    // Declared outputs take the output literal, sources stay as they are
    let args: Vec<&str> = report["args"]
        .as_array()
        .unwrap()
        .iter()
        .map(|a| a.as_str().unwrap())
        .collect();
    assert_eq!(args[1], "out/bin/out.o");
    assert_eq!(args[2], format!("--in={}-1/bin/x", nonce));
    assert_eq!(args[3], "src/main.c");
}

#[test]
fn test_plan_text_identity_without_opt_in() {
    let dir = tempdir().unwrap();
    fs::write(
        dir.path().join("action.json"),
        r#"{ "inputs": [{ "path": "cfgA/bin/x", "digest": "01" }] }"#,
    )
    .unwrap();

    let output = canon(dir.path(), &["plan", "action.json"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("identity mapping"));
}

#[test]
fn test_plan_missing_file_fails() {
    let dir = tempdir().unwrap();
    let output = canon(dir.path(), &["plan", "nope.json"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("nope.json"));
}

#[test]
fn test_plan_args_do_not_depend_on_configuration_name() {
    let dir = tempdir().unwrap();
    let action = |cfg: &str| {
        format!(
            r#"{{
                "requirements": ["supports-path-remapping"],
                "inputs": [{{ "path": "{cfg}/bin/x", "digest": "0a" }}],
                "outputs": ["{cfg}/bin/y.o"],
                "args": ["-o", "{cfg}/bin/y.o", "{cfg}/bin/x"]
            }}"#,
            cfg = cfg
        )
    };
    fs::write(dir.path().join("k8.json"), action("k8-fastbuild")).unwrap();
    fs::write(dir.path().join("arm.json"), action("arm64-opt")).unwrap();

    let a = canon(dir.path(), &["plan", "k8.json", "--json"]);
    let b = canon(dir.path(), &["plan", "arm.json", "--json"]);
    let a: serde_json::Value = serde_json::from_slice(&a.stdout).unwrap();
    let b: serde_json::Value = serde_json::from_slice(&b.stdout).unwrap();
    assert_eq!(a["args"], b["args"]);
    assert_eq!(a["args"][1], "out/bin/y.o");
}

// ========== materialize ==========

#[cfg(unix)]
#[test]
fn test_materialize_creates_links() {
    let dir = tempdir().unwrap();
    fs::create_dir_all(dir.path().join("cfgA/bin")).unwrap();
    fs::create_dir_all(dir.path().join("cfgB/bin")).unwrap();
    fs::write(dir.path().join("cfgA/bin/x"), "a").unwrap();
    fs::write(dir.path().join("cfgB/bin/x"), "b").unwrap();
    fs::write(dir.path().join("action.json"), ACTION).unwrap();

    let plan = canon(dir.path(), &["plan", "action.json", "--json"]);
    let report: serde_json::Value = serde_json::from_slice(&plan.stdout).unwrap();
    let nonce = report["nonce"].as_str().unwrap().to_string();

    let output = canon(dir.path(), &["materialize", "action.json", "--exec-root", "."]);
    assert!(output.status.success(), "{:?}", output);

    let a = dir.path().join(format!("{}-0/bin/x", nonce));
    let b = dir.path().join(format!("{}-1/bin/x", nonce));
    assert_eq!(fs::read_to_string(a).unwrap(), "a");
    assert_eq!(fs::read_to_string(b).unwrap(), "b");
}

// ========== runfiles / config ==========

#[test]
fn test_runfiles() {
    let dir = tempdir().unwrap();
    let output = canon(dir.path(), &["runfiles", "cfgA/bin/tool.runfiles/data"]);
    assert!(output.status.success());
    assert_eq!(
        String::from_utf8_lossy(&output.stdout).trim(),
        "run/bin/tool.runfiles/data"
    );
}

#[test]
fn test_config_show_is_valid_toml() {
    let dir = tempdir().unwrap();
    let output = canon(dir.path(), &["config", "show"]);
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    let config: canon_config::Config = toml::from_str(&stdout).unwrap();
    assert_eq!(config, canon_config::Config::default());
}

#[test]
fn test_project_config_is_honored() {
    let dir = tempdir().unwrap();
    fs::create_dir_all(dir.path().join(".canon")).unwrap();
    fs::write(
        dir.path().join(".canon/config.toml"),
        "[remap]\nrunfiles_segment = \"runfiles\"\n",
    )
    .unwrap();

    let output = canon(dir.path(), &["runfiles", "cfgA/bin/x"]);
    assert!(output.status.success(), "{:?}", output);
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "runfiles/bin/x");
}

#[test]
fn test_invalid_config_is_reported() {
    let dir = tempdir().unwrap();
    fs::create_dir_all(dir.path().join(".canon")).unwrap();
    fs::write(dir.path().join(".canon/config.toml"), "[remap]\nnonce_len = 3\n").unwrap();

    let output = canon(dir.path(), &["config", "show"]);
    assert!(!output.status.success());
}
