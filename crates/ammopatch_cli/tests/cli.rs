use std::fs;
use std::path::PathBuf;
use std::process::Command;

use serde_json::Value;

fn workspace_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../..")
}

fn fixture_dir() -> String {
    workspace_root()
        .join("crates/ammopatch_core/tests/fixtures/fo4_load_order")
        .to_string_lossy()
        .to_string()
}

fn run_cli(args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_ammopatch"))
        .args(args)
        .env_remove("AMMOPATCH_LOG")
        .output()
        .expect("failed to run ammopatch CLI")
}

fn stdout_json(output: &std::process::Output) -> Value {
    let stdout = String::from_utf8_lossy(&output.stdout);
    serde_json::from_str(&stdout).expect("stdout should be valid JSON")
}

#[test]
fn scan_json_reports_confirmed_candidates() {
    let dir = fixture_dir();
    let output = run_cli(&["scan", &dir, "--exclude", "Excluded.esp", "--json"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let json = stdout_json(&output);
    assert_eq!(json["schema"], "fallout4");
    assert_eq!(json["counts"]["candidates"], 4);
    assert_eq!(json["counts"]["confirmed"], 2);
    assert!(json["patch"].is_null());
}

#[test]
fn scan_text_summary_is_the_default() {
    let dir = fixture_dir();
    let output = run_cli(&["scan", &dir, "--exclude", "Excluded.esp"]);
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("AMMOPATCH PASS"));
    assert!(stdout.contains("Candidates: 4  Confirmed: 2"));
}

#[test]
fn scan_writes_csv_and_patch_that_inspect_reads_back() {
    let dir = fixture_dir();
    let scratch = tempfile::tempdir().expect("temp dir");
    let csv_path = scratch.path().join("candidates.csv");
    let patch_path = scratch.path().join("MyAmmo.esp");
    let csv_arg = csv_path.to_string_lossy().to_string();
    let patch_arg = patch_path.to_string_lossy().to_string();

    let output = run_cli(&[
        "scan",
        &dir,
        "--exclude",
        "Excluded.esp",
        "--csv",
        &csv_arg,
        "--output",
        &patch_arg,
        "--author",
        "tester",
    ]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Patch MyAmmo.esp: 2 written, 0 skipped, 0 failed"));

    let csv = fs::read_to_string(&csv_path).expect("csv should be written");
    assert!(csv.starts_with("candidate_kind,"));
    assert_eq!(csv.lines().count(), 5);

    let output = run_cli(&["inspect", &patch_arg, "--json"]);
    assert!(output.status.success());
    let json = stdout_json(&output);
    assert_eq!(json["name"], "MyAmmo.esp");
    assert_eq!(json["author"], "tester");
    assert_eq!(json["light"], true);
    assert_eq!(json["masters"][0], "Fallout4.esm");
    assert_eq!(json["masters"][1], "Mod.esp");
    assert_eq!(json["overrides"].as_array().map(Vec::len), Some(2));
    assert_eq!(json["layout"]["sections"][0]["section"], "TES4");
}

#[test]
fn config_file_supplies_exclusions() {
    let dir = fixture_dir();
    let scratch = tempfile::tempdir().expect("temp dir");
    let config_path = scratch.path().join("ammopatch.toml");
    fs::write(&config_path, "excluded_plugins = [\"Excluded.esp\"]\nschema = \"fallout4\"\n")
        .expect("config should be written");
    let config_arg = config_path.to_string_lossy().to_string();

    let output = run_cli(&["scan", &dir, "--config", &config_arg, "--json"]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let json = stdout_json(&output);
    assert_eq!(json["counts"]["confirmed"], 2);
    assert_eq!(json["excluded"][0], "excluded.esp");
}

#[test]
fn invalid_config_fails() {
    let dir = fixture_dir();
    let scratch = tempfile::tempdir().expect("temp dir");
    let config_path = scratch.path().join("ammopatch.toml");
    fs::write(&config_path, "no_such_key = 1\n").expect("config should be written");
    let config_arg = config_path.to_string_lossy().to_string();

    let output = run_cli(&["scan", &dir, "--config", &config_arg]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Error loading config"));
}

#[test]
fn unknown_schema_is_a_usage_error() {
    let dir = fixture_dir();
    let output = run_cli(&["scan", &dir, "--schema", "skyrim"]);
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn output_without_plugin_extension_is_a_usage_error() {
    let dir = fixture_dir();
    let scratch = tempfile::tempdir().expect("temp dir");
    let patch_arg = scratch.path().join("patch.txt").to_string_lossy().to_string();

    let output = run_cli(&["scan", &dir, "--output", &patch_arg]);
    assert_eq!(output.status.code(), Some(2));
    assert!(!scratch.path().join("patch.txt").exists());
}

#[test]
fn missing_load_order_fails() {
    let scratch = tempfile::tempdir().expect("temp dir");
    let dir = scratch.path().to_string_lossy().to_string();

    let output = run_cli(&["scan", &dir]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Error opening load order"));
}

#[test]
fn inspect_rejects_non_plugin_bytes() {
    let scratch = tempfile::tempdir().expect("temp dir");
    let path = scratch.path().join("junk.esp");
    fs::write(&path, b"not a plugin at all, just text").expect("file should be written");
    let arg = path.to_string_lossy().to_string();

    let output = run_cli(&["inspect", &arg]);
    assert_eq!(output.status.code(), Some(1));
}
