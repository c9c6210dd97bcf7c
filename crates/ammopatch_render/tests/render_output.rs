use std::path::PathBuf;

use ammopatch_core::context::{CancellationToken, NoProgress};
use ammopatch_core::core_api::{Engine, PassOptions, PassOutcome, Session};
use ammopatch_core::plugin::OverrideFile;
use ammopatch_render::{
    CSV_COLUMNS, TextRenderOptions, render_candidates_csv, render_override_json,
    render_override_text, render_pass_json, render_pass_text,
};

fn workspace_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../..")
}

fn fixture_dir() -> PathBuf {
    workspace_root().join("crates/ammopatch_core/tests/fixtures/fo4_load_order")
}

fn run_fixture() -> (Session, PassOutcome) {
    let session = Engine::new()
        .open_load_order(&fixture_dir())
        .expect("fixture should open");
    let options = PassOptions {
        excluded: ["Excluded.esp"].into_iter().collect(),
        ..PassOptions::default()
    };
    let outcome = session
        .run(&options, &CancellationToken::new(), &NoProgress)
        .expect("pass should succeed");
    (session, outcome)
}

/// Splits one CSV line, honouring quoted fields.
fn split_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match (c, quoted) {
            ('"', true) if chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            ('"', _) => quoted = !quoted,
            (',', false) => fields.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    fields.push(current);
    fields
}

#[test]
fn csv_has_one_row_per_candidate_and_never_an_empty_reason() {
    let (_, outcome) = run_fixture();
    let csv = render_candidates_csv(&outcome.candidates);
    let lines: Vec<&str> = csv.split("\r\n").filter(|l| !l.is_empty()).collect();

    assert_eq!(split_csv_line(lines[0]), CSV_COLUMNS.to_vec());
    assert_eq!(lines.len(), outcome.candidates.len() + 1);

    let reason_col = CSV_COLUMNS.len() - 1;
    let confirmed_col = CSV_COLUMNS.iter().position(|c| *c == "confirmed").expect("column");
    let mut confirmed = 0;
    for line in &lines[1..] {
        let fields = split_csv_line(line);
        assert_eq!(fields.len(), CSV_COLUMNS.len(), "{line}");
        assert!(!fields[reason_col].is_empty(), "{line}");
        if fields[confirmed_col] == "true" {
            confirmed += 1;
        }
    }
    assert_eq!(confirmed, 2);
}

#[test]
fn pass_json_uses_canonical_top_level_order() {
    let (session, outcome) = run_fixture();
    let report = session
        .build_patch(&outcome, "AmmoPatch.esp")
        .expect("patch should build");
    let value = render_pass_json(&outcome, Some(&report));
    let keys: Vec<&str> = value
        .as_object()
        .expect("json should be an object")
        .keys()
        .map(String::as_str)
        .collect();

    assert_eq!(
        keys,
        vec![
            "schema",
            "detector_mode",
            "started_at",
            "finished_at",
            "excluded",
            "counts",
            "providers",
            "confirmers",
            "resolver",
            "candidates",
            "patch",
        ]
    );
    assert_eq!(value["schema"], "fallout4");
    assert_eq!(value["excluded"][0], "excluded.esp");
    assert_eq!(value["counts"]["confirmed"], 2);
    assert_eq!(value["patch"]["written"], 2);
    assert_eq!(value["candidates"].as_array().map(Vec::len), Some(4));
}

#[test]
fn pass_json_without_patch_has_null_patch() {
    let (_, outcome) = run_fixture();
    let value = render_pass_json(&outcome, None);
    assert!(value["patch"].is_null());
}

#[test]
fn text_summary_lists_confirmed_and_optionally_unconfirmed() {
    let (_, outcome) = run_fixture();

    let brief = render_pass_text(&outcome, None, TextRenderOptions::default());
    assert!(brief.contains("Schema: fallout4"));
    assert!(brief.contains("Candidates: 4  Confirmed: 2"));
    assert!(brief.contains("CONFIRMED"));
    assert!(brief.contains("LL_PipeRifleCustom"));
    assert!(!brief.contains("UNCONFIRMED"));
    assert!(!brief.contains("Resolver:"));

    let verbose = render_pass_text(&outcome, None, TextRenderOptions { verbose: true });
    assert!(verbose.contains("UNCONFIRMED"));
    assert!(verbose.contains("none changes ammo"));
    assert!(verbose.contains("Resolver:"));
}

#[test]
fn override_file_renders_masters_and_overrides() {
    let (session, outcome) = run_fixture();
    let report = session
        .build_patch(&outcome, "AmmoPatch.esp")
        .expect("patch should build");
    let bytes = report.to_bytes().expect("patch should encode");
    let (file, layout) =
        OverrideFile::parse_with_layout("AmmoPatch.esp", &bytes).expect("patch should parse");

    let text = render_override_text(&file, Some(&layout));
    assert!(text.starts_with("AmmoPatch.esp\n"));
    assert!(text.contains("Light: yes"));
    assert!(text.contains("[00] Fallout4.esm"));
    assert!(text.contains("[01] Mod.esp"));
    assert!(text.contains("Overrides (2):"));
    assert!(text.contains("GRUP:WEAP"));

    let value = render_override_json(&file, None);
    assert_eq!(value["light"], true);
    assert_eq!(value["overrides"].as_array().map(Vec::len), Some(2));
    assert!(value.get("layout").is_none());
}
