use std::path::PathBuf;

use ammopatch_core::candidate::CandidateKind;
use ammopatch_core::context::{CancellationToken, NoProgress};
use ammopatch_core::core_api::{CoreErrorCode, Engine, PassOptions, PatchOptions, Session};
use ammopatch_core::detector::DetectorMode;
use ammopatch_core::identity::RecordIdentity;
use ammopatch_core::plugin::OverrideFile;
use ammopatch_core::record::Category;
use ammopatch_core::schema::SchemaVersion;
use ammopatch_core::store::LoadOrder;

fn fixture_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/fo4_load_order")
}

fn open_fixture() -> Session {
    Engine::new()
        .open_load_order(&fixture_dir())
        .expect("fixture load order should open")
}

fn id(plugin: &str, local_id: u32) -> RecordIdentity {
    RecordIdentity::new(plugin, local_id).expect("valid identity")
}

fn excluding_old_mod() -> PassOptions {
    PassOptions {
        excluded: ["Excluded.esp"].into_iter().collect(),
        ..PassOptions::default()
    }
}

#[test]
fn pass_detects_schema_and_confirms_modification_and_leveled_list() {
    let session = open_fixture();
    assert_eq!(session.detect_schema(), SchemaVersion::Fallout4);

    let outcome = session
        .run(&excluding_old_mod(), &CancellationToken::new(), &NoProgress)
        .expect("pass should succeed");

    assert_eq!(outcome.schema, SchemaVersion::Fallout4);
    assert_eq!(outcome.detector_mode, DetectorMode::CategoryAware(SchemaVersion::Fallout4));
    assert_eq!(outcome.counts.weapons, 2);
    assert_eq!(outcome.counts.ammunition, 3);
    assert_eq!(outcome.counts.candidates, 4);
    assert_eq!(outcome.counts.confirmed, 2);
    assert!(outcome.finished_at >= outcome.started_at);

    let stages: Vec<_> = outcome.counts.providers.iter().map(|s| (s.stage, s.candidates)).collect();
    assert_eq!(stages, vec![("recipe", 1), ("reverse-reference", 2), ("modification", 1)]);

    let modification = outcome
        .confirmed()
        .find(|c| c.kind == CandidateKind::Reference(Category::ObjectModification))
        .expect("modification confirmed");
    assert_eq!(modification.identity, id("Mod.esp", 0x802));
    assert_eq!(modification.base_weapon, Some(id("Fallout4.esm", 0x100)));
    assert_eq!(modification.ammo, Some(id("Mod.esp", 0x800)));
    assert!(modification.confirm_reason.starts_with("attach-point:"));

    let leveled = outcome
        .confirmed()
        .find(|c| c.kind == CandidateKind::Reference(Category::LeveledItem))
        .expect("leveled list confirmed");
    assert_eq!(leveled.identity, id("Mod.esp", 0x803));
    assert_eq!(leveled.base_weapon, Some(id("Fallout4.esm", 0x101)));
    assert_eq!(leveled.ammo, Some(id("Mod.esp", 0x800)));
    assert!(leveled.confirm_reason.starts_with("reverse-map:"));
}

#[test]
fn every_candidate_explains_its_state() {
    let outcome = open_fixture()
        .run(&excluding_old_mod(), &CancellationToken::new(), &NoProgress)
        .expect("pass should succeed");

    for candidate in &outcome.candidates {
        assert!(!candidate.confirm_reason.is_empty(), "{candidate:?}");
    }
    let recipe = outcome
        .candidates
        .iter()
        .find(|c| c.kind == CandidateKind::Recipe)
        .expect("recipe candidate");
    assert!(!recipe.confirmed);
    // co_Pistol10mm reaches the pistol through a raw form id; it is found,
    // but it does not change the pistol's ammo.
    assert_eq!(
        recipe.confirm_reason,
        "reverse-map: 1 referencing record(s) of 000100:Fallout4.esm, none changes ammo"
    );
}

#[test]
fn excluded_plugins_contribute_no_candidates_or_evidence() {
    let session = open_fixture();
    let with_old_mod = session
        .run(&PassOptions::default(), &CancellationToken::new(), &NoProgress)
        .expect("pass should succeed");
    let without = session
        .run(&excluding_old_mod(), &CancellationToken::new(), &NoProgress)
        .expect("pass should succeed");

    assert_eq!(with_old_mod.counts.candidates, 5);
    assert!(with_old_mod.counts.confirmed > without.counts.confirmed);
    assert!(
        without
            .candidates
            .iter()
            .all(|c| !c.source_plugin.eq_ignore_ascii_case("Excluded.esp"))
    );
}

#[test]
fn patch_from_pass_writes_two_overrides_that_parse_back() {
    let session = open_fixture();
    let outcome = session
        .run(&excluding_old_mod(), &CancellationToken::new(), &NoProgress)
        .expect("pass should succeed");

    let report = session
        .build_patch(&outcome, "AmmoPatch.esp")
        .expect("patch should build");
    assert_eq!(report.written, 2);
    assert_eq!(report.skipped, 0);
    assert_eq!(report.file.header.masters, vec!["Fallout4.esm", "Mod.esp"]);

    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("AmmoPatch.esp");
    report.write_to(&path).expect("patch should write");

    let bytes = std::fs::read(&path).expect("patch should read back");
    let parsed = OverrideFile::parse("AmmoPatch.esp", &bytes).expect("patch should parse");
    assert!(parsed.header.is_light());
    assert_eq!(parsed.header.masters, report.file.header.masters);
    assert_eq!(parsed.overrides, report.file.overrides);
}

#[test]
fn compressed_patch_parses_back_to_the_same_overrides() {
    let session = open_fixture();
    let outcome = session
        .run(&excluding_old_mod(), &CancellationToken::new(), &NoProgress)
        .expect("pass should succeed");

    let report = session
        .build_patch_with(
            &outcome,
            &PatchOptions {
                author: Some("tester".to_string()),
                compress: true,
                ..PatchOptions::default()
            },
        )
        .expect("patch should build");
    let bytes = report.to_bytes().expect("patch should encode");
    let parsed = OverrideFile::parse("AmmoPatch.esp", &bytes).expect("patch should parse");

    assert_eq!(parsed.header.author.as_deref(), Some("tester"));
    assert_eq!(parsed.overrides, report.file.overrides);
}

#[test]
fn bad_output_name_is_rejected_before_building() {
    let session = open_fixture();
    let outcome = session
        .run(&excluding_old_mod(), &CancellationToken::new(), &NoProgress)
        .expect("pass should succeed");

    let err = session
        .build_patch(&outcome, "../AmmoPatch.esp")
        .expect_err("path-like name should be rejected");
    assert_eq!(err.code, CoreErrorCode::InvalidConfig);
}

#[test]
fn cancelled_pass_keeps_candidates_gathered_so_far() {
    let session = open_fixture();
    let cancel = CancellationToken::new();
    let cancel_after_recipes = |status: &str| {
        if status.starts_with("recipe provider") {
            cancel.cancel();
        }
    };

    let err = session
        .run(&excluding_old_mod(), &cancel, &cancel_after_recipes)
        .expect_err("pass should be cancelled");
    assert_eq!(err.code, CoreErrorCode::Cancelled);

    let partial = session.partial_candidates();
    assert_eq!(partial.len(), 1);
    assert_eq!(partial[0].kind, CandidateKind::Recipe);
}

#[test]
fn pass_cancelled_up_front_fails_fast() {
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = open_fixture()
        .run(&PassOptions::default(), &cancel, &NoProgress)
        .expect_err("pass should be cancelled");
    assert!(err.is_cancelled());
}

#[test]
fn empty_store_is_a_missing_store() {
    let err = Engine::new()
        .open_store(LoadOrder::from_plugins(Vec::new()))
        .err()
        .expect("empty store should be rejected");
    assert_eq!(err.code, CoreErrorCode::MissingStore);
}

#[test]
fn missing_load_order_directory_is_an_io_error() {
    let dir = tempfile::tempdir().expect("temp dir");
    let err = Engine::new()
        .open_load_order(dir.path())
        .err()
        .expect("no plugins.txt should be rejected");
    assert_eq!(err.code, CoreErrorCode::Io);
}
