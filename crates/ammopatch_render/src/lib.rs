use std::borrow::Cow;
use std::fmt::Write as _;

use ammopatch_core::candidate::Candidate;
use ammopatch_core::core_api::PassOutcome;
use ammopatch_core::detector::DetectorMode;
use ammopatch_core::identity::RecordIdentity;
use ammopatch_core::layout::FileLayout;
use ammopatch_core::patch::PatchReport;
use ammopatch_core::plugin::OverrideFile;
use serde_json::{Map as JsonMap, Value as JsonValue};

const KIND_COL_WIDTH: usize = 8;
const RECORD_COL_WIDTH: usize = 28;
const STAGE_COL_WIDTH: usize = 20;

/// Header row of the diagnostics CSV, in column order.
pub const CSV_COLUMNS: [&str; 12] = [
    "candidate_kind",
    "base_weapon_identity",
    "base_weapon_label",
    "candidate_identity",
    "candidate_label",
    "ammo_identity",
    "ammo_label",
    "source_plugin",
    "notes",
    "suggested_target",
    "confirmed",
    "confirm_reason",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TextRenderOptions {
    /// Also list unconfirmed candidates and resolver counters.
    pub verbose: bool,
}

/// One row per candidate, confirmed or not.
pub fn render_candidates_csv(candidates: &[Candidate]) -> String {
    let mut out = String::new();
    write_csv_row(&mut out, CSV_COLUMNS.iter().map(|c| Cow::Borrowed(*c)));
    for candidate in candidates {
        let row = [
            Cow::Owned(candidate.kind.name()),
            Cow::Owned(optional_identity(candidate.base_weapon.as_ref())),
            Cow::Borrowed(candidate.base_weapon_label.as_deref().unwrap_or("")),
            Cow::Owned(candidate.identity.to_string()),
            Cow::Borrowed(candidate.label.as_str()),
            Cow::Owned(optional_identity(candidate.ammo.as_ref())),
            Cow::Borrowed(candidate.ammo_label.as_deref().unwrap_or("")),
            Cow::Borrowed(candidate.source_plugin.as_str()),
            Cow::Borrowed(candidate.notes.as_str()),
            Cow::Borrowed(candidate.suggested_target.as_str()),
            Cow::Borrowed(if candidate.confirmed { "true" } else { "false" }),
            Cow::Borrowed(candidate.confirm_reason.as_str()),
        ];
        write_csv_row(&mut out, row.into_iter());
    }
    out
}

fn write_csv_row<'a>(out: &mut String, fields: impl Iterator<Item = Cow<'a, str>>) {
    for (i, field) in fields.enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&csv_field(&field));
    }
    out.push_str("\r\n");
}

/// Quotes a field when it holds a separator, quote or line break.
fn csv_field(value: &str) -> Cow<'_, str> {
    if !value.contains([',', '"', '\r', '\n']) {
        return Cow::Borrowed(value);
    }
    Cow::Owned(format!("\"{}\"", value.replace('"', "\"\"")))
}

fn optional_identity(identity: Option<&RecordIdentity>) -> String {
    identity.map(ToString::to_string).unwrap_or_default()
}

pub fn render_pass_json(outcome: &PassOutcome, patch: Option<&PatchReport>) -> JsonValue {
    let counts = &outcome.counts;
    let mut out = JsonMap::new();

    out.insert(
        "schema".to_string(),
        JsonValue::String(outcome.schema.to_string()),
    );
    out.insert(
        "detector_mode".to_string(),
        JsonValue::String(detector_mode_name(outcome.detector_mode)),
    );
    out.insert(
        "started_at".to_string(),
        JsonValue::String(outcome.started_at.to_rfc3339()),
    );
    out.insert(
        "finished_at".to_string(),
        JsonValue::String(outcome.finished_at.to_rfc3339()),
    );
    out.insert(
        "excluded".to_string(),
        JsonValue::Array(
            outcome
                .excluded
                .iter()
                .map(|p| JsonValue::String(p.to_string()))
                .collect(),
        ),
    );

    let mut totals = JsonMap::new();
    totals.insert("weapons".to_string(), JsonValue::from(counts.weapons));
    totals.insert("ammunition".to_string(), JsonValue::from(counts.ammunition));
    totals.insert(
        "index_identities".to_string(),
        JsonValue::from(counts.index_identities),
    );
    totals.insert(
        "index_entries".to_string(),
        JsonValue::from(counts.index_entries),
    );
    totals.insert(
        "index_malformed".to_string(),
        JsonValue::from(counts.index_malformed),
    );
    totals.insert("candidates".to_string(), JsonValue::from(counts.candidates));
    totals.insert("confirmed".to_string(), JsonValue::from(counts.confirmed));
    out.insert("counts".to_string(), JsonValue::Object(totals));

    out.insert(
        "providers".to_string(),
        JsonValue::Array(
            counts
                .providers
                .iter()
                .map(|stage| {
                    let mut m = JsonMap::new();
                    m.insert("stage".to_string(), JsonValue::from(stage.stage));
                    m.insert("candidates".to_string(), JsonValue::from(stage.candidates));
                    JsonValue::Object(m)
                })
                .collect(),
        ),
    );
    out.insert(
        "confirmers".to_string(),
        JsonValue::Array(
            counts
                .confirmers
                .iter()
                .map(|c| {
                    let mut m = JsonMap::new();
                    m.insert("confirmer".to_string(), JsonValue::from(c.confirmer));
                    m.insert("examined".to_string(), JsonValue::from(c.stats.examined));
                    m.insert("confirmed".to_string(), JsonValue::from(c.stats.confirmed));
                    m.insert("declined".to_string(), JsonValue::from(c.stats.declined));
                    JsonValue::Object(m)
                })
                .collect(),
        ),
    );

    let mut resolver = JsonMap::new();
    resolver.insert("searches".to_string(), JsonValue::from(counts.resolver.searches));
    resolver.insert(
        "cache_hits".to_string(),
        JsonValue::from(counts.resolver.cache_hits),
    );
    resolver.insert(
        "unresolved".to_string(),
        JsonValue::from(counts.resolver.unresolved),
    );
    resolver.insert("cycles".to_string(), JsonValue::from(counts.resolver.cycles));
    resolver.insert(
        "strategy_failures".to_string(),
        JsonValue::from(counts.resolver.strategy_failures),
    );
    resolver.insert(
        "failure_classes".to_string(),
        JsonValue::from(counts.resolver.failure_classes),
    );
    out.insert("resolver".to_string(), JsonValue::Object(resolver));

    out.insert(
        "candidates".to_string(),
        JsonValue::Array(outcome.candidates.iter().map(candidate_to_json).collect()),
    );
    out.insert(
        "patch".to_string(),
        patch.map_or(JsonValue::Null, patch_to_json),
    );

    JsonValue::Object(out)
}

fn candidate_to_json(candidate: &Candidate) -> JsonValue {
    let mut m = JsonMap::new();
    m.insert("kind".to_string(), JsonValue::String(candidate.kind.name()));
    m.insert(
        "identity".to_string(),
        JsonValue::String(candidate.identity.to_string()),
    );
    m.insert("label".to_string(), JsonValue::String(candidate.label.clone()));
    m.insert(
        "base_weapon".to_string(),
        labelled_json(candidate.base_weapon.as_ref(), candidate.base_weapon_label.as_deref()),
    );
    m.insert(
        "ammo".to_string(),
        labelled_json(candidate.ammo.as_ref(), candidate.ammo_label.as_deref()),
    );
    m.insert(
        "source_plugin".to_string(),
        JsonValue::String(candidate.source_plugin.clone()),
    );
    m.insert("notes".to_string(), JsonValue::String(candidate.notes.clone()));
    m.insert(
        "suggested_target".to_string(),
        JsonValue::from(candidate.suggested_target.as_str()),
    );
    m.insert("confirmed".to_string(), JsonValue::Bool(candidate.confirmed));
    m.insert(
        "confirm_reason".to_string(),
        JsonValue::String(candidate.confirm_reason.clone()),
    );
    JsonValue::Object(m)
}

fn labelled_json(identity: Option<&RecordIdentity>, label: Option<&str>) -> JsonValue {
    let Some(identity) = identity else {
        return JsonValue::Null;
    };
    let mut m = JsonMap::new();
    m.insert("identity".to_string(), JsonValue::String(identity.to_string()));
    m.insert(
        "label".to_string(),
        label.map_or(JsonValue::Null, |l| JsonValue::String(l.to_string())),
    );
    JsonValue::Object(m)
}

fn patch_to_json(report: &PatchReport) -> JsonValue {
    let mut m = JsonMap::new();
    m.insert("file".to_string(), JsonValue::String(report.file.name.clone()));
    m.insert("written".to_string(), JsonValue::from(report.written));
    m.insert("skipped".to_string(), JsonValue::from(report.skipped));
    m.insert("failed".to_string(), JsonValue::from(report.failed));
    m.insert(
        "masters".to_string(),
        JsonValue::Array(
            report
                .file
                .header
                .masters
                .iter()
                .map(|master| JsonValue::String(master.clone()))
                .collect(),
        ),
    );
    m.insert(
        "skipped_reasons".to_string(),
        JsonValue::Array(
            report
                .skipped_reasons
                .iter()
                .map(|s| {
                    let mut entry = JsonMap::new();
                    entry.insert("candidate".to_string(), JsonValue::String(s.candidate.to_string()));
                    entry.insert("reason".to_string(), JsonValue::String(s.reason.clone()));
                    JsonValue::Object(entry)
                })
                .collect(),
        ),
    );
    JsonValue::Object(m)
}

pub fn render_pass_text(
    outcome: &PassOutcome,
    patch: Option<&PatchReport>,
    options: TextRenderOptions,
) -> String {
    let counts = &outcome.counts;
    let mut out = String::new();

    writeln!(&mut out, "AMMOPATCH PASS").expect("writing to String cannot fail");
    writeln!(
        &mut out,
        "  Schema: {} ({})",
        outcome.schema,
        detector_mode_name(outcome.detector_mode)
    )
    .expect("writing to String cannot fail");
    let excluded: Vec<&str> = outcome.excluded.iter().collect();
    writeln!(
        &mut out,
        "  Excluded: {}",
        if excluded.is_empty() { "-".to_string() } else { excluded.join(", ") }
    )
    .expect("writing to String cannot fail");
    writeln!(
        &mut out,
        "  Started: {}  Took: {} ms",
        outcome.started_at.format("%Y-%m-%d %H:%M:%S UTC"),
        (outcome.finished_at - outcome.started_at).num_milliseconds()
    )
    .expect("writing to String cannot fail");
    writeln!(&mut out).expect("writing to String cannot fail");

    writeln!(
        &mut out,
        "  Weapons: {}  Ammunition: {}  Index: {} identities / {} links",
        format_count(counts.weapons),
        format_count(counts.ammunition),
        format_count(counts.index_identities),
        format_count(counts.index_entries),
    )
    .expect("writing to String cannot fail");
    if counts.index_malformed > 0 {
        writeln!(&mut out, "  Malformed links skipped: {}", counts.index_malformed)
            .expect("writing to String cannot fail");
    }
    writeln!(&mut out).expect("writing to String cannot fail");

    writeln!(&mut out, "  Providers").expect("writing to String cannot fail");
    for stage in &counts.providers {
        writeln!(
            &mut out,
            "    {:<w$}{}",
            stage.stage,
            stage.candidates,
            w = STAGE_COL_WIDTH
        )
        .expect("writing to String cannot fail");
    }
    writeln!(&mut out, "  Confirmers").expect("writing to String cannot fail");
    for c in &counts.confirmers {
        writeln!(
            &mut out,
            "    {:<w$}examined {}  confirmed {}  declined {}",
            c.confirmer,
            c.stats.examined,
            c.stats.confirmed,
            c.stats.declined,
            w = STAGE_COL_WIDTH
        )
        .expect("writing to String cannot fail");
    }
    if options.verbose {
        writeln!(
            &mut out,
            "  Resolver: {} searches, {} cache hits, {} unresolved, {} cycles, {} strategy failures",
            counts.resolver.searches,
            counts.resolver.cache_hits,
            counts.resolver.unresolved,
            counts.resolver.cycles,
            counts.resolver.strategy_failures
        )
        .expect("writing to String cannot fail");
    }
    writeln!(&mut out).expect("writing to String cannot fail");

    writeln!(
        &mut out,
        "  Candidates: {}  Confirmed: {}",
        counts.candidates, counts.confirmed
    )
    .expect("writing to String cannot fail");
    write_candidate_table(&mut out, "CONFIRMED", outcome.confirmed());
    if options.verbose {
        write_candidate_table(
            &mut out,
            "UNCONFIRMED",
            outcome.candidates.iter().filter(|c| !c.confirmed),
        );
    }

    if let Some(report) = patch {
        writeln!(&mut out).expect("writing to String cannot fail");
        writeln!(
            &mut out,
            "  Patch {}: {} written, {} skipped, {} failed",
            report.file.name, report.written, report.skipped, report.failed
        )
        .expect("writing to String cannot fail");
        if !report.file.header.masters.is_empty() {
            writeln!(
                &mut out,
                "  Masters: {}",
                report.file.header.masters.join(", ")
            )
            .expect("writing to String cannot fail");
        }
        for skipped in &report.skipped_reasons {
            writeln!(&mut out, "    {}: {}", skipped.candidate, skipped.reason)
                .expect("writing to String cannot fail");
        }
    }

    out
}

fn write_candidate_table<'a>(
    out: &mut String,
    title: &str,
    candidates: impl Iterator<Item = &'a Candidate>,
) {
    let candidates: Vec<&Candidate> = candidates.collect();
    if candidates.is_empty() {
        return;
    }
    writeln!(out).expect("writing to String cannot fail");
    writeln!(out, "  {title}").expect("writing to String cannot fail");
    writeln!(
        out,
        "  {:<k$}{:<r$}{:<r$}{}",
        "Kind",
        "Candidate",
        "Base weapon",
        "Ammo",
        k = KIND_COL_WIDTH,
        r = RECORD_COL_WIDTH
    )
    .expect("writing to String cannot fail");
    for candidate in candidates {
        let line = format!(
            "  {:<k$}{:<r$}{:<r$}{}",
            candidate.kind.name(),
            fit_column(&candidate.label, RECORD_COL_WIDTH - 1),
            fit_column(candidate.base_weapon_label.as_deref().unwrap_or("-"), RECORD_COL_WIDTH - 1),
            candidate.ammo_label.as_deref().unwrap_or("-"),
            k = KIND_COL_WIDTH,
            r = RECORD_COL_WIDTH
        );
        writeln!(out, "{}", line.trim_end()).expect("writing to String cannot fail");
        writeln!(out, "    {}", candidate.confirm_reason).expect("writing to String cannot fail");
    }
}

pub fn render_override_json(file: &OverrideFile, layout: Option<&FileLayout>) -> JsonValue {
    let mut out = JsonMap::new();
    out.insert("name".to_string(), JsonValue::String(file.name.clone()));
    out.insert(
        "version".to_string(),
        JsonValue::from(f64::from(file.header.version)),
    );
    out.insert("light".to_string(), JsonValue::Bool(file.header.is_light()));
    out.insert(
        "author".to_string(),
        file.header
            .author
            .as_ref()
            .map_or(JsonValue::Null, |a| JsonValue::String(a.clone())),
    );
    out.insert(
        "next_object_id".to_string(),
        JsonValue::from(file.header.next_object_id),
    );
    out.insert(
        "masters".to_string(),
        JsonValue::Array(
            file.header
                .masters
                .iter()
                .map(|m| JsonValue::String(m.clone()))
                .collect(),
        ),
    );
    out.insert(
        "overrides".to_string(),
        JsonValue::Array(
            file.overrides
                .iter()
                .map(|o| {
                    let mut m = JsonMap::new();
                    m.insert("weapon".to_string(), JsonValue::String(o.weapon.to_string()));
                    m.insert(
                        "editor_id".to_string(),
                        o.editor_id
                            .as_ref()
                            .map_or(JsonValue::Null, |e| JsonValue::String(e.clone())),
                    );
                    m.insert("ammo".to_string(), JsonValue::String(o.ammo.to_string()));
                    JsonValue::Object(m)
                })
                .collect(),
        ),
    );
    if let Some(layout) = layout {
        out.insert("layout".to_string(), layout_to_json(layout));
    }
    JsonValue::Object(out)
}

fn layout_to_json(layout: &FileLayout) -> JsonValue {
    let mut m = JsonMap::new();
    m.insert("file_len".to_string(), JsonValue::from(layout.file_len));
    m.insert(
        "sections".to_string(),
        JsonValue::Array(
            layout
                .sections
                .iter()
                .map(|s| {
                    let mut section = JsonMap::new();
                    section.insert("section".to_string(), JsonValue::String(s.id.label()));
                    section.insert("start".to_string(), JsonValue::from(s.range.start));
                    section.insert("end".to_string(), JsonValue::from(s.range.end));
                    JsonValue::Object(section)
                })
                .collect(),
        ),
    );
    JsonValue::Object(m)
}

pub fn render_override_text(file: &OverrideFile, layout: Option<&FileLayout>) -> String {
    let header = &file.header;
    let mut out = String::new();

    writeln!(&mut out, "{}", file.name).expect("writing to String cannot fail");
    writeln!(
        &mut out,
        "  Version: {:.2}  Light: {}  Author: {}",
        header.version,
        if header.is_light() { "yes" } else { "no" },
        header.author.as_deref().unwrap_or("-")
    )
    .expect("writing to String cannot fail");
    writeln!(&mut out, "  Masters ({}):", header.masters.len())
        .expect("writing to String cannot fail");
    for (i, master) in header.masters.iter().enumerate() {
        writeln!(&mut out, "    [{i:02X}] {master}").expect("writing to String cannot fail");
    }
    writeln!(&mut out, "  Overrides ({}):", file.overrides.len())
        .expect("writing to String cannot fail");
    for o in &file.overrides {
        let line = format!(
            "    {:<r$}{:<r$}-> {}",
            o.weapon.to_string(),
            fit_column(o.editor_id.as_deref().unwrap_or("-"), RECORD_COL_WIDTH - 1),
            o.ammo,
            r = RECORD_COL_WIDTH
        );
        writeln!(&mut out, "{}", line.trim_end()).expect("writing to String cannot fail");
    }
    if let Some(layout) = layout {
        writeln!(&mut out, "  Layout ({} bytes):", layout.file_len)
            .expect("writing to String cannot fail");
        for section in &layout.sections {
            writeln!(
                &mut out,
                "    {:<12}{:>8}..{} ({} bytes)",
                section.id.label(),
                section.range.start,
                section.range.end,
                section.range.len()
            )
            .expect("writing to String cannot fail");
        }
    }

    out
}

fn detector_mode_name(mode: DetectorMode) -> String {
    match mode {
        DetectorMode::CategoryAware(version) => format!("category-aware {version}"),
        DetectorMode::BestEffort => "best-effort".to_string(),
    }
}

fn fit_column(value: &str, width: usize) -> String {
    if value.chars().count() <= width {
        return value.to_string();
    }
    if width <= 3 {
        return value.chars().take(width).collect();
    }
    let mut out: String = value.chars().take(width - 3).collect();
    out.push_str("...");
    out
}

fn format_count(n: usize) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    for (i, c) in s.chars().enumerate() {
        if i > 0 && (s.len() - i).is_multiple_of(3) {
            result.push(',');
        }
        result.push(c);
    }
    result
}
