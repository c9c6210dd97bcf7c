//! Turns confirmed candidates into weapon overrides.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;

use crate::candidate::Candidate;
use crate::identity::{RecordIdentity, fold_plugin_name};
use crate::plugin::header::MAX_MASTERS;
use crate::plugin::{OverrideFile, PluginHeader, WeaponOverride};
use crate::record::{Category, FieldValue, Record, Reference};
use crate::resolver::LinkResolver;
use crate::schema::{FieldRole, SchemaProfile, find_role_field};

pub const DEFAULT_OUTPUT_NAME: &str = "AmmoPatch.esp";

/// What happened to one candidate at the output stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RecordOutcome {
    Applied { weapon: RecordIdentity, ammo: RecordIdentity },
    Skipped { reason: String },
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedCandidate {
    pub candidate: RecordIdentity,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatchReport {
    pub file: OverrideFile,
    /// Weapon records as they look with the override applied.
    #[serde(skip)]
    pub records: Vec<Record>,
    pub written: usize,
    pub skipped: usize,
    pub failed: usize,
    pub skipped_reasons: Vec<SkippedCandidate>,
}

pub struct PatchBuilder<'r, 's> {
    resolver: &'r LinkResolver<'s>,
    profile: &'static dyn SchemaProfile,
    file: OverrideFile,
    records: Vec<Record>,
    patched: HashSet<RecordIdentity>,
    written: usize,
    skipped: usize,
    failed: usize,
    skipped_reasons: Vec<SkippedCandidate>,
}

impl<'r, 's> PatchBuilder<'r, 's> {
    pub fn new(
        resolver: &'r LinkResolver<'s>,
        profile: &'static dyn SchemaProfile,
        output_name: &str,
        author: Option<&str>,
    ) -> Self {
        let mut header = PluginHeader::new(profile.version().header_version());
        header.author = author.map(ToOwned::to_owned);
        Self {
            resolver,
            profile,
            file: OverrideFile::new(output_name, header),
            records: Vec::new(),
            patched: HashSet::new(),
            written: 0,
            skipped: 0,
            failed: 0,
            skipped_reasons: Vec::new(),
        }
    }

    pub fn compress(mut self, compress: bool) -> Self {
        self.file.compress = compress;
        self
    }

    /// Applies every confirmed candidate. Unconfirmed ones are ignored
    /// without counting.
    pub fn build(mut self, candidates: &[Candidate]) -> PatchReport {
        for candidate in candidates.iter().filter(|c| c.confirmed) {
            let outcome = self.apply(candidate);
            match &outcome {
                RecordOutcome::Applied { weapon, ammo } => {
                    self.written += 1;
                    tracing::debug!(domain = "patch", weapon = %weapon, ammo = %ammo, "override written");
                }
                RecordOutcome::Skipped { reason } => {
                    self.skipped += 1;
                    tracing::debug!(domain = "patch", candidate = %candidate.identity, reason = %reason, "candidate skipped");
                    self.skipped_reasons.push(SkippedCandidate {
                        candidate: candidate.identity.clone(),
                        reason: reason.clone(),
                    });
                }
                RecordOutcome::Failed { reason } => {
                    self.failed += 1;
                    tracing::warn!(domain = "patch", candidate = %candidate.identity, reason = %reason, "override failed");
                    self.skipped_reasons.push(SkippedCandidate {
                        candidate: candidate.identity.clone(),
                        reason: reason.clone(),
                    });
                }
            }
        }
        self.file
            .header
            .sort_masters_by(&self.resolver.store().plugin_names());

        tracing::info!(
            domain = "patch",
            output = %self.file.name,
            written = self.written,
            skipped = self.skipped,
            failed = self.failed,
            masters = self.file.header.masters.len(),
            "patch built",
        );
        PatchReport {
            file: self.file,
            records: self.records,
            written: self.written,
            skipped: self.skipped,
            failed: self.failed,
            skipped_reasons: self.skipped_reasons,
        }
    }

    pub fn apply(&mut self, candidate: &Candidate) -> RecordOutcome {
        let Some(weapon) = self.target_weapon(candidate) else {
            return skipped(format!("{} resolves to no weapon", candidate.identity));
        };
        let Some(ammo_identity) = &candidate.ammo else {
            return skipped(format!("{} has no candidate ammo", candidate.identity));
        };
        let Some(ammo) = self.resolver.resolve_identity(ammo_identity) else {
            return skipped(format!("ammo {ammo_identity} does not resolve"));
        };
        if weapon.identity.is_from(&self.file.name) {
            return skipped(format!("{} belongs to the output file", weapon.identity));
        }
        if self.patched.contains(&weapon.identity) {
            return skipped(format!("{} is already patched", weapon.identity));
        }

        let header = &mut self.file.header;
        let new_masters = [weapon.identity.plugin(), ammo.identity.plugin()]
            .iter()
            .filter(|plugin| header.master_index(plugin).is_none())
            .map(|plugin| fold_plugin_name(plugin))
            .collect::<HashSet<_>>()
            .len();
        if header.masters.len() + new_masters > MAX_MASTERS {
            return RecordOutcome::Failed {
                reason: format!("master list is full; cannot add {}", weapon.identity.plugin()),
            };
        }
        header.add_master(weapon.identity.plugin());
        header.add_master(ammo.identity.plugin());

        let mut patched = (*weapon).clone();
        let field = find_role_field(self.profile, &weapon, FieldRole::Ammo)
            .map(|(name, _)| name.to_string())
            .or_else(|| self.profile.ammo_field(&weapon.category).map(ToOwned::to_owned))
            .unwrap_or_else(|| "ammo".to_string());
        patched.set_field(
            &field,
            FieldValue::Link(Reference::typed(ammo.identity.clone(), ammo.category.clone())),
        );

        self.file.overrides.push(WeaponOverride {
            weapon: weapon.identity.clone(),
            editor_id: weapon.editor_id.clone(),
            ammo: ammo.identity.clone(),
        });
        self.records.push(patched);
        self.patched.insert(weapon.identity.clone());

        RecordOutcome::Applied {
            weapon: weapon.identity.clone(),
            ammo: ammo.identity.clone(),
        }
    }

    /// The candidate itself when it is a weapon, else its base weapon.
    fn target_weapon(&self, candidate: &Candidate) -> Option<Arc<Record>> {
        // The expected category only steers the search; check what came back.
        let as_weapon = |identity: &RecordIdentity| {
            self.resolver
                .resolve_expecting(&Reference::Identity(identity.clone()), &Category::Weapon)
                .filter(|record| record.category == Category::Weapon)
        };
        as_weapon(&candidate.identity).or_else(|| candidate.base_weapon.as_ref().and_then(as_weapon))
    }
}

fn skipped(reason: String) -> RecordOutcome {
    RecordOutcome::Skipped { reason }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidate::{CandidateKind, Confirmation};
    use crate::schema::{SchemaVersion, profile_for};
    use crate::store::{LoadOrder, PluginData};

    fn id(plugin: &str, local: u32) -> RecordIdentity {
        RecordIdentity::new(plugin, local).unwrap()
    }

    fn store() -> LoadOrder {
        let base = PluginData::new("Fallout4.esm")
            .with_version(1.0)
            .with_record(
                Record::new(id("Fallout4.esm", 0x100), Category::Weapon)
                    .with_editor_id("Pistol")
                    .with_link("ammo", Reference::Identity(id("Fallout4.esm", 0x200))),
            )
            .with_record(Record::new(id("Fallout4.esm", 0x200), Category::Ammunition));
        let modded = PluginData::new("Mod.esp")
            .with_master("Fallout4.esm")
            .with_record(Record::new(id("Mod.esp", 0x800), Category::Ammunition).with_editor_id("Ammo556"));
        LoadOrder::from_plugins(vec![base, modded])
    }

    fn confirmed(identity: RecordIdentity, ammo: RecordIdentity) -> Candidate {
        let mut candidate = Candidate::new(CandidateKind::Recipe, identity, "c", "Mod.esp")
            .with_base_weapon(id("Fallout4.esm", 0x100), "Pistol");
        candidate.confirm(Confirmation {
            base_weapon: None,
            ammo,
            ammo_label: "Ammo556".to_string(),
            reason: "test".to_string(),
        });
        candidate
    }

    #[test]
    fn confirmed_candidate_becomes_light_override_with_masters() {
        let store = store();
        let resolver = LinkResolver::new(&store);
        let profile = profile_for(SchemaVersion::Fallout4);
        let candidates = vec![confirmed(id("Mod.esp", 0x900), id("Mod.esp", 0x800))];

        let report = PatchBuilder::new(&resolver, profile, DEFAULT_OUTPUT_NAME, None).build(&candidates);
        assert_eq!(report.written, 1);
        assert_eq!(report.skipped, 0);
        assert!(report.file.header.is_light());
        assert_eq!(report.file.header.masters, vec!["Fallout4.esm", "Mod.esp"]);
        assert_eq!(report.file.overrides[0].weapon, id("Fallout4.esm", 0x100));
        assert_eq!(report.file.overrides[0].editor_id.as_deref(), Some("Pistol"));

        let patched = &report.records[0];
        assert_eq!(
            patched.field("ammo"),
            Some(&FieldValue::Link(Reference::typed(id("Mod.esp", 0x800), Category::Ammunition)))
        );
    }

    #[test]
    fn unresolvable_ammo_is_skipped_and_counted() {
        let store = store();
        let resolver = LinkResolver::new(&store);
        let profile = profile_for(SchemaVersion::Fallout4);
        let candidates = vec![
            confirmed(id("Mod.esp", 0x900), id("Gone.esp", 0x800)),
            confirmed(id("Mod.esp", 0x901), id("Mod.esp", 0x800)),
        ];

        let report = PatchBuilder::new(&resolver, profile, DEFAULT_OUTPUT_NAME, None).build(&candidates);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.written, 1);
        assert!(report.skipped_reasons[0].reason.contains("does not resolve"));
        assert_eq!(report.file.overrides.len(), 1);
    }

    #[test]
    fn unconfirmed_candidates_are_ignored() {
        let store = store();
        let resolver = LinkResolver::new(&store);
        let profile = profile_for(SchemaVersion::Fallout4);
        let raw = Candidate::new(CandidateKind::Recipe, id("Mod.esp", 0x900), "c", "Mod.esp")
            .with_base_weapon(id("Fallout4.esm", 0x100), "Pistol")
            .with_ammo(id("Mod.esp", 0x800), "Ammo556");

        let report = PatchBuilder::new(&resolver, profile, DEFAULT_OUTPUT_NAME, None).build(&[raw]);
        assert_eq!((report.written, report.skipped), (0, 0));
        assert!(report.file.overrides.is_empty());
    }

    #[test]
    fn second_candidate_for_same_weapon_is_skipped() {
        let store = store();
        let resolver = LinkResolver::new(&store);
        let profile = profile_for(SchemaVersion::Fallout4);
        let candidates = vec![
            confirmed(id("Mod.esp", 0x900), id("Mod.esp", 0x800)),
            confirmed(id("Mod.esp", 0x901), id("Fallout4.esm", 0x200)),
        ];

        let report = PatchBuilder::new(&resolver, profile, DEFAULT_OUTPUT_NAME, None).build(&candidates);
        assert_eq!(report.written, 1);
        assert_eq!(report.skipped, 1);
        assert!(report.skipped_reasons[0].reason.contains("already patched"));
    }

    #[test]
    fn masters_are_written_in_load_order() {
        let base = PluginData::new("Fallout4.esm")
            .with_version(1.0)
            .with_record(
                Record::new(id("Fallout4.esm", 0x100), Category::Weapon)
                    .with_link("ammo", Reference::Identity(id("Fallout4.esm", 0x200))),
            )
            .with_record(Record::new(id("Fallout4.esm", 0x200), Category::Ammunition))
            .with_record(Record::new(id("Fallout4.esm", 0x201), Category::Ammunition));
        let modded = PluginData::new("Mod.esp")
            .with_master("Fallout4.esm")
            .with_record(Record::new(id("Mod.esp", 0x800), Category::Ammunition))
            .with_record(Record::new(id("Mod.esp", 0x801), Category::Weapon));
        let store = LoadOrder::from_plugins(vec![base, modded]);
        let resolver = LinkResolver::new(&store);
        let profile = profile_for(SchemaVersion::Fallout4);
        // The first override only needs Mod.esp, so it is seen first.
        let candidates = vec![
            confirmed(id("Mod.esp", 0x801), id("Mod.esp", 0x800)),
            confirmed(id("Mod.esp", 0x900), id("Fallout4.esm", 0x201)),
        ];

        let report = PatchBuilder::new(&resolver, profile, DEFAULT_OUTPUT_NAME, None).build(&candidates);
        assert_eq!(report.written, 2);
        assert_eq!(report.file.header.masters, vec!["Fallout4.esm", "Mod.esp"]);

        let bytes = report.file.to_bytes().unwrap();
        let parsed = OverrideFile::parse(DEFAULT_OUTPUT_NAME, &bytes).unwrap();
        assert_eq!(parsed.overrides, report.file.overrides);
    }
}
