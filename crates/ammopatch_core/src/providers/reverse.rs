use std::sync::Arc;

use crate::candidate::{Candidate, CandidateKind};
use crate::context::ExtractionContext;
use crate::core_api::CoreError;
use crate::identity::RecordIdentity;
use crate::known::KnownRecords;
use crate::record::{Category, FieldValue, Record, Reference};
use crate::resolver::LinkResolver;

use super::{CandidateProvider, dedup, identity_of};

/// Lists longer than this are not searched for weapon or ammo links.
pub const DEFAULT_LIST_BOUND: usize = 16;

/// Emits a candidate for every record that links to a known weapon, and
/// guesses its ammo from the first other identity-bearing field.
///
/// The guess is knowingly loose: any second link on the record is taken as
/// the ammo reference. Confirmers decide whether it holds up.
pub struct ReverseReferenceProvider {
    list_bound: usize,
}

impl ReverseReferenceProvider {
    pub fn new(list_bound: usize) -> Self {
        Self { list_bound }
    }
}

impl Default for ReverseReferenceProvider {
    fn default() -> Self {
        Self::new(DEFAULT_LIST_BOUND)
    }
}

impl CandidateProvider for ReverseReferenceProvider {
    fn name(&self) -> &'static str {
        "reverse-reference"
    }

    fn provide(
        &self,
        ctx: &ExtractionContext<'_>,
        resolver: &LinkResolver<'_>,
        weapons: &KnownRecords,
    ) -> Result<Vec<Candidate>, CoreError> {
        let mut out = Vec::new();

        for (category, records) in ctx.store.all_categories() {
            for record in records {
                ctx.checkpoint("reverse-reference provider")?;
                if ctx.is_excluded(&record.source_plugin) {
                    continue;
                }
                self.scan_record(ctx, &category, &record, resolver, weapons, &mut out)?;
            }
        }

        ctx.progress.report(&format!(
            "reverse-reference provider: {} candidate(s)",
            out.len()
        ));
        Ok(dedup(out))
    }
}

impl ReverseReferenceProvider {
    fn scan_record(
        &self,
        ctx: &ExtractionContext<'_>,
        category: &Category,
        record: &Arc<Record>,
        resolver: &LinkResolver<'_>,
        weapons: &KnownRecords,
        out: &mut Vec<Candidate>,
    ) -> Result<(), CoreError> {
        for (field_index, field) in record.fields.iter().enumerate() {
            ctx.checkpoint("reverse-reference provider")?;
            for reference in self.links_in(&field.value) {
                let Some(target) = resolver.resolve(reference) else {
                    continue;
                };
                if target.identity == record.identity {
                    continue;
                }
                let Some(weapon) = weapons.get(&target.identity) else {
                    continue;
                };

                let mut candidate = Candidate::new(
                    CandidateKind::Reference(category.clone()),
                    record.identity.clone(),
                    record.label(),
                    record.source_plugin.clone(),
                )
                .with_base_weapon(weapon.identity.clone(), weapon.label())
                .with_note(&format!("references weapon via {}", field.name));

                if let Some((ammo_field, ammo, label)) =
                    self.second_identity(record, field_index, &weapon.identity, resolver)
                {
                    candidate = candidate
                        .with_ammo(ammo, label)
                        .with_note(&format!("detected ammo reference in {ammo_field}"));
                }
                out.push(candidate);
            }
        }
        Ok(())
    }

    /// Links held directly by a field or by a short list in it.
    fn links_in<'v>(&self, value: &'v FieldValue) -> Vec<&'v Reference> {
        match value {
            FieldValue::Link(reference) => vec![reference],
            FieldValue::List(items) if items.len() <= self.list_bound => {
                items.iter().filter_map(FieldValue::as_link).collect()
            }
            _ => Vec::new(),
        }
    }

    fn second_identity(
        &self,
        record: &Record,
        weapon_field: usize,
        weapon: &RecordIdentity,
        resolver: &LinkResolver<'_>,
    ) -> Option<(String, RecordIdentity, String)> {
        record
            .fields
            .iter()
            .enumerate()
            .filter(|(index, _)| *index != weapon_field)
            .find_map(|(_, field)| {
                self.links_in(&field.value).into_iter().find_map(|reference| {
                    let (identity, label) = identity_of(resolver, reference)?;
                    (identity != *weapon && identity != record.identity)
                        .then(|| (field.name.clone(), identity, label))
                })
            })
    }
}
