use crate::candidate::{Candidate, Confirmation};
use crate::core_api::CoreError;
use crate::identity::RecordIdentity;
use crate::index::ReferenceEntry;
use crate::providers::{identity_of, weapon_ammo_link};
use crate::record::FieldValue;

use super::{CandidateConfirmer, ConfirmOutcome, ConfirmStats, ConfirmationContext, drive};

/// How deep the fallback scan looks into a referencing record.
const SCAN_DEPTH: usize = 3;

/// Confirms a candidate when some record that references its base weapon
/// also points at different ammunition.
#[derive(Debug, Default)]
pub struct ReverseMapConfirmer;

impl CandidateConfirmer for ReverseMapConfirmer {
    fn name(&self) -> &'static str {
        "reverse-map"
    }

    fn confirm_all(
        &self,
        ctx: &ConfirmationContext<'_>,
        candidates: &mut [Candidate],
    ) -> Result<ConfirmStats, CoreError> {
        drive(self.name(), ctx, candidates, |candidate| {
            let outcome = confirm_one(ctx, candidate);
            if let ConfirmOutcome::Declined(reason) = &outcome {
                candidate.decline(reason.clone());
            }
            outcome
        })
    }
}

fn confirm_one(ctx: &ConfirmationContext<'_>, candidate: &mut Candidate) -> ConfirmOutcome {
    let Some(weapon) = candidate.base_weapon.clone() else {
        return ConfirmOutcome::Declined("reverse-map: candidate has no base weapon".to_string());
    };

    let entries: Vec<&ReferenceEntry> = ctx
        .index
        .referrers(&weapon)
        .iter()
        .filter(|entry| !ctx.excluded.contains(&entry.source.source_plugin))
        .collect();
    if entries.is_empty() {
        return ConfirmOutcome::Declined(format!(
            "reverse-map: no non-excluded records reference {weapon}"
        ));
    }

    let original = original_ammo(ctx, &weapon);

    for entry in &entries {
        if let Some(evidence) = detector_evidence(ctx, entry, original.as_ref())
            .or_else(|| scan_evidence(ctx, entry, &weapon, original.as_ref()))
        {
            candidate.confirm(evidence);
            return ConfirmOutcome::Confirmed;
        }
    }

    ConfirmOutcome::Declined(format!(
        "reverse-map: {} referencing record(s) of {weapon}, none changes ammo",
        entries.len()
    ))
}

/// The ammunition the weapon fires before any patch.
fn original_ammo(ctx: &ConfirmationContext<'_>, weapon: &RecordIdentity) -> Option<RecordIdentity> {
    let record = ctx
        .weapons
        .get(weapon)
        .cloned()
        .or_else(|| ctx.resolver.resolve_identity(weapon))?;
    let link = weapon_ammo_link(ctx.profile, &record)?;
    ctx.resolver.resolve(link).map(|ammo| ammo.identity.clone())
}

fn detector_evidence(
    ctx: &ConfirmationContext<'_>,
    entry: &ReferenceEntry,
    original: Option<&RecordIdentity>,
) -> Option<Confirmation> {
    let original = original?;
    let change = ctx
        .detector
        .detects_change(ctx.resolver, &entry.source, Some(original))?;
    let is_ammo = ctx.ammo.contains(&change.identity)
        || ctx
            .resolver
            .resolve_identity(&change.identity)
            .is_some_and(|record| ctx.profile.is_ammo_like(&record.category));
    if !is_ammo {
        return None;
    }
    Some(Confirmation {
        base_weapon: None,
        reason: format!(
            "reverse-map: {} {} changes ammo {original} -> {}",
            entry.source.label(),
            change.field,
            change.label
        ),
        ammo: change.identity,
        ammo_label: change.label,
    })
}

/// Any ammo-like link on the referencing record other than the weapon
/// itself and the weapon's current ammo.
fn scan_evidence(
    ctx: &ConfirmationContext<'_>,
    entry: &ReferenceEntry,
    weapon: &RecordIdentity,
    original: Option<&RecordIdentity>,
) -> Option<Confirmation> {
    entry
        .source
        .walk_values(SCAN_DEPTH)
        .into_iter()
        .find_map(|visit| {
            let FieldValue::Link(reference) = visit.value else {
                return None;
            };
            let (identity, label) = identity_of(ctx.resolver, reference)?;
            if identity == *weapon || Some(&identity) == original {
                return None;
            }
            let is_ammo = ctx.ammo.contains(&identity)
                || ctx
                    .resolver
                    .resolve(reference)
                    .is_some_and(|record| ctx.profile.is_ammo_like(&record.category));
            is_ammo.then(|| Confirmation {
                base_weapon: None,
                reason: format!(
                    "reverse-map: {} {} links ammo {label}",
                    entry.source.label(),
                    visit.path
                ),
                ammo: identity,
                ammo_label: label,
            })
        })
}
