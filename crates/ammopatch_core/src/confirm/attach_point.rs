use std::collections::HashMap;

use crate::candidate::{Candidate, Confirmation};
use crate::core_api::CoreError;
use crate::identity::RecordIdentity;
use crate::providers::identity_of;
use crate::record::{FieldValue, Record, Reference};
use crate::resolver::LinkResolver;
use crate::schema::{FieldRole, SchemaProfile, find_role_field};

use super::{CandidateConfirmer, ConfirmOutcome, ConfirmStats, ConfirmationContext, drive};

pub const DEFAULT_ATTACH_SEARCH_DEPTH: usize = 2;

/// Ties a modification to the weapons that accept its attach point, then
/// looks inside the modification for a link into the ammunition set.
pub struct AttachPointConfirmer {
    search_depth: usize,
}

impl AttachPointConfirmer {
    pub fn new(search_depth: usize) -> Self {
        Self { search_depth }
    }
}

impl Default for AttachPointConfirmer {
    fn default() -> Self {
        Self::new(DEFAULT_ATTACH_SEARCH_DEPTH)
    }
}

impl CandidateConfirmer for AttachPointConfirmer {
    fn name(&self) -> &'static str {
        "attach-point"
    }

    fn confirm_all(
        &self,
        ctx: &ConfirmationContext<'_>,
        candidates: &mut [Candidate],
    ) -> Result<ConfirmStats, CoreError> {
        let lookup = AttachLookup::build(ctx.resolver, ctx.profile, ctx.weapons.iter().map(|w| &**w));
        tracing::debug!(domain = "confirm", attach_points = lookup.len(), "attach-point lookup built");
        drive(self.name(), ctx, candidates, |candidate| {
            self.confirm_with(ctx, &lookup, candidate)
        })
    }
}

impl AttachPointConfirmer {
    fn confirm_with(
        &self,
        ctx: &ConfirmationContext<'_>,
        lookup: &AttachLookup,
        candidate: &mut Candidate,
    ) -> ConfirmOutcome {
        if candidate.confirmed {
            return ConfirmOutcome::AlreadyConfirmed;
        }
        let Some(record) = ctx.resolver.resolve_identity(&candidate.identity) else {
            return ConfirmOutcome::NotApplicable;
        };
        if !record.category.is_modification_like() {
            return ConfirmOutcome::NotApplicable;
        }

        let Some((_, FieldValue::Link(attach_link))) =
            find_role_field(ctx.profile, &record, FieldRole::AttachPoint)
        else {
            return ConfirmOutcome::Declined(format!("attach-point: {} has no attach point", record.label()));
        };
        let Some((attach_point, attach_label)) = identity_of(ctx.resolver, attach_link) else {
            return ConfirmOutcome::Declined(format!("attach-point: {attach_link} does not resolve"));
        };
        let Some(weapons) = lookup.weapons_for(&attach_point) else {
            return ConfirmOutcome::Declined(format!("attach-point: no weapon accepts {attach_label}"));
        };
        let Some((path, ammo, ammo_label)) = self.find_ammo_link(ctx, &record) else {
            return ConfirmOutcome::Declined(format!(
                "attach-point: {} has no ammunition link",
                record.label()
            ));
        };

        let (weapon, weapon_label) = &weapons[0];
        let reason = format!(
            "attach-point: {attach_label} is shared with {} weapon(s); {path} links {ammo_label}",
            weapons.len()
        );
        candidate.confirm(Confirmation {
            base_weapon: Some((weapon.clone(), weapon_label.clone())),
            ammo,
            ammo_label,
            reason,
        });
        ConfirmOutcome::Confirmed
    }

    fn find_ammo_link(
        &self,
        ctx: &ConfirmationContext<'_>,
        record: &Record,
    ) -> Option<(String, RecordIdentity, String)> {
        record.walk_values(self.search_depth).into_iter().find_map(|visit| {
            let FieldValue::Link(reference) = visit.value else {
                return None;
            };
            let (identity, label) = identity_of(ctx.resolver, reference)?;
            ctx.ammo
                .contains(&identity)
                .then_some((visit.path, identity, label))
        })
    }
}

/// Attach point identity -> compatible weapons, in load order.
#[derive(Debug, Default)]
pub(crate) struct AttachLookup {
    by_attach_point: HashMap<RecordIdentity, Vec<(RecordIdentity, String)>>,
}

impl AttachLookup {
    pub(crate) fn build<'r>(
        resolver: &LinkResolver<'_>,
        profile: &dyn SchemaProfile,
        weapons: impl Iterator<Item = &'r Record>,
    ) -> Self {
        let mut lookup = Self::default();
        for weapon in weapons {
            let Some((_, value)) = find_role_field(profile, weapon, FieldRole::Compatibility) else {
                continue;
            };
            for reference in links(value) {
                let Some((attach_point, _)) = identity_of(resolver, reference) else {
                    continue;
                };
                let entry = lookup.by_attach_point.entry(attach_point).or_default();
                if !entry.iter().any(|(identity, _)| *identity == weapon.identity) {
                    entry.push((weapon.identity.clone(), weapon.label()));
                }
            }
        }
        lookup
    }

    pub(crate) fn weapons_for(&self, attach_point: &RecordIdentity) -> Option<&[(RecordIdentity, String)]> {
        self.by_attach_point
            .get(attach_point)
            .map(Vec::as_slice)
            .filter(|weapons| !weapons.is_empty())
    }

    pub(crate) fn len(&self) -> usize {
        self.by_attach_point.len()
    }
}

fn links(value: &FieldValue) -> Vec<&Reference> {
    match value {
        FieldValue::Link(reference) => vec![reference],
        FieldValue::List(items) => items.iter().filter_map(FieldValue::as_link).collect(),
        _ => Vec::new(),
    }
}
