use crate::candidate::{Candidate, CandidateKind};
use crate::context::ExtractionContext;
use crate::core_api::CoreError;
use crate::detector::AmmoChangeDetector;
use crate::known::KnownRecords;
use crate::record::Category;
use crate::resolver::LinkResolver;

use super::{CandidateProvider, dedup};

/// Modifications that carry an ammo-like link but name no weapon. They
/// enter the pass without a base weapon; the attach-point confirmer is the
/// one that can tie them to weapons.
pub struct ModificationProvider<'d> {
    detector: &'d AmmoChangeDetector,
}

impl<'d> ModificationProvider<'d> {
    pub fn new(detector: &'d AmmoChangeDetector) -> Self {
        Self { detector }
    }
}

impl CandidateProvider for ModificationProvider<'_> {
    fn name(&self) -> &'static str {
        "modification"
    }

    fn provide(
        &self,
        ctx: &ExtractionContext<'_>,
        resolver: &LinkResolver<'_>,
        _weapons: &KnownRecords,
    ) -> Result<Vec<Candidate>, CoreError> {
        let mut out = Vec::new();

        for record in ctx.store.winning_records(&Category::ObjectModification) {
            ctx.checkpoint("modification provider")?;
            if ctx.is_excluded(&record.source_plugin) {
                continue;
            }
            let Some(change) = self.detector.detects_change(resolver, &record, None) else {
                continue;
            };
            if !resolver
                .resolve_identity(&change.identity)
                .is_some_and(|target| target.category.is_ammo_like())
            {
                continue;
            }

            out.push(
                Candidate::new(
                    CandidateKind::Reference(record.category.clone()),
                    record.identity.clone(),
                    record.label(),
                    record.source_plugin.clone(),
                )
                .with_ammo(change.identity, change.label)
                .with_note(&format!("modification sets ammo via {}", change.field)),
            );
        }

        ctx.progress
            .report(&format!("modification provider: {} candidate(s)", out.len()));
        Ok(dedup(out))
    }
}
