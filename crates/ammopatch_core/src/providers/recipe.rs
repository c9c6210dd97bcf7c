use crate::candidate::{Candidate, CandidateKind};
use crate::context::ExtractionContext;
use crate::core_api::CoreError;
use crate::known::KnownRecords;
use crate::record::{Category, FieldValue};
use crate::resolver::LinkResolver;
use crate::schema::{FieldRole, SchemaProfile, find_role_field};

use super::{CandidateProvider, dedup, identity_of, weapon_ammo_link};

/// One candidate per crafting recipe whose output is a known weapon.
pub struct RecipeProvider {
    profile: &'static dyn SchemaProfile,
}

impl RecipeProvider {
    pub fn new(profile: &'static dyn SchemaProfile) -> Self {
        Self { profile }
    }
}

impl CandidateProvider for RecipeProvider {
    fn name(&self) -> &'static str {
        "recipe"
    }

    fn provide(
        &self,
        ctx: &ExtractionContext<'_>,
        resolver: &LinkResolver<'_>,
        weapons: &KnownRecords,
    ) -> Result<Vec<Candidate>, CoreError> {
        let mut out = Vec::new();

        for recipe in ctx.store.winning_records(&Category::ConstructibleObject) {
            ctx.checkpoint("recipe provider")?;
            if ctx.is_excluded(&recipe.source_plugin) {
                continue;
            }
            let Some((field, FieldValue::Link(produces))) =
                find_role_field(self.profile, &recipe, FieldRole::Produces)
            else {
                continue;
            };
            let Some(produced) = resolver.resolve_expecting(produces, &Category::Weapon) else {
                tracing::trace!(domain = "provider", recipe = %recipe.identity, link = %produces, "recipe output unresolved");
                continue;
            };
            let Some(weapon) = weapons.get(&produced.identity) else {
                continue;
            };

            let mut candidate = Candidate::new(
                CandidateKind::Recipe,
                recipe.identity.clone(),
                recipe.label(),
                recipe.source_plugin.clone(),
            )
            .with_base_weapon(weapon.identity.clone(), weapon.label())
            .with_note(&format!("{field} produces {}", weapon.label()));

            match weapon_ammo_link(self.profile, weapon).and_then(|link| identity_of(resolver, link)) {
                Some((ammo, label)) => candidate = candidate.with_ammo(ammo, label),
                None => candidate.add_note("produced weapon has no resolvable ammo"),
            }
            out.push(candidate);
        }

        ctx.progress
            .report(&format!("recipe provider: {} candidate(s)", out.len()));
        Ok(dedup(out))
    }
}
