//! Candidate providers: cheap, unconfirmed guesses at ammo changes.

mod modification;
mod recipe;
mod reverse;

use std::collections::HashSet;

pub use modification::ModificationProvider;
pub use recipe::RecipeProvider;
pub use reverse::{DEFAULT_LIST_BOUND, ReverseReferenceProvider};

use crate::candidate::Candidate;
use crate::context::ExtractionContext;
use crate::core_api::CoreError;
use crate::identity::RecordIdentity;
use crate::known::KnownRecords;
use crate::record::{FieldValue, Record, Reference};
use crate::resolver::LinkResolver;
use crate::schema::{FieldRole, SchemaProfile, find_role_field};

pub trait CandidateProvider {
    fn name(&self) -> &'static str;

    fn provide(
        &self,
        ctx: &ExtractionContext<'_>,
        resolver: &LinkResolver<'_>,
        weapons: &KnownRecords,
    ) -> Result<Vec<Candidate>, CoreError>;
}

/// Resolved identity and display label for a link, falling back to the
/// identity the reference carries when the store cannot resolve it.
pub(crate) fn identity_of(
    resolver: &LinkResolver<'_>,
    reference: &Reference,
) -> Option<(RecordIdentity, String)> {
    if let Some(record) = resolver.resolve(reference) {
        return Some((record.identity.clone(), record.label()));
    }
    let identity = reference.identity().ok().flatten()?;
    let label = identity.to_string();
    Some((identity, label))
}

/// The weapon's current ammunition link, if its ammo field holds one.
pub(crate) fn weapon_ammo_link<'r>(
    profile: &dyn SchemaProfile,
    weapon: &'r Record,
) -> Option<&'r Reference> {
    match find_role_field(profile, weapon, FieldRole::Ammo)? {
        (_, FieldValue::Link(reference)) => Some(reference),
        _ => None,
    }
}

/// Drops candidates repeating an earlier (candidate, base weapon) pair.
pub(crate) fn dedup(candidates: Vec<Candidate>) -> Vec<Candidate> {
    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .filter(|candidate| seen.insert(candidate.dedup_key()))
        .collect()
}
