//! Confirmers upgrade raw candidates to confirmed ones, or leave a reason
//! saying why they could not.

mod attach_point;
mod reverse_map;

pub use attach_point::{AttachPointConfirmer, DEFAULT_ATTACH_SEARCH_DEPTH};
pub use reverse_map::ReverseMapConfirmer;

use serde::Serialize;

use crate::candidate::Candidate;
use crate::context::CancellationToken;
use crate::core_api::CoreError;
use crate::detector::AmmoChangeDetector;
use crate::identity::ExcludedPlugins;
use crate::index::ReverseReferenceIndex;
use crate::known::KnownRecords;
use crate::resolver::LinkResolver;
use crate::schema::SchemaProfile;

/// Everything a confirmer may consult. All of it is read-only for the
/// duration of the confirmation stage.
pub struct ConfirmationContext<'a> {
    pub resolver: &'a LinkResolver<'a>,
    pub detector: &'a AmmoChangeDetector,
    pub index: &'a ReverseReferenceIndex,
    pub excluded: &'a ExcludedPlugins,
    pub weapons: &'a KnownRecords,
    /// Quick lookup of ammunition and projectile records.
    pub ammo: &'a KnownRecords,
    pub profile: &'static dyn SchemaProfile,
    pub cancel: &'a CancellationToken,
}

/// What one confirmer did with one candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmOutcome {
    Confirmed,
    /// Looked at the candidate and found no evidence.
    Declined(String),
    /// The candidate is outside this confirmer's remit.
    NotApplicable,
    /// An earlier confirmer already claimed it.
    AlreadyConfirmed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConfirmStats {
    pub examined: usize,
    pub confirmed: usize,
    pub declined: usize,
}

impl ConfirmStats {
    fn record(&mut self, outcome: &ConfirmOutcome) {
        match outcome {
            ConfirmOutcome::Confirmed => {
                self.examined += 1;
                self.confirmed += 1;
            }
            ConfirmOutcome::Declined(_) => {
                self.examined += 1;
                self.declined += 1;
            }
            ConfirmOutcome::NotApplicable | ConfirmOutcome::AlreadyConfirmed => {}
        }
    }
}

pub trait CandidateConfirmer {
    fn name(&self) -> &'static str;

    /// Runs over every candidate. Implementations must leave candidates
    /// that are already confirmed untouched.
    fn confirm_all(
        &self,
        ctx: &ConfirmationContext<'_>,
        candidates: &mut [Candidate],
    ) -> Result<ConfirmStats, CoreError>;
}

/// Shared driver: skips confirmed candidates, checks for cancellation
/// between candidates and tallies outcomes.
pub(crate) fn drive(
    name: &'static str,
    ctx: &ConfirmationContext<'_>,
    candidates: &mut [Candidate],
    mut confirm_one: impl FnMut(&mut Candidate) -> ConfirmOutcome,
) -> Result<ConfirmStats, CoreError> {
    let mut stats = ConfirmStats::default();
    for candidate in candidates.iter_mut() {
        ctx.cancel.check(name)?;
        let outcome = if candidate.confirmed {
            ConfirmOutcome::AlreadyConfirmed
        } else {
            confirm_one(candidate)
        };
        tracing::trace!(
            domain = "confirm",
            confirmer = name,
            candidate = %candidate.identity,
            outcome = ?outcome,
        );
        stats.record(&outcome);
    }
    tracing::debug!(
        domain = "confirm",
        confirmer = name,
        examined = stats.examined,
        confirmed = stats.confirmed,
        declined = stats.declined,
        "confirmer finished",
    );
    Ok(stats)
}
