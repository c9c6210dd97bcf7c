use std::path::Path;

use chrono::Utc;
use parking_lot::Mutex;

use crate::candidate::Candidate;
use crate::confirm::{
    AttachPointConfirmer, CandidateConfirmer, ConfirmationContext, ReverseMapConfirmer,
};
use crate::context::{CancellationToken, ExtractionContext, ProgressSink};
use crate::detector::detector_for;
use crate::index::ReverseReferenceIndex;
use crate::known::KnownRecords;
use crate::patch::{PatchBuilder, PatchReport};
use crate::providers::{
    CandidateProvider, ModificationProvider, RecipeProvider, ReverseReferenceProvider,
};
use crate::resolver::LinkResolver;
use crate::schema::{SchemaVersion, profile_for};
use crate::store::{LoadOrder, RecordStore};

use super::config::validate_output_name;
use super::error::{CoreError, CoreErrorCode};
use super::types::{
    ConfirmerCount, PassCounts, PassOptions, PassOutcome, PatchOptions, StageCount,
};

#[derive(Debug, Default, Clone, Copy)]
pub struct Engine;

/// An opened load order. Each [`Session::run`] is an independent pass with
/// its own resolver cache and index.
pub struct Session {
    store: Box<dyn RecordStore>,
    partial: Mutex<Vec<Candidate>>,
}

impl Engine {
    pub fn new() -> Self {
        Self
    }

    pub fn open_load_order(&self, dir: &Path) -> Result<Session, CoreError> {
        let store = LoadOrder::load_dir(dir)?;
        self.open_store(store)
    }

    /// Wraps a store. A store with no plugins is a missing store.
    pub fn open_store<S: RecordStore + 'static>(&self, store: S) -> Result<Session, CoreError> {
        if store.plugin_names().is_empty() && store.all_categories().is_empty() {
            return Err(CoreError::new(
                CoreErrorCode::MissingStore,
                "record store is empty; nothing to scan",
            ));
        }
        Ok(Session {
            store: Box::new(store),
            partial: Mutex::new(Vec::new()),
        })
    }
}

impl Session {
    pub fn store(&self) -> &dyn RecordStore {
        self.store.as_ref()
    }

    pub fn detect_schema(&self) -> SchemaVersion {
        SchemaVersion::detect(self.store())
    }

    /// Candidates gathered by the last pass that was cancelled.
    pub fn partial_candidates(&self) -> Vec<Candidate> {
        self.partial.lock().clone()
    }

    pub fn run(
        &self,
        options: &PassOptions,
        cancel: &CancellationToken,
        progress: &dyn ProgressSink,
    ) -> Result<PassOutcome, CoreError> {
        self.partial.lock().clear();
        let mut candidates = Vec::new();
        let result = self.run_pass(options, cancel, progress, &mut candidates);
        if let Err(e) = &result
            && e.is_cancelled()
        {
            tracing::info!(domain = "pass", kept = candidates.len(), "pass cancelled");
            *self.partial.lock() = candidates;
        }
        result
    }

    fn run_pass(
        &self,
        options: &PassOptions,
        cancel: &CancellationToken,
        progress: &dyn ProgressSink,
        candidates: &mut Vec<Candidate>,
    ) -> Result<PassOutcome, CoreError> {
        let store = self.store();
        let schema = options.schema.resolve(store);
        let profile = profile_for(schema);
        let detector = detector_for(schema);
        let ctx = ExtractionContext::new(store, cancel, progress, &options.excluded);
        let resolver = LinkResolver::new(store);
        tracing::info!(domain = "pass", schema = %schema, mode = ?detector.mode(), "pass started");

        progress.report("building reverse-reference index");
        let index = ReverseReferenceIndex::build_with_depth(
            store,
            &options.excluded,
            cancel,
            options.index_depth,
        )?;
        let weapons = KnownRecords::weapons(store);
        let ammo = KnownRecords::ammunition(store);

        let mut counts = PassCounts {
            weapons: weapons.len(),
            ammunition: ammo.len(),
            index_identities: index.identity_count(),
            index_entries: index.entry_count(),
            index_malformed: index.malformed_count(),
            ..PassCounts::default()
        };

        let providers: [&dyn CandidateProvider; 3] = [
            &RecipeProvider::new(profile),
            &ReverseReferenceProvider::new(options.reverse_list_bound),
            &ModificationProvider::new(&detector),
        ];
        for provider in providers {
            let found = provider.provide(&ctx, &resolver, &weapons)?;
            counts.providers.push(StageCount {
                stage: provider.name(),
                candidates: found.len(),
            });
            candidates.extend(found);
        }

        let confirm_ctx = ConfirmationContext {
            resolver: &resolver,
            detector: &detector,
            index: &index,
            excluded: &options.excluded,
            weapons: &weapons,
            ammo: &ammo,
            profile,
            cancel,
        };
        let confirmers: [&dyn CandidateConfirmer; 2] = [
            &AttachPointConfirmer::new(options.attach_search_depth),
            &ReverseMapConfirmer,
        ];
        for confirmer in confirmers {
            progress.report(&format!("running {} confirmer", confirmer.name()));
            let stats = confirmer.confirm_all(&confirm_ctx, candidates)?;
            counts.confirmers.push(ConfirmerCount {
                confirmer: confirmer.name(),
                stats,
            });
        }

        counts.candidates = candidates.len();
        counts.confirmed = candidates.iter().filter(|c| c.confirmed).count();
        counts.resolver = resolver.stats();
        progress.report(&format!(
            "{} candidate(s), {} confirmed",
            counts.candidates, counts.confirmed
        ));

        Ok(PassOutcome {
            schema,
            detector_mode: detector.mode(),
            started_at: ctx.started_at,
            finished_at: Utc::now(),
            excluded: options.excluded.clone(),
            counts,
            candidates: std::mem::take(candidates),
        })
    }

    pub fn build_patch(&self, outcome: &PassOutcome, output_name: &str) -> Result<PatchReport, CoreError> {
        self.build_patch_with(
            outcome,
            &PatchOptions {
                output_name: output_name.to_string(),
                ..PatchOptions::default()
            },
        )
    }

    pub fn build_patch_with(
        &self,
        outcome: &PassOutcome,
        options: &PatchOptions,
    ) -> Result<PatchReport, CoreError> {
        validate_output_name(&options.output_name)?;
        let resolver = LinkResolver::new(self.store());
        let report = PatchBuilder::new(
            &resolver,
            profile_for(outcome.schema),
            &options.output_name,
            options.author.as_deref(),
        )
        .compress(options.compress)
        .build(&outcome.candidates);
        Ok(report)
    }
}

impl PatchReport {
    pub fn to_bytes(&self) -> Result<Vec<u8>, CoreError> {
        self.file.to_bytes().map_err(|e| {
            CoreError::new(
                CoreErrorCode::Io,
                format!("failed to emit {}: {e}", self.file.name),
            )
        })
    }

    pub fn write_to(&self, path: &Path) -> Result<(), CoreError> {
        let bytes = self.to_bytes()?;
        std::fs::write(path, bytes).map_err(|e| {
            CoreError::new(
                CoreErrorCode::Io,
                format!("failed to write {}: {e}", path.display()),
            )
        })
    }
}
