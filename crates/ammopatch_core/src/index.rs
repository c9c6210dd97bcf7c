use std::collections::HashMap;
use std::sync::Arc;

use crate::context::CancellationToken;
use crate::core_api::CoreError;
use crate::identity::{ExcludedPlugins, RecordIdentity};
use crate::record::{Category, FieldValue, Record, Reference};
use crate::store::RecordStore;

/// How deep into nested lists/structs the index looks for links.
pub const DEFAULT_INDEX_DEPTH: usize = 4;

/// One place a record links to an identity.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceEntry {
    pub source: Arc<Record>,
    /// Field path on `source`, e.g. `attach_parent_slots[2]`.
    pub field: String,
    pub value: Reference,
}

/// Identity -> every (record, field, value) that links to it, in scan order.
/// Built once per pass and read-only afterwards.
#[derive(Debug, Default)]
pub struct ReverseReferenceIndex {
    buckets: HashMap<RecordIdentity, Vec<ReferenceEntry>>,
    entry_count: usize,
    malformed: usize,
}

impl ReverseReferenceIndex {
    pub fn build(
        store: &dyn RecordStore,
        excluded: &ExcludedPlugins,
        cancel: &CancellationToken,
    ) -> Result<Self, CoreError> {
        Self::build_with_depth(store, excluded, cancel, DEFAULT_INDEX_DEPTH)
    }

    /// Indexes every winning record of `store`. Raw form ids are keyed by
    /// the identity the store decodes them to.
    pub fn build_with_depth(
        store: &dyn RecordStore,
        excluded: &ExcludedPlugins,
        cancel: &CancellationToken,
        max_depth: usize,
    ) -> Result<Self, CoreError> {
        let mut index = Self::default();

        for (category, records) in store.all_categories() {
            for record in &records {
                cancel.check("reverse-reference indexing")?;
                if excluded.contains(&record.source_plugin) {
                    continue;
                }
                index.add_record(store, &category, record, max_depth, cancel)?;
            }
        }

        tracing::debug!(
            domain = "index",
            identities = index.buckets.len(),
            entries = index.entry_count,
            malformed = index.malformed,
            "reverse-reference index built",
        );
        Ok(index)
    }

    fn add_record(
        &mut self,
        store: &dyn RecordStore,
        category: &Category,
        record: &Arc<Record>,
        max_depth: usize,
        cancel: &CancellationToken,
    ) -> Result<(), CoreError> {
        for visit in record.walk_values(max_depth) {
            let FieldValue::Link(reference) = visit.value else {
                continue;
            };
            cancel.check("reverse-reference indexing")?;
            match reference.decode(store) {
                Ok(Some(identity)) => {
                    self.buckets
                        .entry(identity)
                        .or_default()
                        .push(ReferenceEntry {
                            source: record.clone(),
                            field: visit.path,
                            value: reference.clone(),
                        });
                    self.entry_count += 1;
                }
                Ok(None) => {}
                Err(e) => {
                    self.malformed += 1;
                    tracing::trace!(
                        domain = "index",
                        category = %category,
                        record = %record.identity,
                        field = %visit.path,
                        error = %e,
                        "skipping malformed link",
                    );
                }
            }
        }
        Ok(())
    }

    pub fn referrers(&self, identity: &RecordIdentity) -> &[ReferenceEntry] {
        self.buckets
            .get(identity)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn identity_count(&self) -> usize {
        self.buckets.len()
    }

    pub fn entry_count(&self) -> usize {
        self.entry_count
    }

    pub fn malformed_count(&self) -> usize {
        self.malformed
    }
}
