use std::collections::HashMap;
use std::sync::Arc;

use crate::identity::RecordIdentity;
use crate::record::{Category, Record};
use crate::store::RecordStore;

/// Winning records of some categories, in load order, with identity lookup.
#[derive(Debug, Clone, Default)]
pub struct KnownRecords {
    records: Vec<Arc<Record>>,
    by_identity: HashMap<RecordIdentity, usize>,
}

impl KnownRecords {
    pub fn from_store(store: &dyn RecordStore, categories: &[Category]) -> Self {
        let mut out = Self::default();
        for category in categories {
            for record in store.winning_records(category) {
                out.insert(record);
            }
        }
        out
    }

    pub fn weapons(store: &dyn RecordStore) -> Self {
        Self::from_store(store, &[Category::Weapon])
    }

    pub fn ammunition(store: &dyn RecordStore) -> Self {
        Self::from_store(store, &[Category::Ammunition, Category::Projectile])
    }

    pub fn insert(&mut self, record: Arc<Record>) {
        if self.by_identity.contains_key(&record.identity) {
            return;
        }
        self.by_identity
            .insert(record.identity.clone(), self.records.len());
        self.records.push(record);
    }

    pub fn get(&self, identity: &RecordIdentity) -> Option<&Arc<Record>> {
        self.by_identity.get(identity).map(|&i| &self.records[i])
    }

    pub fn contains(&self, identity: &RecordIdentity) -> bool {
        self.by_identity.contains_key(identity)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Record>> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
