//! Reference resolution with ordered fallback strategies.
//!
//! A [`LinkResolver`] lives for exactly one pass. Every answer it gives,
//! negative ones included, is cached under the reference and the store it
//! was resolved against, so a second request never re-runs the strategies.
//! Re-entrant requests (a [`Reference::Forward`] chain that leads back to
//! itself) are cut off by the [`ResolveTrail`] threaded through the call.

mod strategy;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::{Mutex, RwLock};
use serde::Serialize;

use crate::identity::RecordIdentity;
use crate::record::{Category, Record, Reference};
use crate::store::{RecordStore, StoreId};

pub use strategy::{FailureClass, StrategyKind};
use strategy::{ResolveStrategy, StrategyResult};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    reference: Reference,
    expected: Option<Category>,
    store: StoreId,
}

/// Keys currently being resolved on this call stack.
#[derive(Debug, Default)]
pub struct ResolveTrail {
    in_flight: HashSet<CacheKey>,
}

impl ResolveTrail {
    pub fn new() -> Self {
        Self::default()
    }

    fn enter(&mut self, key: &CacheKey) -> bool {
        self.in_flight.insert(key.clone())
    }

    fn leave(&mut self, key: &CacheKey) {
        self.in_flight.remove(key);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ResolverStats {
    /// Requests answered by running the strategy chain.
    pub searches: usize,
    pub cache_hits: usize,
    pub unresolved: usize,
    pub cycles: usize,
    /// Strategy failures seen, logged or not.
    pub strategy_failures: usize,
    /// Distinct (strategy, failure class) pairs that were logged.
    pub failure_classes: usize,
}

#[derive(Debug, Default)]
struct Counters {
    searches: AtomicUsize,
    cache_hits: AtomicUsize,
    unresolved: AtomicUsize,
    cycles: AtomicUsize,
    strategy_failures: AtomicUsize,
}

pub struct LinkResolver<'s> {
    store: &'s dyn RecordStore,
    strategies: Vec<Box<dyn ResolveStrategy>>,
    cache: RwLock<HashMap<CacheKey, Option<Arc<Record>>>>,
    logged_failures: Mutex<HashSet<(StrategyKind, FailureClass)>>,
    counters: Counters,
}

impl<'s> LinkResolver<'s> {
    pub fn new(store: &'s dyn RecordStore) -> Self {
        Self {
            store,
            strategies: strategy::default_chain(),
            cache: RwLock::new(HashMap::new()),
            logged_failures: Mutex::new(HashSet::new()),
            counters: Counters::default(),
        }
    }

    pub fn store(&self) -> &'s dyn RecordStore {
        self.store
    }

    pub fn resolve(&self, reference: &Reference) -> Option<Arc<Record>> {
        self.resolve_with(reference, None, &mut ResolveTrail::new())
    }

    pub fn resolve_expecting(
        &self,
        reference: &Reference,
        expected: &Category,
    ) -> Option<Arc<Record>> {
        self.resolve_with(reference, Some(expected), &mut ResolveTrail::new())
    }

    pub fn resolve_identity(&self, identity: &RecordIdentity) -> Option<Arc<Record>> {
        self.resolve(&Reference::Identity(identity.clone()))
    }

    pub fn resolve_identity_with(
        &self,
        identity: &RecordIdentity,
        trail: &mut ResolveTrail,
    ) -> Option<Arc<Record>> {
        self.resolve_with(&Reference::Identity(identity.clone()), None, trail)
    }

    /// Resolves `reference`, consulting the pass cache first. A request for
    /// a key already on `trail` is answered "unresolved" without caching.
    pub fn resolve_with(
        &self,
        reference: &Reference,
        expected: Option<&Category>,
        trail: &mut ResolveTrail,
    ) -> Option<Arc<Record>> {
        let key = CacheKey {
            reference: reference.clone(),
            expected: expected.cloned(),
            store: self.store.store_id(),
        };

        if let Some(cached) = self.cache.read().get(&key) {
            self.counters.cache_hits.fetch_add(1, Ordering::Relaxed);
            return cached.clone();
        }

        if !trail.enter(&key) {
            self.counters.cycles.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(domain = "resolver", reference = %reference, "re-entrant resolution; treating as unresolved");
            return None;
        }

        self.counters.searches.fetch_add(1, Ordering::Relaxed);
        let resolved = self.run_strategies(reference, expected, trail);
        trail.leave(&key);

        if resolved.is_none() {
            self.counters.unresolved.fetch_add(1, Ordering::Relaxed);
        }

        // First writer wins; a concurrent resolver of the same key stores an
        // equal answer, so losing the race is harmless.
        self.cache.write().entry(key).or_insert(resolved).clone()
    }

    fn run_strategies(
        &self,
        reference: &Reference,
        expected: Option<&Category>,
        trail: &mut ResolveTrail,
    ) -> Option<Arc<Record>> {
        for strategy in &self.strategies {
            match strategy.try_resolve(self, reference, expected, trail) {
                StrategyResult::Resolved(record) => return Some(record),
                StrategyResult::NotApplicable | StrategyResult::Miss => {}
                StrategyResult::Failed(class) => self.note_failure(strategy.kind(), class, reference),
            }
        }
        None
    }

    fn note_failure(&self, kind: StrategyKind, class: FailureClass, reference: &Reference) {
        self.counters.strategy_failures.fetch_add(1, Ordering::Relaxed);
        if self.logged_failures.lock().insert((kind, class)) {
            tracing::debug!(
                domain = "resolver",
                strategy = ?kind,
                failure = ?class,
                reference = %reference,
                "resolution strategy failed; further failures of this class are suppressed",
            );
        }
    }

    pub fn stats(&self) -> ResolverStats {
        ResolverStats {
            searches: self.counters.searches.load(Ordering::Relaxed),
            cache_hits: self.counters.cache_hits.load(Ordering::Relaxed),
            unresolved: self.counters.unresolved.load(Ordering::Relaxed),
            cycles: self.counters.cycles.load(Ordering::Relaxed),
            strategy_failures: self.counters.strategy_failures.load(Ordering::Relaxed),
            failure_classes: self.logged_failures.lock().len(),
        }
    }
}
