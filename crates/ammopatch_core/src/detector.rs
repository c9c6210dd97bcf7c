use serde::{Deserialize, Serialize};

use crate::identity::RecordIdentity;
use crate::record::{Category, FieldValue, Record, Reference};
use crate::resolver::LinkResolver;
use crate::schema::{SchemaProfile, SchemaVersion, profile_for};

const TARGET_NAMES: [&str; 3] = ["ammo", "ammunition", "projectile"];
const MIN_NAME_SCORE: f64 = 0.85;
const CONTAINS_SCORE: f64 = 0.95;
const DECLARED_SCORE: f64 = 2.0;
const DETECTOR_DEPTH: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DetectorMode {
    /// Uses the schema profile's declared fields before name ranking.
    CategoryAware(SchemaVersion),
    BestEffort,
}

/// Picks the detector once per pass; unknown schemas get the pure scan.
pub fn detector_for(version: SchemaVersion) -> AmmoChangeDetector {
    let mode = match version {
        SchemaVersion::Unknown => DetectorMode::BestEffort,
        known => DetectorMode::CategoryAware(known),
    };
    AmmoChangeDetector::new(mode)
}

#[derive(Debug, Clone, PartialEq)]
pub struct AmmoChange {
    pub field: String,
    pub reference: Reference,
    pub identity: RecordIdentity,
    pub label: String,
    pub score: f64,
}

pub struct AmmoChangeDetector {
    mode: DetectorMode,
    profile: &'static dyn SchemaProfile,
}

impl AmmoChangeDetector {
    pub fn new(mode: DetectorMode) -> Self {
        let version = match mode {
            DetectorMode::CategoryAware(version) => version,
            DetectorMode::BestEffort => SchemaVersion::Unknown,
        };
        Self {
            mode,
            profile: profile_for(version),
        }
    }

    pub fn mode(&self) -> DetectorMode {
        self.mode
    }

    /// Reports the best-ranked ammo-like field on `record` whose link
    /// resolves to something other than `original`.
    pub fn detects_change(
        &self,
        resolver: &LinkResolver<'_>,
        record: &Record,
        original: Option<&RecordIdentity>,
    ) -> Option<AmmoChange> {
        for (score, path, reference) in self.ranked_links(record) {
            let Some(resolved) = resolver.resolve(reference) else {
                continue;
            };
            if original.is_some_and(|original| *original == resolved.identity) {
                continue;
            }
            return Some(AmmoChange {
                field: path,
                reference: reference.clone(),
                identity: resolved.identity.clone(),
                label: resolved.label(),
                score,
            });
        }
        None
    }

    /// Link-valued leaves ordered by how ammo-like their label is. Leaves
    /// below the similarity floor are dropped.
    fn ranked_links<'r>(&self, record: &'r Record) -> Vec<(f64, String, &'r Reference)> {
        let declared = self.declared_names(&record.category);
        let ammo_property = match self.mode {
            DetectorMode::CategoryAware(_) => self.profile.ammo_property(),
            DetectorMode::BestEffort => None,
        };

        let mut ranked: Vec<(f64, String, &'r Reference)> = record
            .walk_values(DETECTOR_DEPTH)
            .into_iter()
            .filter_map(|visit| {
                let FieldValue::Link(reference) = visit.value else {
                    return None;
                };
                let is_declared = declared.iter().any(|d| visit.root.eq_ignore_ascii_case(d))
                    || ammo_property.is_some_and(|p| visit.label.eq_ignore_ascii_case(p));
                let score = if is_declared {
                    DECLARED_SCORE
                } else {
                    name_score(&visit.label).max(name_score(visit.root))
                };
                (score >= MIN_NAME_SCORE).then_some((score, visit.path, reference))
            })
            .collect();

        ranked.sort_by(|a, b| b.0.total_cmp(&a.0));
        ranked
    }

    fn declared_names(&self, category: &Category) -> Vec<&'static str> {
        match self.mode {
            DetectorMode::CategoryAware(_) => self.profile.ammo_field(category).into_iter().collect(),
            DetectorMode::BestEffort => Vec::new(),
        }
    }
}

/// Similarity of a field label to "ammunition/projectile", in `0.0..=1.0`.
pub fn name_score(label: &str) -> f64 {
    let lower = label.to_ascii_lowercase();
    if TARGET_NAMES.iter().any(|target| lower.contains(target)) {
        return CONTAINS_SCORE;
    }

    split_words(label)
        .iter()
        .flat_map(|word| {
            TARGET_NAMES
                .iter()
                .map(move |target| strsim::jaro_winkler(word, target))
        })
        .fold(0.0, f64::max)
}

/// Splits `snake_case`, `camelCase` and path punctuation into lowercase words.
fn split_words(label: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut prev_lower = false;
    for ch in label.chars() {
        if !ch.is_ascii_alphabetic() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            prev_lower = false;
            continue;
        }
        if ch.is_ascii_uppercase() && prev_lower && !current.is_empty() {
            words.push(std::mem::take(&mut current));
        }
        prev_lower = ch.is_ascii_lowercase();
        current.push(ch.to_ascii_lowercase());
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}
