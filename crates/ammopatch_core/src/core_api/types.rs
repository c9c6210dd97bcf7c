use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::candidate::Candidate;
use crate::confirm::{ConfirmStats, DEFAULT_ATTACH_SEARCH_DEPTH};
use crate::detector::DetectorMode;
use crate::identity::ExcludedPlugins;
use crate::index::DEFAULT_INDEX_DEPTH;
use crate::patch::DEFAULT_OUTPUT_NAME;
use crate::providers::DEFAULT_LIST_BOUND;
use crate::resolver::ResolverStats;
use crate::schema::SchemaVersion;

use super::config::{PatchConfig, SchemaChoice};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassOptions {
    pub excluded: ExcludedPlugins,
    pub schema: SchemaChoice,
    pub reverse_list_bound: usize,
    pub attach_search_depth: usize,
    pub index_depth: usize,
}

impl Default for PassOptions {
    fn default() -> Self {
        Self {
            excluded: ExcludedPlugins::new(),
            schema: SchemaChoice::Auto,
            reverse_list_bound: DEFAULT_LIST_BOUND,
            attach_search_depth: DEFAULT_ATTACH_SEARCH_DEPTH,
            index_depth: DEFAULT_INDEX_DEPTH,
        }
    }
}

impl From<&PatchConfig> for PassOptions {
    fn from(config: &PatchConfig) -> Self {
        Self {
            excluded: config.excluded_plugins.clone(),
            schema: config.schema,
            reverse_list_bound: config.reverse_provider_list_bound,
            attach_search_depth: config.attach_search_depth,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchOptions {
    pub output_name: String,
    pub author: Option<String>,
    pub compress: bool,
}

impl Default for PatchOptions {
    fn default() -> Self {
        Self {
            output_name: DEFAULT_OUTPUT_NAME.to_string(),
            author: None,
            compress: false,
        }
    }
}

impl From<&PatchConfig> for PatchOptions {
    fn from(config: &PatchConfig) -> Self {
        Self {
            output_name: config.output_name.clone(),
            author: config.author.clone(),
            compress: config.compress,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageCount {
    pub stage: &'static str,
    pub candidates: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfirmerCount {
    pub confirmer: &'static str,
    #[serde(flatten)]
    pub stats: ConfirmStats,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PassCounts {
    pub weapons: usize,
    pub ammunition: usize,
    pub index_identities: usize,
    pub index_entries: usize,
    pub index_malformed: usize,
    pub providers: Vec<StageCount>,
    pub confirmers: Vec<ConfirmerCount>,
    pub candidates: usize,
    pub confirmed: usize,
    pub resolver: ResolverStats,
}

/// Result of one full pass over a load order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PassOutcome {
    pub schema: SchemaVersion,
    pub detector_mode: DetectorMode,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub excluded: ExcludedPlugins,
    pub counts: PassCounts,
    pub candidates: Vec<Candidate>,
}

impl PassOutcome {
    pub fn confirmed(&self) -> impl Iterator<Item = &Candidate> {
        self.candidates.iter().filter(|c| c.confirmed)
    }
}
