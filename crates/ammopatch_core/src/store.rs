use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::core_api::{CoreError, CoreErrorCode};
use crate::identity::{LOCAL_ID_MASK, RecordIdentity, same_plugin};
use crate::record::{Category, Record};

pub const LOAD_ORDER_FILE: &str = "plugins.txt";

pub type StoreId = u64;

static NEXT_STORE_ID: AtomicU64 = AtomicU64::new(1);

/// Winning-record view over a layered load order.
pub trait RecordStore: Send + Sync {
    /// Distinguishes stores in cache keys; two live stores never share an id.
    fn store_id(&self) -> StoreId;

    fn winning_records(&self, category: &Category) -> Vec<Arc<Record>>;

    fn all_categories(&self) -> Vec<(Category, Vec<Arc<Record>>)>;

    fn resolve(&self, identity: &RecordIdentity, category: Option<&Category>)
    -> Option<Arc<Record>>;

    /// Identity a raw form id names, read against `owner`'s master list:
    /// the high byte indexes the masters, one past the end is `owner` itself.
    fn raw_identity(&self, _owner: &str, _form_id: u32) -> Option<RecordIdentity> {
        None
    }

    fn resolve_raw(&self, owner: &str, form_id: u32) -> Option<Arc<Record>> {
        self.resolve(&self.raw_identity(owner, form_id)?, None)
    }

    fn resolve_editor_id(&self, _editor_id: &str) -> Option<Arc<Record>> {
        None
    }

    /// Header version of the first master, when the store knows it.
    fn header_version(&self) -> Option<f32> {
        None
    }

    fn plugin_names(&self) -> Vec<String> {
        Vec::new()
    }
}

/// One plugin's records as dumped by an external codec.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginData {
    pub name: String,
    #[serde(default)]
    pub masters: Vec<String>,
    #[serde(default)]
    pub version: Option<f32>,
    #[serde(default)]
    pub records: Vec<Record>,
}

impl PluginData {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            masters: Vec::new(),
            version: None,
            records: Vec::new(),
        }
    }

    pub fn with_master(mut self, master: impl Into<String>) -> Self {
        self.masters.push(master.into());
        self
    }

    pub fn with_version(mut self, version: f32) -> Self {
        self.version = Some(version);
        self
    }

    pub fn with_record(mut self, record: Record) -> Self {
        self.records.push(record);
        self
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self, CoreError> {
        serde_json::from_slice(bytes).map_err(|e| {
            CoreError::new(CoreErrorCode::Parse, format!("invalid plugin dump: {e}"))
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
struct PluginInfo {
    name: String,
    masters: Vec<String>,
    version: Option<f32>,
}

#[derive(Debug)]
pub struct LoadOrder {
    id: StoreId,
    plugins: Vec<PluginInfo>,
    records: Vec<Arc<Record>>,
    by_identity: HashMap<RecordIdentity, usize>,
    by_editor_id: HashMap<String, usize>,
    categories: Vec<(Category, Vec<usize>)>,
}

impl LoadOrder {
    /// Layers `plugins` in order: a later plugin's record replaces an earlier
    /// one with the same identity but keeps the original's position.
    pub fn from_plugins(plugins: Vec<PluginData>) -> Self {
        let mut infos = Vec::with_capacity(plugins.len());
        let mut records: Vec<Arc<Record>> = Vec::new();
        let mut by_identity = HashMap::new();

        for plugin in plugins {
            for mut record in plugin.records {
                record.source_plugin = plugin.name.clone();
                match by_identity.get(&record.identity) {
                    Some(&index) => records[index] = Arc::new(record),
                    None => {
                        by_identity.insert(record.identity.clone(), records.len());
                        records.push(Arc::new(record));
                    }
                }
            }
            infos.push(PluginInfo {
                name: plugin.name,
                masters: plugin.masters,
                version: plugin.version,
            });
        }

        let mut by_editor_id = HashMap::new();
        let mut categories: Vec<(Category, Vec<usize>)> = Vec::new();
        for (index, record) in records.iter().enumerate() {
            if let Some(editor_id) = &record.editor_id {
                by_editor_id
                    .entry(editor_id.to_ascii_lowercase())
                    .or_insert(index);
            }
            match categories.iter_mut().find(|(c, _)| *c == record.category) {
                Some((_, members)) => members.push(index),
                None => categories.push((record.category.clone(), vec![index])),
            }
        }

        Self {
            id: NEXT_STORE_ID.fetch_add(1, Ordering::Relaxed),
            plugins: infos,
            records,
            by_identity,
            by_editor_id,
            categories,
        }
    }

    /// Reads `plugins.txt` from `dir` and the `<plugin>.json` dump for every
    /// listed plugin. Plugins without a dump are skipped with a warning.
    pub fn load_dir(dir: &Path) -> Result<Self, CoreError> {
        let list_path = resolve_case_insensitive_component(dir, LOAD_ORDER_FILE).ok_or_else(|| {
            CoreError::new(
                CoreErrorCode::Io,
                format!("could not find {LOAD_ORDER_FILE} under {}", dir.display()),
            )
        })?;
        let list = fs::read(&list_path).map_err(|e| {
            CoreError::new(
                CoreErrorCode::Io,
                format!("failed to read {}: {e}", list_path.display()),
            )
        })?;

        let names = parse_plugin_list(&String::from_utf8_lossy(&list));
        if names.is_empty() {
            return Err(CoreError::new(
                CoreErrorCode::Parse,
                format!("no plugins listed in {}", list_path.display()),
            ));
        }

        let mut plugins = Vec::with_capacity(names.len());
        for name in names {
            let Some(path) = resolve_case_insensitive_component(dir, &format!("{name}.json"))
            else {
                tracing::warn!(domain = "store", plugin = %name, "no record dump for plugin; skipping");
                continue;
            };
            let bytes = fs::read(&path).map_err(|e| {
                CoreError::new(
                    CoreErrorCode::Io,
                    format!("failed to read {}: {e}", path.display()),
                )
            })?;
            let mut plugin = PluginData::from_json(&bytes).map_err(|e| {
                CoreError::new(e.code, format!("{}: {}", path.display(), e.message))
            })?;
            if plugin.name.is_empty() {
                plugin.name = name;
            }
            plugins.push(plugin);
        }

        tracing::info!(domain = "store", plugins = plugins.len(), dir = %dir.display(), "load order read");
        Ok(Self::from_plugins(plugins))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn masters_of(&self, plugin: &str) -> Option<&[String]> {
        self.plugin(plugin).map(|info| info.masters.as_slice())
    }

    fn plugin(&self, name: &str) -> Option<&PluginInfo> {
        self.plugins
            .iter()
            .find(|info| same_plugin(&info.name, name))
    }
}

impl RecordStore for LoadOrder {
    fn store_id(&self) -> StoreId {
        self.id
    }

    fn winning_records(&self, category: &Category) -> Vec<Arc<Record>> {
        self.categories
            .iter()
            .find(|(c, _)| c == category)
            .map(|(_, members)| members.iter().map(|&i| self.records[i].clone()).collect())
            .unwrap_or_default()
    }

    fn all_categories(&self) -> Vec<(Category, Vec<Arc<Record>>)> {
        self.categories
            .iter()
            .map(|(category, members)| {
                (
                    category.clone(),
                    members.iter().map(|&i| self.records[i].clone()).collect(),
                )
            })
            .collect()
    }

    fn resolve(
        &self,
        identity: &RecordIdentity,
        category: Option<&Category>,
    ) -> Option<Arc<Record>> {
        let record = &self.records[*self.by_identity.get(identity)?];
        match category {
            Some(category) if record.category != *category => None,
            _ => Some(record.clone()),
        }
    }

    fn raw_identity(&self, owner: &str, form_id: u32) -> Option<RecordIdentity> {
        let masters = self.masters_of(owner)?;
        let master_index = (form_id >> 24) as usize;
        let plugin = match masters.get(master_index) {
            Some(master) => master.as_str(),
            None if master_index == masters.len() => owner,
            None => return None,
        };
        RecordIdentity::new(plugin, form_id & LOCAL_ID_MASK).ok()
    }

    fn resolve_editor_id(&self, editor_id: &str) -> Option<Arc<Record>> {
        let index = *self.by_editor_id.get(&editor_id.to_ascii_lowercase())?;
        Some(self.records[index].clone())
    }

    fn header_version(&self) -> Option<f32> {
        self.plugins.iter().find_map(|info| info.version)
    }

    fn plugin_names(&self) -> Vec<String> {
        self.plugins.iter().map(|info| info.name.clone()).collect()
    }
}

/// `plugins.txt` lines: `#` comments, optional `*` active marker.
fn parse_plugin_list(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(|line| line.split('#').next().unwrap_or(""))
        .map(str::trim)
        .map(|line| line.trim_start_matches('*').trim())
        .filter(|line| !line.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}

fn resolve_case_insensitive_component(base: &Path, part: &str) -> Option<PathBuf> {
    let direct = base.join(part);
    if direct.exists() {
        return Some(direct);
    }

    let entries = fs::read_dir(base).ok()?;
    for entry in entries.flatten() {
        let name = entry.file_name();
        if name.to_string_lossy().eq_ignore_ascii_case(part) {
            return Some(entry.path());
        }
    }
    None
}
