use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// Plugin names some tools write in place of a missing owner.
const NULL_PLUGIN_SENTINELS: [&str; 2] = ["null", "<null>"];

/// Local ids occupy the low 24 bits of a form id; the high byte is the master index.
pub const LOCAL_ID_MASK: u32 = 0x00FF_FFFF;

/// Plugin names compare with full Unicode case folding, so `Ünï.esp` and
/// `üNÏ.ESP` name the same plugin.
pub fn same_plugin(a: &str, b: &str) -> bool {
    folded(a).eq(folded(b))
}

/// The folded form [`same_plugin`] compares, as an owned key.
pub fn fold_plugin_name(name: &str) -> String {
    folded(name.trim()).collect()
}

fn folded(name: &str) -> impl Iterator<Item = char> + '_ {
    name.chars().flat_map(char::to_lowercase)
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentityError {
    #[error("plugin name is empty")]
    EmptyPlugin,
    #[error("plugin name is the null sentinel '{0}'")]
    NullPlugin(String),
    #[error("local id must be non-zero")]
    ZeroLocalId,
    #[error("malformed identity '{0}'")]
    Malformed(String),
}

/// Composite key of a record across a load order: the plugin that first
/// declared it plus its local id. Plugin names compare case-insensitively.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "RawIdentity", into = "RawIdentity")]
pub struct RecordIdentity {
    plugin: String,
    local_id: u32,
}

#[derive(Serialize, Deserialize)]
struct RawIdentity {
    plugin: String,
    id: u32,
}

impl TryFrom<RawIdentity> for RecordIdentity {
    type Error = IdentityError;

    fn try_from(raw: RawIdentity) -> Result<Self, Self::Error> {
        Self::new(raw.plugin, raw.id)
    }
}

impl From<RecordIdentity> for RawIdentity {
    fn from(identity: RecordIdentity) -> Self {
        Self {
            plugin: identity.plugin,
            id: identity.local_id,
        }
    }
}

impl RecordIdentity {
    pub fn new(plugin: impl Into<String>, local_id: u32) -> Result<Self, IdentityError> {
        let plugin = plugin.into();
        let trimmed = plugin.trim();
        if trimmed.is_empty() {
            return Err(IdentityError::EmptyPlugin);
        }
        if NULL_PLUGIN_SENTINELS
            .iter()
            .any(|sentinel| trimmed.eq_ignore_ascii_case(sentinel))
        {
            return Err(IdentityError::NullPlugin(trimmed.to_string()));
        }
        if local_id == 0 {
            return Err(IdentityError::ZeroLocalId);
        }
        Ok(Self {
            plugin: trimmed.to_string(),
            local_id,
        })
    }

    /// Parses `000800:Mod.esp` or `Mod.esp|0x800`.
    pub fn parse(text: &str) -> Result<Self, IdentityError> {
        let text = text.trim();
        let malformed = || IdentityError::Malformed(text.to_string());

        if let Some((plugin, id)) = text.split_once('|') {
            let id = id.trim();
            let digits = id
                .strip_prefix("0x")
                .or_else(|| id.strip_prefix("0X"))
                .unwrap_or(id);
            let local_id = u32::from_str_radix(digits, 16).map_err(|_| malformed())?;
            return Self::new(plugin, local_id);
        }

        let (id, plugin) = text.split_once(':').ok_or_else(malformed)?;
        if id.is_empty() || id.len() > 8 {
            return Err(malformed());
        }
        let local_id = u32::from_str_radix(id, 16).map_err(|_| malformed())?;
        Self::new(plugin, local_id)
    }

    pub fn plugin(&self) -> &str {
        &self.plugin
    }

    pub fn local_id(&self) -> u32 {
        self.local_id
    }

    pub fn is_from(&self, plugin: &str) -> bool {
        same_plugin(&self.plugin, plugin)
    }

    fn plugin_key(&self) -> impl Iterator<Item = char> + '_ {
        folded(&self.plugin)
    }
}

impl PartialEq for RecordIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.local_id == other.local_id && same_plugin(&self.plugin, &other.plugin)
    }
}

impl Eq for RecordIdentity {}

impl Hash for RecordIdentity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for c in self.plugin_key() {
            state.write_u32(c as u32);
        }
        // Not a valid char, so it cannot collide with a longer name.
        state.write_u32(u32::MAX);
        self.local_id.hash(state);
    }
}

impl Ord for RecordIdentity {
    fn cmp(&self, other: &Self) -> Ordering {
        self.plugin_key()
            .cmp(other.plugin_key())
            .then(self.local_id.cmp(&other.local_id))
    }
}

impl PartialOrd for RecordIdentity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for RecordIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:06X}:{}", self.local_id, self.plugin)
    }
}

/// Plugins whose records must not contribute to a pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct ExcludedPlugins {
    names: BTreeSet<String>,
}

impl ExcludedPlugins {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, plugin: &str) -> bool {
        let plugin = plugin.trim();
        if plugin.is_empty() {
            return false;
        }
        self.names.insert(fold_plugin_name(plugin))
    }

    pub fn contains(&self, plugin: &str) -> bool {
        self.names.contains(&fold_plugin_name(plugin))
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}

impl<S: AsRef<str>> FromIterator<S> for ExcludedPlugins {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut out = Self::new();
        for name in iter {
            out.insert(name.as_ref());
        }
        out
    }
}

impl From<Vec<String>> for ExcludedPlugins {
    fn from(names: Vec<String>) -> Self {
        names.into_iter().collect()
    }
}

impl From<ExcludedPlugins> for Vec<String> {
    fn from(excluded: ExcludedPlugins) -> Self {
        excluded.names.into_iter().collect()
    }
}
