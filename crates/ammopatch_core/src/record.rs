use std::fmt;

use serde::{Deserialize, Serialize};

use crate::identity::{IdentityError, RecordIdentity};
use crate::store::RecordStore;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Category {
    Weapon,
    Ammunition,
    Projectile,
    ObjectModification,
    ConstructibleObject,
    Keyword,
    LeveledItem,
    FormList,
    MiscItem,
    Other(String),
}

impl Category {
    pub const KNOWN: [Category; 9] = [
        Category::Weapon,
        Category::Ammunition,
        Category::Projectile,
        Category::ObjectModification,
        Category::ConstructibleObject,
        Category::Keyword,
        Category::LeveledItem,
        Category::FormList,
        Category::MiscItem,
    ];

    pub fn from_signature(signature: &str) -> Self {
        match signature.trim().to_ascii_uppercase().as_str() {
            "WEAP" => Self::Weapon,
            "AMMO" => Self::Ammunition,
            "PROJ" => Self::Projectile,
            "OMOD" => Self::ObjectModification,
            "COBJ" => Self::ConstructibleObject,
            "KYWD" => Self::Keyword,
            "LVLI" => Self::LeveledItem,
            "FLST" => Self::FormList,
            "MISC" => Self::MiscItem,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn signature(&self) -> &str {
        match self {
            Self::Weapon => "WEAP",
            Self::Ammunition => "AMMO",
            Self::Projectile => "PROJ",
            Self::ObjectModification => "OMOD",
            Self::ConstructibleObject => "COBJ",
            Self::Keyword => "KYWD",
            Self::LeveledItem => "LVLI",
            Self::FormList => "FLST",
            Self::MiscItem => "MISC",
            Self::Other(signature) => signature,
        }
    }

    /// Records in these categories are what a weapon can fire.
    pub fn is_ammo_like(&self) -> bool {
        matches!(self, Self::Ammunition | Self::Projectile)
    }

    pub fn is_modification_like(&self) -> bool {
        matches!(self, Self::ObjectModification)
    }
}

impl From<String> for Category {
    fn from(value: String) -> Self {
        Self::from_signature(&value)
    }
}

impl From<Category> for String {
    fn from(value: Category) -> Self {
        value.signature().to_string()
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.signature())
    }
}

/// The shapes a link to another record can take inside a field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reference {
    /// Identity plus the category the link is declared against.
    Typed {
        identity: RecordIdentity,
        category: Category,
    },
    Identity(RecordIdentity),
    /// Textual form such as `000800:Mod.esp`.
    Key(String),
    /// A form id relative to `owner`'s master list.
    Raw { owner: String, form_id: u32 },
    EditorId(String),
    /// Whatever `field` on record `via` links to.
    Forward { via: RecordIdentity, field: String },
}

impl Reference {
    pub fn typed(identity: RecordIdentity, category: Category) -> Self {
        Self::Typed { identity, category }
    }

    /// Identity carried by the reference itself, without consulting a store.
    /// Raw, editor-id and forwarding shapes carry none.
    pub fn identity(&self) -> Result<Option<RecordIdentity>, IdentityError> {
        match self {
            Self::Typed { identity, .. } | Self::Identity(identity) => Ok(Some(identity.clone())),
            Self::Key(key) => RecordIdentity::parse(key).map(Some),
            Self::Raw { .. } | Self::EditorId(_) | Self::Forward { .. } => Ok(None),
        }
    }

    /// Like [`Reference::identity`], but raw form ids are decoded through
    /// their owner's master list in `store`.
    pub fn decode(&self, store: &dyn RecordStore) -> Result<Option<RecordIdentity>, IdentityError> {
        match self {
            Self::Raw { owner, form_id } => Ok(store.raw_identity(owner, *form_id)),
            other => other.identity(),
        }
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Typed { identity, category } => write!(f, "{category}:{identity}"),
            Self::Identity(identity) => write!(f, "{identity}"),
            Self::Key(key) => write!(f, "{key}"),
            Self::Raw { owner, form_id } => write!(f, "{owner}@{form_id:08X}"),
            Self::EditorId(editor_id) => write!(f, "#{editor_id}"),
            Self::Forward { via, field } => write!(f, "{via}.{field}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldValue {
    #[default]
    None,
    Int(i64),
    Float(f64),
    Text(String),
    Link(Reference),
    List(Vec<FieldValue>),
    Struct(Vec<Field>),
}

impl FieldValue {
    pub fn as_link(&self) -> Option<&Reference> {
        match self {
            Self::Link(reference) => Some(reference),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    #[serde(default)]
    pub value: FieldValue,
}

impl Field {
    pub fn new(name: impl Into<String>, value: FieldValue) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }

    pub fn link(name: impl Into<String>, reference: Reference) -> Self {
        Self::new(name, FieldValue::Link(reference))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub identity: RecordIdentity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub editor_id: Option<String>,
    pub category: Category,
    /// Plugin that supplied this (winning) version; defaults to the identity's plugin.
    #[serde(default)]
    pub source_plugin: String,
    #[serde(default)]
    pub fields: Vec<Field>,
}

impl Record {
    pub fn new(identity: RecordIdentity, category: Category) -> Self {
        let source_plugin = identity.plugin().to_string();
        Self {
            identity,
            editor_id: None,
            category,
            source_plugin,
            fields: Vec::new(),
        }
    }

    pub fn with_editor_id(mut self, editor_id: impl Into<String>) -> Self {
        self.editor_id = Some(editor_id.into());
        self
    }

    pub fn with_source(mut self, plugin: impl Into<String>) -> Self {
        self.source_plugin = plugin.into();
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, value: FieldValue) -> Self {
        self.fields.push(Field::new(name, value));
        self
    }

    pub fn with_link(self, name: impl Into<String>, reference: Reference) -> Self {
        self.with_field(name, FieldValue::Link(reference))
    }

    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields
            .iter()
            .find(|field| field.name.eq_ignore_ascii_case(name))
            .map(|field| &field.value)
    }

    pub fn field_mut(&mut self, name: &str) -> Option<&mut FieldValue> {
        self.fields
            .iter_mut()
            .find(|field| field.name.eq_ignore_ascii_case(name))
            .map(|field| &mut field.value)
    }

    /// Replaces the named field's value, appending the field when absent.
    pub fn set_field(&mut self, name: &str, value: FieldValue) {
        match self.field_mut(name) {
            Some(slot) => *slot = value,
            None => self.fields.push(Field::new(name, value)),
        }
    }

    pub fn label(&self) -> String {
        match &self.editor_id {
            Some(editor_id) if !editor_id.is_empty() => editor_id.clone(),
            _ => self.identity.to_string(),
        }
    }

    /// Depth-first walk over every leaf value, bounded by `max_depth` levels
    /// of list/struct nesting. Paths look like `properties[1].value`.
    pub fn walk_values(&self, max_depth: usize) -> Vec<FieldVisit<'_>> {
        let mut out = Vec::new();
        for field in &self.fields {
            walk_value(&field.name, &field.name, &field.value, 0, max_depth, &mut out);
        }
        out
    }
}

/// One leaf reached by [`Record::walk_values`].
#[derive(Debug, Clone, PartialEq)]
pub struct FieldVisit<'a> {
    pub path: String,
    /// Top-level field name the leaf sits under.
    pub root: &'a str,
    /// Best human label for the leaf: a sibling `property`/`name` text when
    /// the leaf lives in a struct, else the field name.
    pub label: String,
    pub value: &'a FieldValue,
    pub depth: usize,
}

const LABEL_SIBLINGS: [&str; 3] = ["property", "name", "keyword"];

fn walk_value<'a>(
    root: &'a str,
    path: &str,
    value: &'a FieldValue,
    depth: usize,
    max_depth: usize,
    out: &mut Vec<FieldVisit<'a>>,
) {
    match value {
        FieldValue::List(items) => {
            if depth >= max_depth {
                return;
            }
            for (index, item) in items.iter().enumerate() {
                walk_value(root, &format!("{path}[{index}]"), item, depth + 1, max_depth, out);
            }
        }
        FieldValue::Struct(fields) => {
            if depth >= max_depth {
                return;
            }
            let sibling_label = fields
                .iter()
                .find(|f| LABEL_SIBLINGS.iter().any(|s| f.name.eq_ignore_ascii_case(s)))
                .and_then(|f| f.value.as_text())
                .map(ToOwned::to_owned);
            for field in fields {
                let child_path = format!("{path}.{}", field.name);
                let before = out.len();
                walk_value(root, &child_path, &field.value, depth + 1, max_depth, out);
                if let Some(label) = &sibling_label {
                    for visit in out[before..].iter_mut().filter(|v| v.depth == depth + 1) {
                        visit.label = label.clone();
                    }
                }
            }
        }
        leaf => out.push(FieldVisit {
            path: path.to_string(),
            root,
            label: leaf_label(path),
            value: leaf,
            depth,
        }),
    }
}

fn leaf_label(path: &str) -> String {
    let last = path.rsplit('.').next().unwrap_or(path);
    last.split('[').next().unwrap_or(last).to_string()
}
