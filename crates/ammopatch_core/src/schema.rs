use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::record::{Category, FieldValue, Record};
use crate::store::RecordStore;

/// Header versions the load order's master files report.
const FALLOUT4_HEADER_VERSIONS: [f32; 2] = [0.95, 1.0];
const STARFIELD_HEADER_VERSIONS: [f32; 1] = [0.96];

const AMMO_PATTERNS: [&str; 3] = ["ammo", "ammunition", "projectile"];
const PRODUCES_PATTERNS: [&str; 4] = ["created_object", "produces", "result", "cnam"];
const ATTACH_POINT_PATTERNS: [&str; 3] = ["attach_point", "attachpoint", "attach_slot"];
const COMPATIBILITY_PATTERNS: [&str; 4] = [
    "attach_parent_slots",
    "attach_parents",
    "compatible",
    "mod_slots",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaVersion {
    Fallout4,
    Starfield,
    Unknown,
}

impl SchemaVersion {
    pub fn from_header_version(version: f32) -> Self {
        let matches = |known: &[f32]| known.iter().any(|v| (v - version).abs() < 0.001);
        if matches(&FALLOUT4_HEADER_VERSIONS) {
            Self::Fallout4
        } else if matches(&STARFIELD_HEADER_VERSIONS) {
            Self::Starfield
        } else {
            Self::Unknown
        }
    }

    /// Reads the store's header version once; no header means `Unknown`.
    pub fn detect(store: &dyn RecordStore) -> Self {
        store
            .header_version()
            .map(Self::from_header_version)
            .unwrap_or(Self::Unknown)
    }

    /// Header version written into output files for this schema.
    pub fn header_version(&self) -> f32 {
        match self {
            Self::Fallout4 | Self::Unknown => 1.0,
            Self::Starfield => 0.96,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fallout4 => "fallout4",
            Self::Starfield => "starfield",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SchemaVersion {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "fo4" | "fallout4" => Ok(Self::Fallout4),
            "sf" | "starfield" => Ok(Self::Starfield),
            "unknown" => Ok(Self::Unknown),
            _ => Err(format!(
                "invalid schema '{value}', expected one of: fallout4, starfield, unknown"
            )),
        }
    }
}

/// Per-version knowledge of where the interesting fields live. A profile
/// answering `None` sends callers to name-pattern fallbacks.
pub trait SchemaProfile: Send + Sync {
    fn version(&self) -> SchemaVersion;

    fn ammo_field(&self, category: &Category) -> Option<&'static str>;

    fn produces_field(&self, category: &Category) -> Option<&'static str>;

    fn attach_point_field(&self, category: &Category) -> Option<&'static str>;

    fn compatibility_field(&self, category: &Category) -> Option<&'static str>;

    /// Property name that, inside a modification's property list, swaps ammo.
    fn ammo_property(&self) -> Option<&'static str> {
        None
    }

    fn is_ammo_like(&self, category: &Category) -> bool {
        category.is_ammo_like()
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Fallout4Profile;

impl SchemaProfile for Fallout4Profile {
    fn version(&self) -> SchemaVersion {
        SchemaVersion::Fallout4
    }

    fn ammo_field(&self, category: &Category) -> Option<&'static str> {
        match category {
            Category::Weapon => Some("ammo"),
            _ => None,
        }
    }

    fn produces_field(&self, category: &Category) -> Option<&'static str> {
        match category {
            Category::ConstructibleObject => Some("created_object"),
            _ => None,
        }
    }

    fn attach_point_field(&self, category: &Category) -> Option<&'static str> {
        match category {
            Category::ObjectModification => Some("attach_point"),
            _ => None,
        }
    }

    fn compatibility_field(&self, category: &Category) -> Option<&'static str> {
        match category {
            Category::Weapon => Some("attach_parent_slots"),
            _ => None,
        }
    }

    fn ammo_property(&self) -> Option<&'static str> {
        Some("Ammo")
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct StarfieldProfile;

impl SchemaProfile for StarfieldProfile {
    fn version(&self) -> SchemaVersion {
        SchemaVersion::Starfield
    }

    fn ammo_field(&self, category: &Category) -> Option<&'static str> {
        match category {
            Category::Weapon => Some("ammunition"),
            _ => None,
        }
    }

    fn produces_field(&self, category: &Category) -> Option<&'static str> {
        match category {
            Category::ConstructibleObject => Some("created_object"),
            _ => None,
        }
    }

    fn attach_point_field(&self, category: &Category) -> Option<&'static str> {
        match category {
            Category::ObjectModification => Some("attach_point"),
            _ => None,
        }
    }

    fn compatibility_field(&self, category: &Category) -> Option<&'static str> {
        match category {
            Category::Weapon => Some("attach_parent_slots"),
            _ => None,
        }
    }

    fn ammo_property(&self) -> Option<&'static str> {
        Some("Ammunition")
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct UnknownProfile;

impl SchemaProfile for UnknownProfile {
    fn version(&self) -> SchemaVersion {
        SchemaVersion::Unknown
    }

    fn ammo_field(&self, _category: &Category) -> Option<&'static str> {
        None
    }

    fn produces_field(&self, _category: &Category) -> Option<&'static str> {
        None
    }

    fn attach_point_field(&self, _category: &Category) -> Option<&'static str> {
        None
    }

    fn compatibility_field(&self, _category: &Category) -> Option<&'static str> {
        None
    }
}

static FALLOUT4: Fallout4Profile = Fallout4Profile;
static STARFIELD: StarfieldProfile = StarfieldProfile;
static UNKNOWN: UnknownProfile = UnknownProfile;

pub fn profile_for(version: SchemaVersion) -> &'static dyn SchemaProfile {
    match version {
        SchemaVersion::Fallout4 => &FALLOUT4,
        SchemaVersion::Starfield => &STARFIELD,
        SchemaVersion::Unknown => &UNKNOWN,
    }
}

/// Which kind of field a lookup is after; drives the pattern fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldRole {
    Ammo,
    Produces,
    AttachPoint,
    Compatibility,
}

impl FieldRole {
    fn patterns(&self) -> &'static [&'static str] {
        match self {
            Self::Ammo => &AMMO_PATTERNS,
            Self::Produces => &PRODUCES_PATTERNS,
            Self::AttachPoint => &ATTACH_POINT_PATTERNS,
            Self::Compatibility => &COMPATIBILITY_PATTERNS,
        }
    }

    fn declared(&self, profile: &dyn SchemaProfile, category: &Category) -> Option<&'static str> {
        match self {
            Self::Ammo => profile.ammo_field(category),
            Self::Produces => profile.produces_field(category),
            Self::AttachPoint => profile.attach_point_field(category),
            Self::Compatibility => profile.compatibility_field(category),
        }
    }
}

pub fn matches_role(name: &str, role: FieldRole) -> bool {
    let name = name.to_ascii_lowercase();
    role.patterns().iter().any(|pattern| name.contains(pattern))
}

/// Finds the field playing `role` on `record`: the profile's declared field
/// first, then the first field whose name matches the role's patterns.
pub fn find_role_field<'r>(
    profile: &dyn SchemaProfile,
    record: &'r Record,
    role: FieldRole,
) -> Option<(&'r str, &'r FieldValue)> {
    if let Some(declared) = role.declared(profile, &record.category)
        && let Some(field) = record
            .fields
            .iter()
            .find(|f| f.name.eq_ignore_ascii_case(declared))
    {
        return Some((field.name.as_str(), &field.value));
    }

    // Link-valued matches beat scalars such as `ammo_capacity`.
    let mut matching = record.fields.iter().filter(|f| matches_role(&f.name, role));
    let first = matching.clone().next();
    matching
        .find(|f| matches!(f.value, FieldValue::Link(_) | FieldValue::List(_)))
        .or(first)
        .map(|f| (f.name.as_str(), &f.value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::RecordIdentity;
    use crate::record::Reference;

    #[test]
    fn header_versions_map_to_schemas() {
        assert_eq!(SchemaVersion::from_header_version(1.0), SchemaVersion::Fallout4);
        assert_eq!(SchemaVersion::from_header_version(0.96), SchemaVersion::Starfield);
        assert_eq!(SchemaVersion::from_header_version(1.7), SchemaVersion::Unknown);
    }

    #[test]
    fn unknown_profile_falls_back_to_patterns() {
        let identity = RecordIdentity::new("Mod.esp", 0x800).unwrap();
        let ammo = RecordIdentity::new("Mod.esp", 0x801).unwrap();
        let record = Record::new(identity, Category::Weapon)
            .with_field("damage", FieldValue::Int(10))
            .with_link("Ammo_Type", Reference::Identity(ammo));

        let profile = profile_for(SchemaVersion::Unknown);
        let (name, _) =
            find_role_field(profile, &record, FieldRole::Ammo).expect("pattern should match");
        assert_eq!(name, "Ammo_Type");
    }

    #[test]
    fn declared_field_wins_over_pattern() {
        let identity = RecordIdentity::new("Mod.esp", 0x800).unwrap();
        let record = Record::new(identity, Category::Weapon)
            .with_field("ammo_capacity", FieldValue::Int(30))
            .with_field("ammo", FieldValue::None);

        let profile = profile_for(SchemaVersion::Fallout4);
        let (name, _) = find_role_field(profile, &record, FieldRole::Ammo).unwrap();
        assert_eq!(name, "ammo");
    }
}
