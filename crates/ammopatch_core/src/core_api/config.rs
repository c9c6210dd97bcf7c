use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::confirm::DEFAULT_ATTACH_SEARCH_DEPTH;
use crate::identity::ExcludedPlugins;
use crate::patch::DEFAULT_OUTPUT_NAME;
use crate::providers::DEFAULT_LIST_BOUND;
use crate::schema::SchemaVersion;
use crate::store::RecordStore;

use super::error::{CoreError, CoreErrorCode};

const PLUGIN_EXTENSIONS: [&str; 3] = ["esp", "esm", "esl"];

/// Schema selection: detect from the load order, or force one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaChoice {
    #[default]
    Auto,
    Fallout4,
    Starfield,
    Unknown,
}

impl SchemaChoice {
    pub fn resolve(&self, store: &dyn RecordStore) -> SchemaVersion {
        match self {
            Self::Auto => SchemaVersion::detect(store),
            Self::Fallout4 => SchemaVersion::Fallout4,
            Self::Starfield => SchemaVersion::Starfield,
            Self::Unknown => SchemaVersion::Unknown,
        }
    }
}

impl FromStr for SchemaChoice {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if value.eq_ignore_ascii_case("auto") {
            return Ok(Self::Auto);
        }
        match value.parse::<SchemaVersion>() {
            Ok(SchemaVersion::Fallout4) => Ok(Self::Fallout4),
            Ok(SchemaVersion::Starfield) => Ok(Self::Starfield),
            Ok(SchemaVersion::Unknown) => Ok(Self::Unknown),
            Err(_) => Err(format!(
                "invalid schema '{value}', expected one of: auto, fallout4, starfield, unknown"
            )),
        }
    }
}

impl fmt::Display for SchemaChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Auto => "auto",
            Self::Fallout4 => "fallout4",
            Self::Starfield => "starfield",
            Self::Unknown => "unknown",
        })
    }
}

/// `ammopatch.toml`. Every key is optional.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PatchConfig {
    pub excluded_plugins: ExcludedPlugins,
    pub output_name: String,
    pub author: Option<String>,
    pub schema: SchemaChoice,
    pub reverse_provider_list_bound: usize,
    pub attach_search_depth: usize,
    pub compress: bool,
}

impl Default for PatchConfig {
    fn default() -> Self {
        Self {
            excluded_plugins: ExcludedPlugins::new(),
            output_name: DEFAULT_OUTPUT_NAME.to_string(),
            author: None,
            schema: SchemaChoice::Auto,
            reverse_provider_list_bound: DEFAULT_LIST_BOUND,
            attach_search_depth: DEFAULT_ATTACH_SEARCH_DEPTH,
            compress: false,
        }
    }
}

impl PatchConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, CoreError> {
        let config: Self = toml::from_str(text).map_err(|e| {
            CoreError::new(CoreErrorCode::InvalidConfig, format!("invalid config: {e}"))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, CoreError> {
        let text = fs::read_to_string(path).map_err(|e| {
            CoreError::new(
                CoreErrorCode::Io,
                format!("failed to read config {}: {e}", path.display()),
            )
        })?;
        Self::from_toml_str(&text).map_err(|e| {
            CoreError::new(e.code, format!("{}: {}", path.display(), e.message))
        })
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        validate_output_name(&self.output_name)?;
        if self.reverse_provider_list_bound == 0 {
            return Err(CoreError::new(
                CoreErrorCode::InvalidConfig,
                "reverse_provider_list_bound must be at least 1",
            ));
        }
        Ok(())
    }
}

pub fn validate_output_name(name: &str) -> Result<(), CoreError> {
    let invalid = |why: &str| {
        CoreError::new(
            CoreErrorCode::InvalidConfig,
            format!("invalid output name '{name}': {why}"),
        )
    };
    if name.trim().is_empty() {
        return Err(invalid("empty"));
    }
    if name.contains(['/', '\\']) {
        return Err(invalid("must be a file name, not a path"));
    }
    let has_plugin_extension = Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| PLUGIN_EXTENSIONS.iter().any(|p| ext.eq_ignore_ascii_case(p)));
    if !has_plugin_extension {
        return Err(invalid("expected an .esp, .esm or .esl extension"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config = PatchConfig::from_toml_str("").unwrap();
        assert_eq!(config, PatchConfig::default());
        assert_eq!(config.output_name, "AmmoPatch.esp");
        assert_eq!(config.reverse_provider_list_bound, 16);
        assert_eq!(config.attach_search_depth, 2);
    }

    #[test]
    fn parses_all_keys() {
        let config = PatchConfig::from_toml_str(
            r#"
excluded_plugins = ["Unofficial Patch.esp", "DLCRobot.esm"]
output_name = "MyAmmo.esl"
author = "someone"
schema = "starfield"
reverse_provider_list_bound = 8
attach_search_depth = 3
compress = true
"#,
        )
        .unwrap();
        assert!(config.excluded_plugins.contains("unofficial patch.esp"));
        assert_eq!(config.schema, SchemaChoice::Starfield);
        assert_eq!(config.reverse_provider_list_bound, 8);
        assert!(config.compress);
    }

    #[test]
    fn unknown_keys_and_bad_values_are_rejected() {
        let err = PatchConfig::from_toml_str("outptu_name = \"x.esp\"").unwrap_err();
        assert_eq!(err.code, CoreErrorCode::InvalidConfig);

        let err = PatchConfig::from_toml_str("output_name = \"patch.txt\"").unwrap_err();
        assert!(err.message.contains("extension"));

        let err = PatchConfig::from_toml_str("reverse_provider_list_bound = 0").unwrap_err();
        assert_eq!(err.code, CoreErrorCode::InvalidConfig);
    }

    #[test]
    fn schema_choice_parses_aliases() {
        assert_eq!("auto".parse::<SchemaChoice>().unwrap(), SchemaChoice::Auto);
        assert_eq!("FO4".parse::<SchemaChoice>().unwrap(), SchemaChoice::Fallout4);
        assert!("skyrim".parse::<SchemaChoice>().is_err());
    }

    #[test]
    fn load_reports_missing_file_as_io() {
        let dir = tempfile::tempdir().unwrap();
        let err = PatchConfig::load(&dir.path().join("missing.toml")).unwrap_err();
        assert_eq!(err.code, CoreErrorCode::Io);
    }
}
