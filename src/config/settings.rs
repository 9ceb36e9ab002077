//! TOML-based configuration for querystream.
//!
//! Supports a config file (querystream.toml) with environment variable expansion.
//!
//! Example configuration:
//! ```toml
//! [translation]
//! dialect = "hql"
//!
//! [hints]
//! automatic_page_size = 500
//! exception_on_translation_fail = false
//!
//! [entities.Customer]
//! name = "string"
//! country = "string"
//! debt = "numeric"
//!
//! [entities.Sale]
//! customer = { reference = "${SALE_CUSTOMER_ENTITY}" }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::num::NonZeroU64;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::metamodel::{EntityType, Metamodel, MetamodelError};
use crate::sql::query::Hints;
use crate::sql::Dialect;

static ENV_VAR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\{([^}]*)\}|\$([A-Za-z0-9_]+)").expect("env var pattern is valid")
});

/// Error type for settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid metamodel: {0}")]
    InvalidMetamodel(#[from] MetamodelError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Query text generation.
    pub translation: TranslationSettings,

    /// Hints every new stream starts with.
    pub hints: HintSettings,

    /// Entity types keyed by name, each a table of attribute kinds.
    pub entities: BTreeMap<String, EntityType>,
}

/// Translation configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct TranslationSettings {
    /// Query dialect (jpql, hql).
    pub dialect: Dialect,
}

/// Default hint values.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HintSettings {
    /// Rows per fetch; absent means one fetch per query.
    pub automatic_page_size: Option<u64>,

    /// Fail streams whose clauses do not translate.
    pub exception_on_translation_fail: bool,
}

impl Default for HintSettings {
    fn default() -> Self {
        Self {
            automatic_page_size: None,
            exception_on_translation_fail: true,
        }
    }
}

impl Settings {
    /// Parse settings from TOML text, expanding environment variables first.
    pub fn from_toml(content: &str) -> Result<Self, SettingsError> {
        let expanded = expand_env_vars(content)?;
        Ok(toml::from_str(&expanded)?)
    }

    /// Load settings from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SettingsError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Load settings from the default config file locations.
    ///
    /// Searches in order:
    /// 1. Environment variable `QUERYSTREAM_CONFIG`
    /// 2. `./querystream.toml`
    /// 3. `~/.config/querystream/config.toml`
    pub fn load() -> Result<Self, SettingsError> {
        if let Ok(path) = env::var("QUERYSTREAM_CONFIG") {
            return Self::from_file(&path);
        }

        let local_config = PathBuf::from("querystream.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("querystream").join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        Ok(Settings::default())
    }

    /// Build and validate the configured metamodel.
    pub fn metamodel(&self) -> Result<Metamodel, SettingsError> {
        let metamodel: Metamodel = self
            .entities
            .iter()
            .map(|(name, entity)| EntityType {
                name: name.clone(),
                attributes: entity.attributes.clone(),
            })
            .collect();
        metamodel.validate()?;
        Ok(metamodel)
    }

    /// The configured default hints.
    pub fn hints(&self) -> Result<Hints, SettingsError> {
        let automatic_page_size = match self.hints.automatic_page_size {
            Some(size) => Some(NonZeroU64::new(size).ok_or_else(|| {
                SettingsError::InvalidConfig("hints.automatic_page_size must be positive".into())
            })?),
            None => None,
        };
        Ok(Hints {
            automatic_page_size,
            exception_on_translation_fail: self.hints.exception_on_translation_fail,
        })
    }
}

/// Expand environment variables in a string.
///
/// Supports `${VAR}` and `$VAR` syntax. A `$` not followed by a name is kept.
pub fn expand_env_vars(s: &str) -> Result<String, SettingsError> {
    let mut missing = None;
    let expanded = ENV_VAR.replace_all(s, |caps: &Captures| {
        let name = caps
            .get(1)
            .or_else(|| caps.get(2))
            .map_or("", |m| m.as_str());
        match env::var(name) {
            Ok(value) => value,
            Err(_) => {
                missing.get_or_insert_with(|| name.to_string());
                String::new()
            }
        }
    });
    match missing {
        Some(name) => Err(SettingsError::MissingEnvVar(name)),
        None => Ok(expanded.into_owned()),
    }
}
