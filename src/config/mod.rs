//! Configuration module for querystream.
//!
//! Handles the config file, environment variables, and settings.

mod settings;

pub use settings::{expand_env_vars, HintSettings, Settings, SettingsError, TranslationSettings};
