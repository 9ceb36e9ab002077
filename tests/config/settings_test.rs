//! Integration tests for loading settings and building a provider from them.

use std::fs;
use std::path::PathBuf;

use querystream::config::{Settings, SettingsError};
use querystream::prelude::*;

const CONFIG: &str = r#"
[translation]
dialect = "hql"

[hints]
automatic_page_size = 2
exception_on_translation_fail = false

[entities.Customer]
name = "string"
country = "${QS_SETTINGS_TEST_COUNTRY_TYPE}"
debt = "numeric"
"#;

fn write_config(name: &str, content: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("querystream-{}-{}.toml", name, std::process::id()));
    fs::write(&path, content).unwrap();
    path
}

#[test]
fn test_provider_from_config_file() {
    std::env::set_var("QS_SETTINGS_TEST_COUNTRY_TYPE", "string");
    let path = write_config("provider", CONFIG);
    let settings = Settings::from_file(&path).unwrap();
    fs::remove_file(&path).unwrap();

    let provider = StreamProvider::from_settings(&settings).unwrap();
    assert_eq!(provider.dialect(), Dialect::Hql);
    assert!(provider.metamodel().contains("Customer"));
    assert!(!provider.hints().exception_on_translation_fail);

    let executor = MemoryExecutor::new();
    let stream = provider
        .stream_all(&executor, "Customer")
        .select(Lambda::new(|c: Sym| c.get("name").concat(c.get("country"))));
    assert_eq!(
        stream.query_text().unwrap(),
        "SELECT A.name || (A.country) FROM Customer A"
    );
    assert_eq!(stream.hints().automatic_page_size.map(|n| n.get()), Some(2));
}

#[test]
fn test_missing_env_var_is_reported() {
    let path = write_config("missing-env", "[entities.Customer]\nname = \"${QS_SETTINGS_TEST_UNSET}\"\n");
    let result = Settings::from_file(&path);
    fs::remove_file(&path).unwrap();
    assert!(matches!(result, Err(SettingsError::MissingEnvVar(name)) if name == "QS_SETTINGS_TEST_UNSET"));
}

#[test]
fn test_missing_file() {
    let result = Settings::from_file("/nonexistent/querystream.toml");
    assert!(matches!(result, Err(SettingsError::FileNotFound(_))));
}

#[test]
fn test_unknown_attribute_type_is_a_parse_error() {
    let result = Settings::from_toml("[entities.Customer]\nname = \"text\"\n");
    assert!(matches!(result, Err(SettingsError::ParseError(_))));
}

#[test]
fn test_invalid_entity_name() {
    let settings = Settings::from_toml("[entities.\"Bad Name\"]\nname = \"string\"\n").unwrap();
    assert!(matches!(
        StreamProvider::from_settings(&settings),
        Err(SettingsError::InvalidMetamodel(_))
    ));
}
