//! Settings files layered over defaults.

use crate::common::TestProject;
use codedupe::{ConfigError, EmbeddingBackend, Settings, SymbolKind};

#[test]
fn test_toml_overrides_defaults() {
    let project = TestProject::new();
    let path = project.add_file(
        ".codedupe/settings.toml",
        r#"
[duplicates]
low = 0.6
min_symbol_length = 25
include_symbol_kinds = ["function", "method"]

[embedding]
backend = "hashing"
dimension = 256

[similarity]
backend = "pairwise"
"#,
    );

    let settings = Settings::load_from(&path).unwrap();
    assert_eq!(settings.duplicates.low, 0.6);
    assert_eq!(settings.duplicates.medium, 0.75);
    assert_eq!(settings.duplicates.min_symbol_length, 25);
    assert_eq!(
        settings.duplicates.include_symbol_kinds,
        vec![SymbolKind::Function, SymbolKind::Method]
    );
    assert_eq!(settings.embedding.backend, EmbeddingBackend::Hashing);
    assert_eq!(settings.embedding.dimension, 256);
    assert!(settings.registry.track_file_changes);
}

#[test]
fn test_invalid_file_is_rejected() {
    let project = TestProject::new();
    let path = project.add_file(
        ".codedupe/settings.toml",
        "[duplicates]\nexact = 0.70\nhigh = 0.80\n",
    );

    let err = Settings::load_from(&path).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidThresholds { .. }));
}

#[test]
fn test_init_writes_loadable_defaults() {
    let project = TestProject::new();
    let path = Settings::init_config_file(project.path(), false).unwrap();
    assert!(path.ends_with(".codedupe/settings.toml"));

    let loaded = Settings::load_from(&path).unwrap();
    assert_eq!(loaded.duplicates.exact, 0.95);

    let err = Settings::init_config_file(project.path(), false).unwrap_err();
    assert!(matches!(err, ConfigError::AlreadyExists { .. }));
    assert!(Settings::init_config_file(project.path(), true).is_ok());
}
