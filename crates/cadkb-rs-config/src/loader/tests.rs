//! Tests for layered configuration loading.

use super::*;
use crate::EmbeddingProviderKind;
use pretty_assertions::assert_eq;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// Write JSON5 contents to a path, creating parent directories if needed.
fn write_json5(path: &Path, contents: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("dir");
    }
    fs::write(path, contents).expect("write");
}

/// Options that only look inside the temp dir.
fn isolated_options(cwd: &Path) -> LayeredConfigOptions {
    let mut options = LayeredConfigOptions::new(cwd);
    options.system_config_path = None;
    options.user_config_path = None;
    options
}

#[test]
fn parse_minimal_config() {
    let config = KnowledgeConfig::load_from_str("{}").expect("config");
    assert_eq!(config.embedding.provider, EmbeddingProviderKind::Hashing);
    assert_eq!(config.embedding.dimension, 384);
    assert_eq!(config.embedding.timeout_ms, 5_000);
    assert_eq!(config.recall.default_results, 5);
    assert_eq!(config.analysis.top_tags, 10);
    assert_eq!(config.store.path, None);
}

#[test]
fn rejects_unknown_top_level_key() {
    let err = KnowledgeConfig::load_from_str("{ unexpected: true }").unwrap_err();
    assert!(format!("{err}").contains("unknown key"));
}

#[test]
fn rejects_unknown_embedding_provider() {
    let err = KnowledgeConfig::load_from_str(r#"{ embedding: { provider: "magic" } }"#)
        .unwrap_err();
    let msg = format!("{err}");
    assert!(msg.contains("embedding.provider"), "{msg}");
}

#[test]
fn http_provider_requires_endpoint() {
    let err = KnowledgeConfig::load_from_str(r#"{ embedding: { provider: "http" } }"#)
        .unwrap_err();
    assert!(format!("{err}").contains("endpoint"));

    let config = KnowledgeConfig::load_from_str(
        r#"{ embedding: { provider: "http", endpoint: "http://localhost:11434", model: "all-minilm" } }"#,
    )
    .expect("config");
    assert_eq!(config.embedding.provider, EmbeddingProviderKind::Http);
}

#[test]
fn rejects_out_of_range_min_score() {
    let err = KnowledgeConfig::load_from_str("{ recall: { min_score: 2.5 } }").unwrap_err();
    assert!(format!("{err}").contains("min_score"));
}

#[test]
fn rejects_zero_result_default() {
    let err = KnowledgeConfig::load_from_str("{ recall: { default_results: 0 } }").unwrap_err();
    assert!(format!("{err}").contains("default_results"));
}

#[test]
fn cwd_overrides_project_and_runtime_overrides_cwd() {
    let temp = TempDir::new().expect("tmp");
    let project_root = temp.path().join("project");
    fs::create_dir_all(project_root.join(".git")).expect("git");
    let cwd = project_root.join("parts");
    fs::create_dir_all(&cwd).expect("cwd");

    let user_config = temp.path().join("user.json5");
    write_json5(&user_config, "{ analysis: { top_tags: 3 } }");
    write_json5(
        &project_root.join(DEFAULT_CONFIG_FILE),
        "{ recall: { default_results: 7 }, embedding: { dimension: 64 } }",
    );
    write_json5(
        &cwd.join(DEFAULT_CONFIG_FILE),
        "{ embedding: { dimension: 128 } }",
    );
    let runtime_config = temp.path().join("runtime.json5");
    write_json5(&runtime_config, "{ embedding: { timeout_ms: 250 } }");

    let mut options = isolated_options(&cwd).with_runtime_path(&runtime_config);
    options.user_config_path = Some(user_config);
    let layered = KnowledgeConfig::load_layered_with_options(options).expect("layered");

    assert_eq!(layered.config.analysis.top_tags, 3);
    assert_eq!(layered.config.recall.default_results, 7);
    assert_eq!(layered.config.embedding.dimension, 128);
    assert_eq!(layered.config.embedding.timeout_ms, 250);
    let sources = layered
        .layers
        .iter()
        .map(|layer| layer.source)
        .collect::<Vec<_>>();
    assert_eq!(
        sources,
        vec![
            ConfigLayerSource::User,
            ConfigLayerSource::Project,
            ConfigLayerSource::Cwd,
            ConfigLayerSource::Runtime,
        ]
    );
}

#[test]
fn project_layer_is_not_loaded_twice_when_cwd_is_root() {
    let temp = TempDir::new().expect("tmp");
    let project_root = temp.path().join("project");
    fs::create_dir_all(project_root.join(".git")).expect("git");
    write_json5(
        &project_root.join(DEFAULT_CONFIG_FILE),
        "{ analysis: { top_tags: 4 } }",
    );

    let layered = KnowledgeConfig::load_layered_with_options(isolated_options(&project_root))
        .expect("layered");
    assert_eq!(layered.layers.len(), 1);
    assert_eq!(layered.config.analysis.top_tags, 4);
}

#[test]
fn invalid_layer_reports_its_source() {
    let temp = TempDir::new().expect("tmp");
    write_json5(
        &temp.path().join(DEFAULT_CONFIG_FILE),
        "{ store: { busy_timeout_ms: \"soon\" } }",
    );
    let err = KnowledgeConfig::load_layered_with_options(isolated_options(temp.path()))
        .unwrap_err();
    let msg = format!("{err}");
    assert!(msg.contains("cwd("), "{msg}");
    assert!(msg.contains("store.busy_timeout_ms"), "{msg}");
}

#[test]
fn missing_runtime_layer_is_an_error() {
    let temp = TempDir::new().expect("tmp");
    let options = isolated_options(temp.path()).with_runtime_path(temp.path().join("nope.json5"));
    let err = KnowledgeConfig::load_layered_with_options(options).unwrap_err();
    assert!(matches!(err, ConfigError::ReadFailed(_)));
}

#[test]
fn storage_dir_resolves_relative_paths_against_cwd() {
    let config = KnowledgeConfig::load_from_str(r#"{ store: { path: "data/kb" } }"#)
        .expect("config");
    let dir = config.storage_dir(Path::new("/work")).expect("dir");
    assert_eq!(dir, Path::new("/work/data/kb"));

    let config = KnowledgeConfig::load_from_str(r#"{ store: { path: "  " } }"#).expect("config");
    assert!(matches!(
        config.storage_dir(Path::new("/work")),
        Err(ConfigError::UnresolvedStorage(_))
    ));
}
