/*!
 * Tests for configuration loading and validation
 */

use std::fs;

use wikitranslate::app_config::{Config, LogLevel, ProviderConfig, ProviderKind};
use wikitranslate::translation::SegmentOrchestrator;
use wikitranslate::{Segment, canonical_language_code};

use crate::common;

#[test]
fn test_fromFile_withPartialJson_shouldKeepDefaultsForMissingSections() {
    let dir = common::create_temp_dir().unwrap();
    let path = dir.path().join("conf.json");
    fs::write(
        &path,
        r#"{
            "translation": {
                "max_concurrent_segments": 8,
                "provider_priority_order": ["local"],
                "providers": [{"id": "local", "kind": "mock"}]
            },
            "pivot": {"max_pivots": 1},
            "log_level": "debug"
        }"#,
    )
    .unwrap();

    let config = Config::from_file(&path).unwrap();
    config.validate().unwrap();

    assert_eq!(config.translation.max_concurrent_segments, 8);
    assert_eq!(config.translation.max_retries_per_provider, 3);
    assert_eq!(config.translation.providers[0].kind, ProviderKind::Mock);
    assert_eq!(config.translation.providers[0].timeout_secs, 60);
    assert_eq!(config.pivot.max_pivots, 1);
    assert!((config.pivot.pivot_penalty - 0.05).abs() < f64::EPSILON);
    assert_eq!(config.cache.cache_ttl_seconds, 3600);
    assert_eq!(config.log_level, LogLevel::Debug);
}

#[test]
fn test_fromFile_withInvalidJson_shouldFail() {
    let dir = common::create_temp_dir().unwrap();
    let path = dir.path().join("conf.json");
    fs::write(&path, "{ not json").unwrap();

    assert!(Config::from_file(&path).is_err());
}

#[test]
fn test_saveThenLoad_shouldPreserveProviders() {
    let dir = common::create_temp_dir().unwrap();
    let path = dir.path().join("conf.json");

    let mut config = Config::default();
    config
        .translation
        .providers
        .push(ProviderConfig::new("gpt", ProviderKind::OpenAI).with_model("gpt-4o-mini"));
    config.translation.provider_priority_order.push("gpt".to_string());
    config.save(&path).unwrap();

    let loaded = Config::load_or_create(&path).unwrap();
    assert_eq!(loaded, config);
    loaded.validate().unwrap();
}

#[test]
fn test_validate_withEmptyPriorityOrder_shouldFail() {
    let mut config = Config::default();
    config.translation.provider_priority_order.clear();
    assert!(config.validate().is_err());
}

#[test]
fn test_validate_withInvertedBackoff_shouldFail() {
    let mut config = Config::default();
    config.translation.backoff_base_ms = 10_000;
    config.translation.backoff_max_ms = 100;
    assert!(config.validate().is_err());
}

#[test]
fn test_fromConfig_withMockProvider_shouldTranslateWithoutNetwork() {
    common::init_logging();
    let dir = common::create_temp_dir().unwrap();
    let repo = common::create_file_repository(&dir).unwrap();

    let mut config = Config::default();
    config.translation.providers = vec![ProviderConfig::new("echo", ProviderKind::Mock)];
    config.translation.provider_priority_order = vec!["echo".to_string()];
    config.validate().unwrap();

    let orchestrator = SegmentOrchestrator::from_config_with_repository(&config, repo).unwrap();
    let segment = Segment::new("s1", "good morning", "eng", "fre", "general");

    let result = tokio_test::block_on(orchestrator.translate(&segment)).unwrap();

    assert_eq!(result.text, format!("[{}] good morning", canonical_language_code("fre")));
    assert_eq!(result.attempts.len(), 1);
    assert_eq!(result.attempts[0].provider(), "echo");
}
