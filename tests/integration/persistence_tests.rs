/*!
 * Tests that glossary terms and cached translations outlive one orchestrator
 */

use std::sync::Arc;

use wikitranslate::app_config::{Config, ProviderConfig, ProviderKind};
use wikitranslate::translation::{GlossaryEntry, Segment, SegmentOrchestrator, SqliteTerminologyStore, TerminologyStore};

use crate::common;

fn mock_config() -> Config {
    let mut config = Config::default();
    config.translation.providers = vec![ProviderConfig::new("echo", ProviderKind::Mock)];
    config.translation.provider_priority_order = vec!["echo".to_string()];
    config
}

fn cpu_segment(id: &str) -> Segment {
    Segment::new(id, "The CPU overheats", "en", "yo", "technical")
}

#[tokio::test]
async fn test_durableCache_acrossOrchestrators_shouldServeSecondFromDisk() {
    common::init_logging();
    let dir = common::create_temp_dir().unwrap();
    let config = mock_config();

    let store = SqliteTerminologyStore::new(common::create_file_repository(&dir).unwrap());
    store
        .add_entry(GlossaryEntry::new("CPU", "UCP", "en", "yo").with_domain("technical"))
        .await
        .unwrap();

    let first = SegmentOrchestrator::from_config_with_repository(&config, common::create_file_repository(&dir).unwrap())
        .unwrap();
    let fresh = first.translate(&cpu_segment("a")).await.unwrap();
    assert!(!fresh.cache_hit);
    assert!(fresh.text.contains("UCP"));
    assert_eq!(fresh.attempts.len(), 1);

    let second = SegmentOrchestrator::from_config_with_repository(&config, common::create_file_repository(&dir).unwrap())
        .unwrap();
    let cached = second.translate(&cpu_segment("b")).await.unwrap();

    assert!(cached.cache_hit);
    assert!(cached.attempts.is_empty());
    assert_eq!(cached.id, "b");
    assert_eq!(cached.text, fresh.text);
    assert_eq!(second.cache().stats().durable_hits, 1);
}

#[tokio::test]
async fn test_glossaryChange_betweenRuns_shouldMissTheCache() {
    let dir = common::create_temp_dir().unwrap();
    let config = mock_config();
    let store = SqliteTerminologyStore::new(common::create_file_repository(&dir).unwrap());
    store
        .add_entry(GlossaryEntry::new("CPU", "UCP", "en", "yo").with_domain("technical"))
        .await
        .unwrap();

    let first = SegmentOrchestrator::from_config_with_repository(&config, common::create_file_repository(&dir).unwrap())
        .unwrap();
    first.translate(&cpu_segment("a")).await.unwrap();

    store
        .add_entry(GlossaryEntry::new("CPU", "ẸRỌ", "en", "yo").with_domain("technical"))
        .await
        .unwrap();

    let second = SegmentOrchestrator::from_config_with_repository(&config, common::create_file_repository(&dir).unwrap())
        .unwrap();
    let result = second.translate(&cpu_segment("b")).await.unwrap();

    assert!(!result.cache_hit);
    assert!(result.text.contains("ẸRỌ"));
}

#[tokio::test]
async fn test_invalidate_afterStoreUpdate_shouldPickUpNewTerm() {
    let dir = common::create_temp_dir().unwrap();
    let mut config = mock_config();
    config.cache.enabled = false;

    let orchestrator =
        SegmentOrchestrator::from_config_with_repository(&config, common::create_file_repository(&dir).unwrap())
            .unwrap();
    let before = orchestrator.translate(&cpu_segment("a")).await.unwrap();
    assert!(before.text.contains("CPU"));

    orchestrator
        .glossary()
        .store()
        .add_entry(GlossaryEntry::new("cpu", "UCP", "eng", "yor").with_domain("Technical"))
        .await
        .unwrap();
    orchestrator.glossary().invalidate();

    let after = orchestrator.translate(&cpu_segment("b")).await.unwrap();
    assert!(after.text.contains("UCP"));
    assert!(!after.text.contains("CPU"));
}

#[tokio::test]
async fn test_sqliteStore_list_shouldFilterByCanonicalLanguage() {
    let dir = common::create_temp_dir().unwrap();
    let store = Arc::new(SqliteTerminologyStore::new(common::create_file_repository(&dir).unwrap()));
    store
        .add_entry(GlossaryEntry::new("CPU", "UCP", "eng", "yo"))
        .await
        .unwrap();
    store
        .add_entry(GlossaryEntry::new("ordinateur", "kɔ̀mpútà", "fr", "fon"))
        .await
        .unwrap();

    let english = store.list(Some("en")).await.unwrap();
    assert_eq!(english.len(), 1);
    assert_eq!(english[0].source_lang, "en");
    assert_eq!(store.list(None).await.unwrap().len(), 2);
}
