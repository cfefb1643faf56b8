use cadkb_rs_config::KnowledgeConfig;
use cadkb_rs_core::{
    HashingEmbeddingProvider, KnowledgeBase, KnowledgeError, KnowledgeOptions, KnownOperation,
    ResetConfirmation,
};
use cadkb_rs_store::{
    InMemoryRecordStore, OperationParameters, RecordStore, SimilarityFilter, SqliteRecordStore,
};
use cadkb_rs_test_utils::{FailingEmbedder, FailingStore, SlowEmbedder, SwitchableEmbedder};
use chrono::Utc;
use pretty_assertions::assert_eq;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

fn in_memory_kb() -> (KnowledgeBase, Arc<InMemoryRecordStore>) {
    let store = Arc::new(InMemoryRecordStore::new());
    let kb = KnowledgeBase::new(
        store.clone(),
        Arc::new(HashingEmbeddingProvider::new(384)),
        KnowledgeOptions::default(),
    );
    (kb, store)
}

fn dimension_params(value: f64) -> OperationParameters {
    OperationParameters::new()
        .with("feature_name", "Boss-Extrude1")
        .with("dimension_name", "D1")
        .with("value", value)
}

async fn record_scenario(kb: &KnowledgeBase) {
    kb.record("modify_dimension", dimension_params(25.0), true, None)
        .await
        .expect("first");
    kb.record(
        "modify_dimension",
        dimension_params(40.0),
        false,
        Some("dimension not found".to_string()),
    )
    .await
    .expect("second");
    kb.record(
        "export_model",
        OperationParameters::new()
            .with("output_path", "out/bracket.step")
            .with("format", "STEP"),
        true,
        None,
    )
    .await
    .expect("third");
}

#[tokio::test]
async fn record_adds_exactly_one_matching_record() {
    let (kb, store) = in_memory_kb();
    let before = store.scan_all().await.expect("scan").len();

    let record = kb
        .record(
            "open_model",
            OperationParameters::new().with("file_path", "C:/parts/bracket.sldprt"),
            false,
            Some("file not found".to_string()),
        )
        .await
        .expect("record");

    let records = store.scan_all().await.expect("scan");
    assert_eq!(records.len(), before + 1);
    let stored = records
        .iter()
        .find(|stored| stored.id == record.id)
        .expect("stored");
    assert_eq!(stored, &record);
    assert!(!stored.success);
    assert_eq!(stored.error_message.as_deref(), Some("file not found"));
    assert_eq!(
        stored.tags,
        vec!["open_model".to_string(), "part".to_string()]
    );
    assert_eq!(stored.vector().map(<[f32]>::len), Some(384));
}

#[tokio::test]
async fn success_clears_supplied_error_message() {
    let (kb, _store) = in_memory_kb();
    let record = kb
        .record(
            "rebuild_model",
            OperationParameters::new(),
            true,
            Some("ignored".to_string()),
        )
        .await
        .expect("record");
    assert_eq!(record.error_message, None);
}

#[tokio::test]
async fn invalid_input_is_rejected_without_writing() {
    let (kb, store) = in_memory_kb();
    let err = kb
        .record("", OperationParameters::new(), true, None)
        .await
        .unwrap_err();
    assert!(matches!(err, KnowledgeError::Validation(_)));
    let err = kb
        .record("export_model", OperationParameters::new(), false, None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "validation");
    assert_eq!(store.count().await.expect("count"), 0);
}

#[tokio::test]
async fn analysis_of_empty_store_has_zero_success_rate() {
    let (kb, _store) = in_memory_kb();
    let analysis = kb.analyze_patterns().await;
    assert_eq!(analysis.total_operations, 0);
    assert_eq!(analysis.success_rate, 0.0);
    assert!(!analysis.degraded);
}

#[tokio::test]
async fn scenario_analysis_counts_types() {
    let (kb, _store) = in_memory_kb();
    record_scenario(&kb).await;

    let analysis = kb.analyze_patterns().await;
    assert_eq!(analysis.total_operations, 3);
    assert!((analysis.success_rate - 2.0 / 3.0).abs() < 1e-9);
    let types = analysis
        .operation_types
        .iter()
        .map(|entry| (entry.name.as_str(), entry.count))
        .collect::<Vec<_>>();
    assert_eq!(types, vec![("modify_dimension", 2), ("export_model", 1)]);
    assert_eq!(
        analysis
            .operation_types
            .iter()
            .map(|entry| entry.count)
            .sum::<usize>(),
        analysis.total_operations
    );
    assert_eq!(analysis.error_hotspots[0].name, "modify_dimension");
    assert!(
        analysis
            .common_tags
            .iter()
            .any(|entry| entry.name == "parametric" && entry.count == 2)
    );
}

#[tokio::test]
async fn scenario_similarity_prefers_dimension_records() {
    let dir = tempdir().expect("tmp");
    let kb = KnowledgeBase::new(
        Arc::new(SqliteRecordStore::new(dir.path())),
        Arc::new(HashingEmbeddingProvider::new(384)),
        KnowledgeOptions::default(),
    );
    record_scenario(&kb).await;

    let similar = kb
        .find_similar("change dimension value", 2)
        .await
        .expect("similar");
    assert!(!similar.degraded);
    assert_eq!(similar.len(), 2);
    assert!(
        similar
            .matches
            .iter()
            .all(|scored| scored.record.operation_type == "modify_dimension")
    );
    assert!(similar.matches[0].score >= similar.matches[1].score);

    let all = kb
        .find_similar("change dimension value", 10)
        .await
        .expect("similar");
    assert_eq!(all.len(), 3);
    assert_eq!(all.matches[2].record.operation_type, "export_model");
    kb.close().await.expect("close");
}

#[tokio::test]
async fn similarity_respects_filter_and_count() {
    let (kb, _store) = in_memory_kb();
    record_scenario(&kb).await;

    let only_failures = kb
        .find_similar_filtered(
            "dimension",
            5,
            &SimilarityFilter {
                operation_type: None,
                success: Some(false),
            },
        )
        .await
        .expect("similar");
    assert_eq!(only_failures.len(), 1);
    assert_eq!(
        only_failures.matches[0].record.error_message.as_deref(),
        Some("dimension not found")
    );

    let one = kb.find_similar("export", 1).await.expect("similar");
    assert_eq!(one.len(), 1);
}

#[tokio::test]
async fn min_score_drops_weak_matches() {
    let store = Arc::new(InMemoryRecordStore::new());
    let options = KnowledgeOptions {
        min_score: Some(0.99),
        ..KnowledgeOptions::default()
    };
    let kb = KnowledgeBase::new(
        store,
        Arc::new(HashingEmbeddingProvider::new(384)),
        options,
    );
    record_scenario(&kb).await;

    let similar = kb
        .find_similar("unrelated words entirely", 5)
        .await
        .expect("similar");
    assert!(similar.is_empty());
    assert!(!similar.degraded);
}

#[tokio::test]
async fn concurrent_records_get_distinct_ids() {
    let dir = tempdir().expect("tmp");
    let store = Arc::new(SqliteRecordStore::new(dir.path()));
    let kb = KnowledgeBase::new(
        store.clone(),
        Arc::new(HashingEmbeddingProvider::new(64)),
        KnowledgeOptions::default(),
    );

    let handles = (0..32)
        .map(|index| {
            let kb = kb.clone();
            tokio::spawn(async move {
                kb.record(
                    "modify_dimension",
                    dimension_params(index as f64),
                    index % 3 != 0,
                    (index % 3 == 0).then(|| "rebuild failed".to_string()),
                )
                .await
            })
        })
        .collect::<Vec<_>>();
    for handle in handles {
        handle.await.expect("join").expect("record");
    }

    let records = store.scan_all().await.expect("scan");
    assert_eq!(records.len(), 32);
    let ids = records.iter().map(|record| record.id).collect::<HashSet<_>>();
    assert_eq!(ids.len(), 32);
}

#[tokio::test]
async fn timed_out_embedding_stores_sentinel() {
    let store = Arc::new(InMemoryRecordStore::new());
    let kb = KnowledgeBase::new(
        store.clone(),
        Arc::new(SlowEmbedder::new(16, Duration::from_millis(500))),
        KnowledgeOptions::default().with_embed_timeout(Duration::from_millis(20)),
    );

    let record = kb
        .record("rebuild_model", OperationParameters::new(), true, None)
        .await
        .expect("record");
    assert!(record.is_unindexed());
    assert_eq!(store.count().await.expect("count"), 1);
    assert_eq!(kb.analyze_patterns().await.unindexed_operations, 1);
}

#[tokio::test]
async fn unavailable_embedder_still_records_and_degrades_queries() {
    let store = Arc::new(InMemoryRecordStore::new());
    let kb = KnowledgeBase::new(
        store.clone(),
        Arc::new(FailingEmbedder::new(16)),
        KnowledgeOptions::default(),
    );

    let record = kb
        .record("export_model", OperationParameters::new(), true, None)
        .await
        .expect("record");
    assert!(record.is_unindexed());

    let similar = kb.find_similar("export", 3).await.expect("similar");
    assert!(similar.degraded);
    assert!(similar.is_empty());
}

#[tokio::test]
async fn reindex_fills_missing_embeddings() {
    let store = Arc::new(InMemoryRecordStore::new());
    let embedder = Arc::new(SwitchableEmbedder::new(32));
    let kb = KnowledgeBase::new(store.clone(), embedder.clone(), KnowledgeOptions::default());

    embedder.set_available(false);
    kb.record("export_model", OperationParameters::new(), true, None)
        .await
        .expect("record");
    embedder.set_available(true);
    kb.record("modify_dimension", dimension_params(1.0), true, None)
        .await
        .expect("record");

    let before = kb.find_similar("export model", 5).await.expect("similar");
    assert_eq!(before.len(), 1);
    assert_eq!(before.matches[0].record.operation_type, "modify_dimension");

    assert_eq!(kb.reindex().await.expect("reindex"), 1);
    assert_eq!(kb.reindex().await.expect("reindex"), 0);
    assert_eq!(kb.analyze_patterns().await.unindexed_operations, 0);

    let after = kb.find_similar("export model", 5).await.expect("similar");
    assert_eq!(after.len(), 2);
    assert_eq!(after.matches[0].record.operation_type, "export_model");
}

#[tokio::test]
async fn failing_store_surfaces_writes_and_degrades_reads() {
    let kb = KnowledgeBase::new(
        Arc::new(FailingStore::new()),
        Arc::new(HashingEmbeddingProvider::new(16)),
        KnowledgeOptions::default(),
    );

    let err = kb
        .record("open_model", OperationParameters::new(), true, None)
        .await
        .unwrap_err();
    assert!(matches!(err, KnowledgeError::Storage(_)));

    let similar = kb.find_similar("open", 3).await.expect("similar");
    assert!(similar.degraded);
    assert!(similar.is_empty());

    let analysis = kb.analyze_patterns().await;
    assert!(analysis.degraded);
    assert_eq!(analysis.total_operations, 0);
}

#[tokio::test]
async fn dropping_the_caller_does_not_cancel_recording() {
    let store = Arc::new(InMemoryRecordStore::new());
    let kb = KnowledgeBase::new(
        store.clone(),
        Arc::new(SlowEmbedder::new(16, Duration::from_millis(100))),
        KnowledgeOptions::default(),
    );

    let abandoned = tokio::time::timeout(
        Duration::from_millis(10),
        kb.record(
            "export_model",
            OperationParameters::new(),
            false,
            Some("upstream cancelled".to_string()),
        ),
    )
    .await;
    assert!(abandoned.is_err());

    for _ in 0..50 {
        if store.count().await.expect("count") == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    let records = store.scan_all().await.expect("scan");
    assert_eq!(records.len(), 1);
    assert_eq!(
        records[0].error_message.as_deref(),
        Some("upstream cancelled")
    );
}

#[tokio::test]
async fn history_is_newest_first_and_filterable() {
    let (kb, _store) = in_memory_kb();
    record_scenario(&kb).await;

    let history = kb.operation_history(10, false).await.expect("history");
    assert_eq!(history.len(), 3);
    assert_eq!(history[0].operation_type, "export_model");
    assert!(history.windows(2).all(|pair| pair[0].timestamp >= pair[1].timestamp));

    let successes = kb.operation_history(10, true).await.expect("history");
    assert_eq!(successes.len(), 2);
    assert!(successes.iter().all(|record| record.success));

    let latest = kb.operation_history(1, false).await.expect("history");
    assert_eq!(latest.len(), 1);
}

#[tokio::test]
async fn record_known_uses_typed_shape() {
    let (kb, _store) = in_memory_kb();
    let record = kb
        .record_known(
            KnownOperation::ExportModel {
                output_path: "out/bracket.step".to_string(),
                format: "step".to_string(),
            },
            true,
            None,
        )
        .await
        .expect("record");
    assert_eq!(record.operation_type, "export_model");
    assert_eq!(record.parameters.get_text("format"), Some("STEP"));
    assert_eq!(
        record.tags,
        vec!["export_model".to_string(), "export".to_string()]
    );
}

#[tokio::test]
async fn reset_wipes_records() {
    let (kb, store) = in_memory_kb();
    record_scenario(&kb).await;

    let removed = kb
        .reset(ResetConfirmation::DeleteAllRecords)
        .await
        .expect("reset");
    assert_eq!(removed, 3);
    assert_eq!(store.count().await.expect("count"), 0);
    assert_eq!(kb.analyze_patterns().await.total_operations, 0);
}

#[tokio::test]
async fn open_builds_sqlite_knowledge_base_from_config() {
    let dir = tempdir().expect("tmp");
    let config = KnowledgeConfig::load_from_str(r#"{ embedding: { dimension: 48 } }"#)
        .expect("config");
    let kb = KnowledgeBase::open_at(&config, dir.path()).expect("open");
    assert_eq!(kb.dimension(), 48);

    kb.record("rebuild_model", OperationParameters::new(), true, None)
        .await
        .expect("record");
    kb.close().await.expect("close");

    let err = kb
        .record("rebuild_model", OperationParameters::new(), true, None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "storage");

    let reopened = KnowledgeBase::open_at(&config, dir.path()).expect("reopen");
    assert_eq!(reopened.analyze_patterns().await.total_operations, 1);
}

#[tokio::test]
async fn timestamp_is_taken_before_the_embedding_returns() {
    let delay = Duration::from_millis(300);
    let kb = KnowledgeBase::new(
        Arc::new(InMemoryRecordStore::new()),
        Arc::new(SlowEmbedder::new(16, delay)),
        KnowledgeOptions::default(),
    );

    let started = Utc::now();
    let record = kb
        .record("rebuild_model", OperationParameters::new(), true, None)
        .await
        .expect("record");
    let finished = Utc::now();
    assert!(finished - started >= chrono::Duration::milliseconds(300));
    assert!(record.timestamp < started + chrono::Duration::milliseconds(150));

    let solution = kb
        .record_error_solution(
            "rebuild failed",
            OperationParameters::new(),
            "Repair the sketch",
            Vec::new(),
        )
        .await
        .expect("solution");
    assert!(solution.timestamp < finished + chrono::Duration::milliseconds(150));
}

#[test]
fn detached_recording_outside_a_runtime_is_an_error() {
    let (kb, _store) = in_memory_kb();
    let err = kb
        .record_detached("rebuild_model", OperationParameters::new(), true, None)
        .unwrap_err();
    assert!(matches!(err, KnowledgeError::Runtime(_)));
    assert_eq!(err.kind(), "internal");

    let err = kb
        .record_detached("  ", OperationParameters::new(), true, None)
        .unwrap_err();
    assert_eq!(err.kind(), "validation");
}

#[tokio::test]
async fn error_solutions_are_found_by_similar_errors() {
    let (kb, store) = in_memory_kb();
    let stored = kb
        .record_error_solution(
            "dimension D1 not found in sketch",
            OperationParameters::new().with("operation", "modify_dimension"),
            "Use the full dimension name such as D1@Sketch1",
            vec![
                "List the sketch dimensions".to_string(),
                "Retry with the qualified name".to_string(),
            ],
        )
        .await
        .expect("solution");
    kb.record_error_solution(
        "unsupported export format",
        OperationParameters::new().with("operation", "export_model"),
        "Export as STEP instead",
        Vec::new(),
    )
    .await
    .expect("solution");

    let found = kb
        .find_error_solutions("dimension D2 not found", 5)
        .await
        .expect("find");
    assert!(!found.degraded);
    assert_eq!(found.len(), 2);
    assert_eq!(found.matches[0].solution, stored);
    assert!(found.matches[0].score > found.matches[1].score);

    let one = kb
        .find_error_solutions("unsupported export format", 1)
        .await
        .expect("find");
    assert_eq!(one.len(), 1);
    assert_eq!(one.matches[0].solution.solution, "Export as STEP instead");

    assert_eq!(store.scan_solutions().await.expect("scan").len(), 2);
    assert_eq!(
        kb.reset(ResetConfirmation::DeleteAllRecords)
            .await
            .expect("reset"),
        2
    );
    assert!(
        kb.find_error_solutions("unsupported export format", 3)
            .await
            .expect("find")
            .is_empty()
    );
}

#[tokio::test]
async fn unindexed_error_solutions_are_reindexed() {
    let store = Arc::new(InMemoryRecordStore::new());
    let embedder = Arc::new(SwitchableEmbedder::new(32));
    let kb = KnowledgeBase::new(store.clone(), embedder.clone(), KnowledgeOptions::default());

    embedder.set_available(false);
    let entry = kb
        .record_error_solution(
            "file is read-only",
            OperationParameters::new(),
            "Clear the read-only attribute",
            Vec::new(),
        )
        .await
        .expect("solution");
    assert!(entry.is_unindexed());
    let degraded = kb
        .find_error_solutions("file is read-only", 3)
        .await
        .expect("find");
    assert!(degraded.degraded);

    embedder.set_available(true);
    assert!(
        kb.find_error_solutions("file is read-only", 3)
            .await
            .expect("find")
            .is_empty()
    );
    assert_eq!(kb.reindex().await.expect("reindex"), 1);
    let found = kb
        .find_error_solutions("file is read-only", 3)
        .await
        .expect("find");
    assert_eq!(found.len(), 1);
    assert_eq!(found.matches[0].solution.id, entry.id);
}

#[tokio::test]
async fn failing_store_rejects_solution_writes_and_degrades_lookups() {
    let kb = KnowledgeBase::new(
        Arc::new(FailingStore::new()),
        Arc::new(HashingEmbeddingProvider::new(16)),
        KnowledgeOptions::default(),
    );
    let err = kb
        .record_error_solution("disk full", OperationParameters::new(), "Free space", Vec::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "storage");
    let found = kb.find_error_solutions("disk full", 3).await.expect("find");
    assert!(found.degraded);
}
