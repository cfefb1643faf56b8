//! Knowledge base: records automation attempts and answers similarity and
//! aggregate queries over them.

use crate::analysis::PatternAnalysis;
use crate::embedding::{EmbeddingProvider, provider_from_config};
use crate::error::{EmbeddingError, KnowledgeError};
use crate::operation::{KnownOperation, context_summary, derive_tags};
use cadkb_rs_config::KnowledgeConfig;
use cadkb_rs_store::{
    Embedding, OperationParameters, OperationRecord, RecordStore, ScoredRecord, SimilarityFilter,
    SqliteRecordStore, StoreError,
};
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use parking_lot::Mutex;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Tunables for a knowledge base instance.
#[derive(Debug, Clone)]
pub struct KnowledgeOptions {
    /// Upper bound on one embedding call.
    pub embed_timeout: Duration,
    /// Result count used when callers do not pass one.
    pub default_results: usize,
    /// Matches scoring below this are dropped.
    pub min_score: Option<f32>,
    /// Number of tags reported by pattern analysis.
    pub top_tags: usize,
}

impl Default for KnowledgeOptions {
    fn default() -> Self {
        Self::from_config(&KnowledgeConfig::default())
    }
}

impl KnowledgeOptions {
    pub fn from_config(config: &KnowledgeConfig) -> Self {
        Self {
            embed_timeout: Duration::from_millis(config.embedding.timeout_ms),
            default_results: config.recall.default_results,
            min_score: config.recall.min_score,
            top_tags: config.analysis.top_tags,
        }
    }

    pub fn with_embed_timeout(mut self, timeout: Duration) -> Self {
        self.embed_timeout = timeout;
        self
    }
}

/// Ranked answer to a similarity query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarOperations {
    pub query: String,
    /// Best match first.
    pub matches: Vec<ScoredRecord>,
    /// The query could not be answered; `matches` is empty.
    pub degraded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub degraded_reason: Option<String>,
}

impl SimilarOperations {
    fn degraded(query: &str, reason: String) -> Self {
        Self {
            query: query.to_string(),
            matches: Vec::new(),
            degraded: true,
            degraded_reason: Some(reason),
        }
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }
}

/// Token required by `KnowledgeBase::reset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetConfirmation {
    /// Permanently delete every stored record.
    DeleteAllRecords,
}

/// Validated input to a recording, before the embedding is computed.
#[derive(Debug, Clone)]
struct PendingRecord {
    operation_type: String,
    parameters: OperationParameters,
    success: bool,
    error_message: Option<String>,
}

struct KnowledgeInner {
    store: Arc<dyn RecordStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    options: KnowledgeOptions,
    last_timestamp: Mutex<Option<DateTime<Utc>>>,
}

/// Cloneable handle to one knowledge base.
///
/// Construct once at startup, pass clones to every caller, and call
/// [`KnowledgeBase::close`] at shutdown.
#[derive(Clone)]
pub struct KnowledgeBase {
    inner: Arc<KnowledgeInner>,
}

impl std::fmt::Debug for KnowledgeBase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KnowledgeBase")
            .field("embedder", &self.inner.embedder.name())
            .field("dimension", &self.inner.embedder.dimension())
            .field("options", &self.inner.options)
            .finish()
    }
}

impl KnowledgeBase {
    pub fn new(
        store: Arc<dyn RecordStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        options: KnowledgeOptions,
    ) -> Self {
        Self {
            inner: Arc::new(KnowledgeInner {
                store,
                embedder,
                options,
                last_timestamp: Mutex::new(None),
            }),
        }
    }

    /// Open the SQLite-backed knowledge base described by `config`.
    ///
    /// A relative `store.path` resolves against the current directory.
    pub fn open(config: &KnowledgeConfig) -> Result<Self, KnowledgeError> {
        let cwd = std::env::current_dir()?;
        let storage_dir = config.storage_dir(&cwd)?;
        Self::open_at(config, &storage_dir)
    }

    /// Open with an explicit storage directory, ignoring `store.path`.
    pub fn open_at(config: &KnowledgeConfig, storage_dir: &Path) -> Result<Self, KnowledgeError> {
        let store = SqliteRecordStore::new(storage_dir)
            .with_busy_timeout(Duration::from_millis(config.store.busy_timeout_ms));
        let embedder = provider_from_config(&config.embedding)?;
        info!(
            "opened knowledge base (storage={}, embedder={})",
            storage_dir.display(),
            embedder.name()
        );
        Ok(Self::new(
            Arc::new(store),
            embedder,
            KnowledgeOptions::from_config(config),
        ))
    }

    pub fn options(&self) -> &KnowledgeOptions {
        &self.inner.options
    }

    /// Width of vectors produced by the active provider.
    pub fn dimension(&self) -> usize {
        self.inner.embedder.dimension()
    }

    pub(crate) fn store(&self) -> &Arc<dyn RecordStore> {
        &self.inner.store
    }

    /// Record one automation attempt.
    ///
    /// The write runs on its own task, so dropping the returned future does
    /// not abandon the record. Embedding failures store the record without a
    /// vector; store failures are returned as `KnowledgeError::Storage`.
    pub async fn record(
        &self,
        operation_type: &str,
        parameters: OperationParameters,
        success: bool,
        error_message: Option<String>,
    ) -> Result<OperationRecord, KnowledgeError> {
        self.record_detached(operation_type, parameters, success, error_message)?
            .await?
    }

    /// Record an operation with a typed parameter shape.
    pub async fn record_known(
        &self,
        operation: KnownOperation,
        success: bool,
        error_message: Option<String>,
    ) -> Result<OperationRecord, KnowledgeError> {
        let (operation_type, parameters) = operation.into_parts();
        self.record(&operation_type, parameters, success, error_message)
            .await
    }

    /// Validate and start recording without waiting for the write.
    ///
    /// Validation errors are returned immediately; the handle resolves to the
    /// stored record or the storage error. Fails with
    /// `KnowledgeError::Runtime` when called outside a tokio runtime.
    pub fn record_detached(
        &self,
        operation_type: &str,
        parameters: OperationParameters,
        success: bool,
        error_message: Option<String>,
    ) -> Result<JoinHandle<Result<OperationRecord, KnowledgeError>>, KnowledgeError> {
        let pending = validate_record(operation_type, parameters, success, error_message)?;
        let runtime = Handle::try_current()?;
        let kb = self.clone();
        Ok(runtime.spawn(async move { kb.persist(pending).await }))
    }

    async fn persist(&self, pending: PendingRecord) -> Result<OperationRecord, KnowledgeError> {
        // The record is stamped when the attempt is reported, not when its
        // embedding returns.
        let timestamp = self.next_timestamp();
        let tags = derive_tags(&pending.operation_type, &pending.parameters);
        let summary = context_summary(
            &pending.operation_type,
            &pending.parameters,
            &tags,
            pending.success,
            pending.error_message.as_deref(),
        );
        let embedding = match self.embed(&summary).await {
            Ok(vector) => Embedding::Vector(vector),
            Err(err) => {
                warn!(
                    "storing record without embedding (operation_type={}, error={})",
                    pending.operation_type, err
                );
                Embedding::Missing
            }
        };
        let record = OperationRecord {
            id: Uuid::new_v4(),
            operation_type: pending.operation_type,
            parameters: pending.parameters,
            success: pending.success,
            error_message: pending.error_message,
            timestamp,
            context_summary: summary,
            embedding,
            tags,
        };
        self.inner.store.insert(record.clone()).await?;
        info!(
            "recorded operation (id={}, operation_type={}, success={}, indexed={})",
            record.id,
            record.operation_type,
            record.success,
            !record.is_unindexed()
        );
        Ok(record)
    }

    /// Embed with the configured timeout and a width check.
    pub(crate) async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let timeout = self.inner.options.embed_timeout;
        let vector = tokio::time::timeout(timeout, self.inner.embedder.embed(text))
            .await
            .map_err(|_| EmbeddingError::Timeout(timeout))??;
        let expected = self.inner.embedder.dimension();
        if vector.len() != expected {
            return Err(EmbeddingError::DimensionMismatch {
                expected,
                actual: vector.len(),
            });
        }
        Ok(vector)
    }

    /// Current time, clamped so timestamps never go backwards on this handle.
    pub(crate) fn next_timestamp(&self) -> DateTime<Utc> {
        let mut last = self.inner.last_timestamp.lock();
        let now = Utc::now();
        let timestamp = match *last {
            Some(previous) if previous > now => previous,
            _ => now,
        };
        *last = Some(timestamp);
        timestamp
    }

    /// Find recorded operations similar to `query_text`.
    pub async fn find_similar(
        &self,
        query_text: &str,
        n_results: usize,
    ) -> Result<SimilarOperations, KnowledgeError> {
        self.find_similar_filtered(query_text, n_results, &SimilarityFilter::default())
            .await
    }

    /// Similarity query restricted by `filter`.
    ///
    /// Embedding or store failures produce an empty, degraded result.
    pub async fn find_similar_filtered(
        &self,
        query_text: &str,
        n_results: usize,
        filter: &SimilarityFilter,
    ) -> Result<SimilarOperations, KnowledgeError> {
        let query = query_text.trim();
        if query.is_empty() {
            return Err(KnowledgeError::Validation(
                "query_text must not be empty".to_string(),
            ));
        }
        if n_results == 0 {
            return Err(KnowledgeError::Validation(
                "n_results must be at least 1".to_string(),
            ));
        }
        let vector = match self.embed(query).await {
            Ok(vector) => vector,
            Err(err) => {
                warn!("similarity query degraded (reason=embedding, error={err})");
                return Ok(SimilarOperations::degraded(query, err.to_string()));
            }
        };
        let mut matches = match self
            .inner
            .store
            .query_similar(&vector, n_results, filter)
            .await
        {
            Ok(matches) => matches,
            Err(err) => {
                warn!("similarity query degraded (reason=storage, error={err})");
                return Ok(SimilarOperations::degraded(query, err.to_string()));
            }
        };
        if let Some(min_score) = self.inner.options.min_score {
            matches.retain(|scored| scored.score >= min_score);
        }
        debug!(
            "similarity query answered (n_results={}, returned={})",
            n_results,
            matches.len()
        );
        Ok(SimilarOperations {
            query: query.to_string(),
            matches,
            degraded: false,
            degraded_reason: None,
        })
    }

    /// Aggregate statistics over one snapshot of the store.
    pub async fn analyze_patterns(&self) -> PatternAnalysis {
        match self.inner.store.scan_all().await {
            Ok(records) => PatternAnalysis::from_records(&records, self.inner.options.top_tags),
            Err(err) => {
                warn!("pattern analysis degraded (error={err})");
                PatternAnalysis::degraded(err.to_string())
            }
        }
    }

    /// Most recent records first, optionally only successful ones.
    pub async fn operation_history(
        &self,
        limit: usize,
        success_only: bool,
    ) -> Result<Vec<OperationRecord>, KnowledgeError> {
        if limit == 0 {
            return Err(KnowledgeError::Validation(
                "limit must be at least 1".to_string(),
            ));
        }
        let mut records = self.inner.store.scan_all().await?;
        if success_only {
            records.retain(|record| record.success);
        }
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        records.truncate(limit);
        Ok(records)
    }

    /// Embed records and error solutions stored without a vector. Returns
    /// how many were filled.
    pub async fn reindex(&self) -> Result<usize, KnowledgeError> {
        let records = self.inner.store.scan_all().await?;
        let mut updated = 0;
        for record in records.into_iter().filter(OperationRecord::is_unindexed) {
            let vector = match self.embed(&record.context_summary).await {
                Ok(vector) => vector,
                Err(err) => {
                    warn!("reindex skipped record (id={}, error={})", record.id, err);
                    continue;
                }
            };
            match self.inner.store.set_embedding(record.id, vector).await {
                Ok(()) => updated += 1,
                Err(StoreError::AlreadyIndexed(id)) => {
                    debug!("record indexed concurrently (id={id})");
                }
                Err(err) => return Err(err.into()),
            }
        }
        updated += self.reindex_solutions().await?;
        info!("reindex finished (updated={updated})");
        Ok(updated)
    }

    /// Delete every record and error solution. Deleted ids stay retired.
    pub async fn reset(&self, confirm: ResetConfirmation) -> Result<usize, KnowledgeError> {
        match confirm {
            ResetConfirmation::DeleteAllRecords => {
                let removed = self.inner.store.delete_all().await?;
                warn!("knowledge base reset (removed={removed})");
                Ok(removed)
            }
        }
    }

    /// Flush and close the underlying store.
    pub async fn close(&self) -> Result<(), KnowledgeError> {
        self.inner.store.close().await?;
        info!("knowledge base closed");
        Ok(())
    }
}

fn validate_record(
    operation_type: &str,
    parameters: OperationParameters,
    success: bool,
    error_message: Option<String>,
) -> Result<PendingRecord, KnowledgeError> {
    let operation_type = operation_type.trim();
    if operation_type.is_empty() {
        return Err(KnowledgeError::Validation(
            "operation_type must not be empty".to_string(),
        ));
    }
    let error_message = if success {
        if error_message.is_some() {
            debug!("clearing error_message on successful operation (operation_type={operation_type})");
        }
        None
    } else {
        let message = error_message
            .map(|message| message.trim().to_string())
            .filter(|message| !message.is_empty())
            .ok_or_else(|| {
                KnowledgeError::Validation(
                    "error_message is required when success is false".to_string(),
                )
            })?;
        Some(message)
    };
    Ok(PendingRecord {
        operation_type: operation_type.to_string(),
        parameters,
        success,
        error_message,
    })
}
