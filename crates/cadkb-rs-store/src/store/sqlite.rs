//! SQLite-backed record store.
//!
//! One database file at `{root}/knowledge.db`. The connection is opened lazily
//! on first access and guarded by a mutex; WAL mode plus a busy timeout lets
//! several processes share the same directory. Every database call runs on
//! the blocking pool so a lock held by another process never stalls the
//! async runtime.

use super::RecordStore;
use crate::error::StoreError;
use crate::model::{Embedding, ErrorSolution, OperationParameters, OperationRecord};
use crate::similarity::{ScoredRecord, SimilarityFilter, rank_records};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use log::{debug, info, warn};
use parking_lot::Mutex;
use rusqlite::{Connection, ErrorCode, OptionalExtension, TransactionBehavior, params};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Database filename within the storage directory.
const DB_FILENAME: &str = "knowledge.db";
/// Default time to wait on a lock held by another connection.
const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const RECORDS_TABLE: &str = "operation_records";
const SOLUTIONS_TABLE: &str = "error_solutions";

const RECORD_COLUMNS: &str = "id, operation_type, parameters, success, error_message, \
     timestamp, context_summary, embedding, tags";
const SOLUTION_COLUMNS: &str =
    "id, error_message, error_context, solution, solution_steps, timestamp, embedding";

fn apply_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS operation_records (
             id TEXT PRIMARY KEY,
             operation_type TEXT NOT NULL,
             parameters TEXT NOT NULL,
             success INTEGER NOT NULL,
             error_message TEXT,
             timestamp TEXT NOT NULL,
             context_summary TEXT NOT NULL,
             embedding BLOB NOT NULL,
             tags TEXT NOT NULL
         );
         CREATE INDEX IF NOT EXISTS idx_operation_records_type
             ON operation_records (operation_type);
         CREATE TABLE IF NOT EXISTS error_solutions (
             id TEXT PRIMARY KEY,
             error_message TEXT NOT NULL,
             error_context TEXT NOT NULL,
             solution TEXT NOT NULL,
             solution_steps TEXT NOT NULL,
             timestamp TEXT NOT NULL,
             embedding BLOB NOT NULL
         );
         CREATE TABLE IF NOT EXISTS retired_ids (
             id TEXT PRIMARY KEY
         );",
    )
}

enum ConnectionState {
    Uninitialized,
    Open(Connection),
    Closed,
}

/// SQLite record store.
pub struct SqliteRecordStore {
    root: PathBuf,
    busy_timeout: Duration,
    state: Arc<Mutex<ConnectionState>>,
}

impl std::fmt::Debug for SqliteRecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteRecordStore")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

/// Column values read from one record row before decoding.
struct RawRecord {
    id: String,
    operation_type: String,
    parameters: String,
    success: bool,
    error_message: Option<String>,
    timestamp: String,
    context_summary: String,
    embedding: Vec<u8>,
    tags: String,
}

impl RawRecord {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            operation_type: row.get(1)?,
            parameters: row.get(2)?,
            success: row.get(3)?,
            error_message: row.get(4)?,
            timestamp: row.get(5)?,
            context_summary: row.get(6)?,
            embedding: row.get(7)?,
            tags: row.get(8)?,
        })
    }

    fn decode(self) -> Result<OperationRecord, StoreError> {
        let id = decode_id(&self.id)?;
        let parameters: OperationParameters = serde_json::from_str(&self.parameters)?;
        let tags: Vec<String> = serde_json::from_str(&self.tags)?;
        Ok(OperationRecord {
            id,
            operation_type: self.operation_type,
            parameters,
            success: self.success,
            error_message: self.error_message,
            timestamp: decode_timestamp(&self.timestamp, id)?,
            context_summary: self.context_summary,
            embedding: decode_embedding(&self.embedding, id)?,
            tags,
        })
    }
}

/// Column values read from one error solution row before decoding.
struct RawSolution {
    id: String,
    error_message: String,
    error_context: String,
    solution: String,
    solution_steps: String,
    timestamp: String,
    embedding: Vec<u8>,
}

impl RawSolution {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            error_message: row.get(1)?,
            error_context: row.get(2)?,
            solution: row.get(3)?,
            solution_steps: row.get(4)?,
            timestamp: row.get(5)?,
            embedding: row.get(6)?,
        })
    }

    fn decode(self) -> Result<ErrorSolution, StoreError> {
        let id = decode_id(&self.id)?;
        Ok(ErrorSolution {
            id,
            error_message: self.error_message,
            error_context: serde_json::from_str(&self.error_context)?,
            solution: self.solution,
            solution_steps: serde_json::from_str(&self.solution_steps)?,
            timestamp: decode_timestamp(&self.timestamp, id)?,
            embedding: decode_embedding(&self.embedding, id)?,
        })
    }
}

fn decode_id(raw: &str) -> Result<Uuid, StoreError> {
    Uuid::parse_str(raw).map_err(|err| StoreError::Corrupt(format!("invalid id {raw}: {err}")))
}

fn decode_timestamp(raw: &str, id: Uuid) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|timestamp| timestamp.with_timezone(&Utc))
        .map_err(|err| StoreError::Corrupt(format!("invalid timestamp for {id}: {err}")))
}

fn decode_embedding(bytes: &[u8], id: Uuid) -> Result<Embedding, StoreError> {
    Embedding::from_le_bytes(bytes)
        .ok_or_else(|| StoreError::Corrupt(format!("invalid embedding blob for {id}")))
}

fn encode_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

impl SqliteRecordStore {
    /// Create a store rooted at `root`. Nothing touches disk until first use.
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
            state: Arc::new(Mutex::new(ConnectionState::Uninitialized)),
        }
    }

    /// Override the lock wait used for concurrent processes.
    pub fn with_busy_timeout(mut self, busy_timeout: Duration) -> Self {
        self.busy_timeout = busy_timeout;
        self
    }

    /// Storage directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path to the database file.
    pub fn db_path(&self) -> PathBuf {
        self.root.join(DB_FILENAME)
    }

    /// Run `f` against the connection on the blocking pool, opening it on
    /// first access.
    async fn run<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let state = Arc::clone(&self.state);
        let root = self.root.clone();
        let busy_timeout = self.busy_timeout;
        tokio::task::spawn_blocking(move || -> Result<T, StoreError> {
            let mut state = state.lock();
            if matches!(*state, ConnectionState::Uninitialized) {
                *state = ConnectionState::Open(open_connection(&root, busy_timeout)?);
            }
            match &mut *state {
                ConnectionState::Open(conn) => f(conn),
                ConnectionState::Closed | ConnectionState::Uninitialized => {
                    Err(StoreError::Closed)
                }
            }
        })
        .await?
    }
}

fn open_connection(root: &Path, busy_timeout: Duration) -> Result<Connection, StoreError> {
    std::fs::create_dir_all(root)?;
    let db_path = root.join(DB_FILENAME);
    let conn = Connection::open(&db_path)?;
    conn.busy_timeout(busy_timeout)?;
    let mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    apply_schema(&conn)?;
    let check: String = conn.query_row("PRAGMA quick_check", [], |row| row.get(0))?;
    if check != "ok" {
        warn!(
            "sqlite integrity check failed (path={}, result={check})",
            db_path.display()
        );
    }
    info!(
        "opened sqlite record store (path={}, journal_mode={mode})",
        db_path.display()
    );
    Ok(conn)
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(failure, _) if failure.code == ErrorCode::ConstraintViolation
    )
}

/// Whether `id` was retired by a wipe or is used by the `other` table.
fn id_taken(tx: &rusqlite::Transaction<'_>, id: &str, other: &str) -> Result<bool, StoreError> {
    let taken = tx
        .query_row(
            &format!(
                "SELECT 1 FROM retired_ids WHERE id = ?1
                 UNION ALL SELECT 1 FROM {other} WHERE id = ?1
                 LIMIT 1"
            ),
            [id],
            |_| Ok(()),
        )
        .optional()?;
    Ok(taken.is_some())
}

/// Insert one row under an IMMEDIATE transaction, mapping id collisions to
/// `DuplicateId`.
fn insert_row(
    conn: &mut Connection,
    id: Uuid,
    other_table: &str,
    sql: &str,
    values: impl rusqlite::Params,
) -> Result<(), StoreError> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    if id_taken(&tx, &id.to_string(), other_table)? {
        return Err(StoreError::DuplicateId(id));
    }
    match tx.execute(sql, values) {
        Ok(_) => {}
        Err(err) if is_constraint_violation(&err) => return Err(StoreError::DuplicateId(id)),
        Err(err) => return Err(err.into()),
    }
    tx.commit()?;
    Ok(())
}

fn insert_record(conn: &mut Connection, record: &OperationRecord) -> Result<(), StoreError> {
    let parameters = serde_json::to_string(&record.parameters)?;
    let tags = serde_json::to_string(&record.tags)?;
    insert_row(
        conn,
        record.id,
        SOLUTIONS_TABLE,
        &format!(
            "INSERT INTO {RECORDS_TABLE} ({RECORD_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"
        ),
        params![
            record.id.to_string(),
            record.operation_type,
            parameters,
            record.success,
            record.error_message,
            encode_timestamp(&record.timestamp),
            record.context_summary,
            record.embedding.to_le_bytes(),
            tags,
        ],
    )
}

fn insert_solution(conn: &mut Connection, solution: &ErrorSolution) -> Result<(), StoreError> {
    let error_context = serde_json::to_string(&solution.error_context)?;
    let steps = serde_json::to_string(&solution.solution_steps)?;
    insert_row(
        conn,
        solution.id,
        RECORDS_TABLE,
        &format!(
            "INSERT INTO {SOLUTIONS_TABLE} ({SOLUTION_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"
        ),
        params![
            solution.id.to_string(),
            solution.error_message,
            error_context,
            solution.solution,
            steps,
            encode_timestamp(&solution.timestamp),
            solution.embedding.to_le_bytes(),
        ],
    )
}

/// Read rows inside one transaction so the result is a consistent snapshot.
fn load_rows<R, T>(
    conn: &mut Connection,
    sql: &str,
    params: impl rusqlite::Params,
    map: fn(&rusqlite::Row<'_>) -> rusqlite::Result<R>,
    decode: fn(R) -> Result<T, StoreError>,
) -> Result<Vec<T>, StoreError> {
    let tx = conn.transaction()?;
    let rows = {
        let mut stmt = tx.prepare(sql)?;
        let rows = stmt
            .query_map(params, map)?
            .collect::<Result<Vec<_>, _>>()?;
        rows
    };
    tx.commit()?;
    rows.into_iter().map(decode).collect()
}

fn load_records(
    conn: &mut Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<OperationRecord>, StoreError> {
    load_rows(conn, sql, params, RawRecord::from_row, RawRecord::decode)
}

/// Fill a sentinel embedding in `table`; never overwrites an existing vector.
fn fill_embedding(
    conn: &mut Connection,
    table: &str,
    id: Uuid,
    blob: Vec<u8>,
) -> Result<(), StoreError> {
    let updated = conn.execute(
        &format!("UPDATE {table} SET embedding = ?2 WHERE id = ?1 AND length(embedding) = 0"),
        params![id.to_string(), blob],
    )?;
    if updated == 1 {
        return Ok(());
    }
    let exists = conn
        .query_row(
            &format!("SELECT 1 FROM {table} WHERE id = ?1"),
            [id.to_string()],
            |_| Ok(()),
        )
        .optional()?;
    match exists {
        Some(()) => Err(StoreError::AlreadyIndexed(id)),
        None => Err(StoreError::NotFound(id)),
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn insert(&self, record: OperationRecord) -> Result<(), StoreError> {
        let (id, operation_type, indexed) = (
            record.id,
            record.operation_type.clone(),
            !record.is_unindexed(),
        );
        self.run(move |conn| insert_record(conn, &record)).await?;
        debug!(
            "stored operation record (id={id}, operation_type={operation_type}, indexed={indexed})"
        );
        Ok(())
    }

    async fn scan_all(&self) -> Result<Vec<OperationRecord>, StoreError> {
        self.run(|conn| {
            load_records(
                conn,
                &format!("SELECT {RECORD_COLUMNS} FROM {RECORDS_TABLE} ORDER BY rowid"),
                [],
            )
        })
        .await
    }

    async fn get(&self, id: Uuid) -> Result<Option<OperationRecord>, StoreError> {
        let mut rows = self
            .run(move |conn| {
                load_records(
                    conn,
                    &format!("SELECT {RECORD_COLUMNS} FROM {RECORDS_TABLE} WHERE id = ?1"),
                    [id.to_string()],
                )
            })
            .await?;
        Ok(rows.pop())
    }

    async fn query_similar(
        &self,
        embedding: &[f32],
        n_results: usize,
        filter: &SimilarityFilter,
    ) -> Result<Vec<ScoredRecord>, StoreError> {
        let operation_type = filter.operation_type.clone();
        let success = filter.success;
        let candidates = self
            .run(move |conn| {
                load_records(
                    conn,
                    &format!(
                        "SELECT {RECORD_COLUMNS} FROM {RECORDS_TABLE}
                         WHERE length(embedding) > 0
                           AND (?1 IS NULL OR operation_type = ?1)
                           AND (?2 IS NULL OR success = ?2)
                         ORDER BY rowid"
                    ),
                    params![operation_type, success],
                )
            })
            .await?;
        debug!(
            "similarity scan (candidates={}, n_results={n_results})",
            candidates.len()
        );
        Ok(rank_records(candidates, embedding, n_results, filter))
    }

    async fn count(&self) -> Result<usize, StoreError> {
        self.run(|conn| {
            let count: i64 =
                conn.query_row(&format!("SELECT count(*) FROM {RECORDS_TABLE}"), [], |row| {
                    row.get(0)
                })?;
            Ok(count.max(0) as usize)
        })
        .await
    }

    async fn set_embedding(&self, id: Uuid, embedding: Vec<f32>) -> Result<(), StoreError> {
        let blob = Embedding::from(embedding).to_le_bytes();
        self.run(move |conn| fill_embedding(conn, RECORDS_TABLE, id, blob))
            .await
    }

    async fn insert_solution(&self, solution: ErrorSolution) -> Result<(), StoreError> {
        let id = solution.id;
        self.run(move |conn| insert_solution(conn, &solution)).await?;
        debug!("stored error solution (id={id})");
        Ok(())
    }

    async fn scan_solutions(&self) -> Result<Vec<ErrorSolution>, StoreError> {
        self.run(|conn| {
            load_rows(
                conn,
                &format!("SELECT {SOLUTION_COLUMNS} FROM {SOLUTIONS_TABLE} ORDER BY rowid"),
                [],
                RawSolution::from_row,
                RawSolution::decode,
            )
        })
        .await
    }

    async fn set_solution_embedding(
        &self,
        id: Uuid,
        embedding: Vec<f32>,
    ) -> Result<(), StoreError> {
        let blob = Embedding::from(embedding).to_le_bytes();
        self.run(move |conn| fill_embedding(conn, SOLUTIONS_TABLE, id, blob))
            .await
    }

    async fn delete_all(&self) -> Result<usize, StoreError> {
        let removed = self
            .run(|conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                let mut removed = 0;
                for table in [RECORDS_TABLE, SOLUTIONS_TABLE] {
                    tx.execute(
                        &format!("INSERT OR IGNORE INTO retired_ids (id) SELECT id FROM {table}"),
                        [],
                    )?;
                    removed += tx.execute(&format!("DELETE FROM {table}"), [])?;
                }
                tx.commit()?;
                Ok(removed)
            })
            .await?;
        warn!(
            "deleted all knowledge entries (path={}, removed={removed})",
            self.db_path().display()
        );
        Ok(removed)
    }

    async fn close(&self) -> Result<(), StoreError> {
        let state = Arc::clone(&self.state);
        let db_path = self.db_path();
        tokio::task::spawn_blocking(move || -> Result<(), StoreError> {
            let previous = std::mem::replace(&mut *state.lock(), ConnectionState::Closed);
            if let ConnectionState::Open(conn) = previous {
                if let Err(err) = conn.query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()))
                {
                    warn!("wal checkpoint failed on close: {err}");
                }
                conn.close().map_err(|(_, err)| StoreError::Sqlite(err))?;
                info!("closed sqlite record store (path={})", db_path.display());
            }
            Ok(())
        })
        .await?
    }
}
